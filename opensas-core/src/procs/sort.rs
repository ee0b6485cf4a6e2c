//! PROC SORT: order a table by BY keys.

use std::cmp::Ordering;

use crate::ast::ProcStep;
use crate::error::{ErrorKind, InterpResult, InterpreterError};
use crate::proc::{ProcOutput, Procedure};
use crate::table::{Table, Value};

/// One sort key: variable plus direction.
struct SortKey {
    var: String,
    descending: bool,
}

/// Orders observations by the `by` variables; `descending` before a name
/// reverses that key. Missing sorts first (last under `descending`).
/// Writes `out=` when given, otherwise replaces the input table.
pub struct Sort;

impl Procedure for Sort {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn run(&self, input: &Table, input_name: &str, step: &ProcStep) -> InterpResult<ProcOutput> {
        let by = step.substatement("by").ok_or_else(|| {
            InterpreterError::new(ErrorKind::Parse, "proc sort: a `by` statement is required")
                .at_line(step.line)
        })?;

        let mut keys = Vec::new();
        let mut descending = false;
        for arg in &by.args {
            if arg == "descending" {
                descending = true;
                continue;
            }
            keys.push(SortKey {
                var: arg.clone(),
                descending,
            });
            descending = false;
        }
        if keys.is_empty() {
            return Err(InterpreterError::new(
                ErrorKind::Parse,
                "proc sort: the `by` statement names no variables",
            )
            .at_line(step.line));
        }
        for key in &keys {
            if !input.columns.contains(&key.var) {
                return Err(InterpreterError::new(
                    ErrorKind::Parse,
                    format!("proc sort: variable {} is not in the input table", key.var),
                )
                .at_line(step.line));
            }
        }

        let mut sorted = input.clone();
        sorted.rows.sort_by(|a, b| {
            for key in &keys {
                let x = a.get(&key.var).cloned().unwrap_or(Value::MISSING);
                let y = b.get(&key.var).cloned().unwrap_or(Value::MISSING);
                let ord = x.order(&y);
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let target = step.out.clone().unwrap_or_else(|| input_name.to_owned());
        Ok(ProcOutput {
            tables: vec![(target, sorted)],
            report: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SubStatement;
    use crate::table::Row;

    fn sample() -> Table {
        let mut t = Table::new(vec!["id".into(), "x".into()]);
        for (id, x) in [
            (Value::num(2.0), 20.0),
            (Value::MISSING, 0.0),
            (Value::num(1.0), 10.0),
        ] {
            let mut row = Row::new();
            row.insert("id".into(), id);
            row.insert("x".into(), Value::num(x));
            t.rows.push(row);
        }
        t
    }

    fn step_by(args: &[&str]) -> ProcStep {
        ProcStep {
            name: "sort".into(),
            data: None,
            out: None,
            noprint: false,
            options: Vec::new(),
            substatements: vec![SubStatement {
                keyword: "by".into(),
                args: args.iter().map(|a| (*a).to_owned()).collect(),
                line: 2,
            }],
            line: 1,
        }
    }

    fn ids(table: &Table) -> Vec<Value> {
        (0..table.len()).map(|i| table.get(i, "id")).collect()
    }

    #[test]
    fn ascending_with_missing_first() {
        let out = Sort.run(&sample(), "work.t", &step_by(&["id"])).expect("run");
        let (name, table) = &out.tables[0];
        assert_eq!(name, "work.t");
        assert_eq!(
            ids(table),
            vec![Value::MISSING, Value::num(1.0), Value::num(2.0)]
        );
    }

    #[test]
    fn descending_reverses_the_key() {
        let out = Sort
            .run(&sample(), "work.t", &step_by(&["descending", "id"]))
            .expect("run");
        assert_eq!(
            ids(&out.tables[0].1),
            vec![Value::num(2.0), Value::num(1.0), Value::MISSING]
        );
    }

    #[test]
    fn out_option_leaves_input_name_alone() {
        let mut step = step_by(&["id"]);
        step.out = Some("work.sorted".into());
        let out = Sort.run(&sample(), "work.t", &step).expect("run");
        assert_eq!(out.tables[0].0, "work.sorted");
    }

    #[test]
    fn sort_is_stable_within_equal_keys() {
        let mut t = Table::new(vec!["k".into(), "seq".into()]);
        for (k, seq) in [(1.0, 1.0), (1.0, 2.0), (0.0, 3.0)] {
            let mut row = Row::new();
            row.insert("k".into(), Value::num(k));
            row.insert("seq".into(), Value::num(seq));
            t.rows.push(row);
        }
        let out = Sort.run(&t, "work.t", &step_by(&["k"])).expect("run");
        let table = &out.tables[0].1;
        assert_eq!(table.get(1, "seq"), Value::num(1.0));
        assert_eq!(table.get(2, "seq"), Value::num(2.0));
    }

    #[test]
    fn missing_by_statement_is_an_error() {
        let mut step = step_by(&["id"]);
        step.substatements.clear();
        let err = Sort.run(&sample(), "work.t", &step).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
