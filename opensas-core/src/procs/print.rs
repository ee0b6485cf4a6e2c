//! PROC PRINT: observation listing.

use crate::ast::ProcStep;
use crate::error::{ErrorKind, InterpResult, InterpreterError};
use crate::proc::{ProcOutput, Procedure};
use crate::table::Table;

use super::{name_args, pad};

/// Lists observations, optionally restricted to a `var` list.
pub struct Print;

impl Procedure for Print {
    fn name(&self) -> &'static str {
        "print"
    }

    fn run(&self, input: &Table, _input_name: &str, step: &ProcStep) -> InterpResult<ProcOutput> {
        let columns = match name_args(step, "var") {
            Some(vars) => {
                for var in &vars {
                    if !input.columns.contains(var) {
                        return Err(InterpreterError::new(
                            ErrorKind::Parse,
                            format!("proc print: variable {var} is not in the input table"),
                        )
                        .at_line(step.line));
                    }
                }
                vars
            }
            None => input.columns.clone(),
        };

        let mut output = ProcOutput::default();
        if columns.is_empty() {
            return Ok(output);
        }

        // Cell texts, then per-column widths.
        let cells: Vec<Vec<String>> = (0..input.len())
            .map(|i| columns.iter().map(|c| input.get(i, c).to_string()).collect())
            .collect();
        let obs_width = "Obs".len().max(input.len().to_string().len());
        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(j, col)| {
                cells
                    .iter()
                    .map(|row| row[j].len())
                    .max()
                    .unwrap_or(0)
                    .max(col.len())
            })
            .collect();

        let mut header = pad("Obs", obs_width);
        for (col, width) in columns.iter().zip(&widths) {
            header.push_str("  ");
            header.push_str(&pad(col, *width));
        }
        output.report.push(header);

        for (i, row) in cells.iter().enumerate() {
            let mut line = pad(&(i + 1).to_string(), obs_width);
            for (cell, width) in row.iter().zip(&widths) {
                line.push_str("  ");
                line.push_str(&pad(cell, *width));
            }
            output.report.push(line);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SubStatement;
    use crate::table::{Row, Value};

    fn sample() -> Table {
        let mut t = Table::new(vec!["name".into(), "age".into()]);
        for (name, age) in [("ada", 30.0), ("grace", 41.0)] {
            let mut row = Row::new();
            row.insert("name".into(), Value::Char(name.into()));
            row.insert("age".into(), Value::num(age));
            t.rows.push(row);
        }
        t
    }

    fn step() -> ProcStep {
        ProcStep {
            name: "print".into(),
            data: None,
            out: None,
            noprint: false,
            options: Vec::new(),
            substatements: Vec::new(),
            line: 1,
        }
    }

    #[test]
    fn lists_all_columns_with_obs_numbers() {
        let out = Print.run(&sample(), "work.t", &step()).expect("run");
        assert_eq!(out.report.len(), 3);
        assert_eq!(out.report[0], "Obs   name  age");
        assert_eq!(out.report[1], "  1    ada   30");
        assert_eq!(out.report[2], "  2  grace   41");
    }

    #[test]
    fn var_list_restricts_columns() {
        let mut step = step();
        step.substatements.push(SubStatement {
            keyword: "var".into(),
            args: vec!["age".into()],
            line: 2,
        });
        let out = Print.run(&sample(), "work.t", &step).expect("run");
        assert_eq!(out.report[0], "Obs  age");
        assert_eq!(out.report[1], "  1   30");
    }

    #[test]
    fn unknown_var_is_an_error() {
        let mut step = step();
        step.substatements.push(SubStatement {
            keyword: "var".into(),
            args: vec!["nope".into()],
            line: 2,
        });
        let err = Print.run(&sample(), "work.t", &step).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[test]
    fn missing_prints_as_dot() {
        let mut t = Table::new(vec!["x".into()]);
        let mut row = Row::new();
        row.insert("x".into(), Value::MISSING);
        t.rows.push(row);
        let out = Print.run(&t, "work.t", &step()).expect("run");
        assert_eq!(out.report[1], "  1  .");
    }
}
