//! PROC MEANS: n / mean / std / min / max per numeric variable,
//! optionally per BY group.

use crate::ast::ProcStep;
use crate::proc::{ProcOutput, Procedure};
use crate::table::{format_number, Row, Table, Value};

use crate::error::InterpResult;

use super::{name_args, numeric_columns, out_target, pad};

const STAT_WIDTH: usize = 12;

/// Per-variable summary statistics over the non-missing values.
#[derive(Debug, Clone, Copy)]
struct Summary {
    n: usize,
    mean: Option<f64>,
    std: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

fn summarize(values: &[f64]) -> Summary {
    let n = values.len();
    if n == 0 {
        return Summary {
            n,
            mean: None,
            std: None,
            min: None,
            max: None,
        };
    }
    #[allow(clippy::cast_precision_loss)]
    let count = n as f64;
    let mean = values.iter().sum::<f64>() / count;
    // Sample standard deviation; undefined below two observations.
    let std = if n > 1 {
        let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        Some((ss / (count - 1.0)).sqrt())
    } else {
        None
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Summary {
        n,
        mean: Some(mean),
        std,
        min: Some(min),
        max: Some(max),
    }
}

fn stat_cell(v: Option<f64>) -> String {
    v.map_or_else(|| ".".to_owned(), format_number)
}

/// Consecutive runs of equal BY values. Input is expected sorted on the
/// BY variables, as for BY processing in a DATA step.
fn by_groups<'a>(rows: &'a [Row], by_vars: &[String]) -> Vec<(Vec<Value>, &'a [Row])> {
    if by_vars.is_empty() {
        return vec![(Vec::new(), rows)];
    }
    let key_of = |row: &Row| -> Vec<Value> {
        by_vars
            .iter()
            .map(|v| row.get(v.as_str()).cloned().unwrap_or(Value::MISSING))
            .collect()
    };
    let mut groups = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let key = key_of(&rows[start]);
        let mut end = start + 1;
        while end < rows.len() && key_of(&rows[end]) == key {
            end += 1;
        }
        groups.push((key, &rows[start..end]));
        start = end;
    }
    groups
}

/// Summarizes numeric variables (`var` list, or every numeric column),
/// one statistics block per BY group when a `by` statement is given.
pub struct Means;

impl Procedure for Means {
    fn name(&self) -> &'static str {
        "means"
    }

    fn run(&self, input: &Table, _input_name: &str, step: &ProcStep) -> InterpResult<ProcOutput> {
        let by_vars = name_args(step, "by")
            .unwrap_or_default()
            .into_iter()
            .filter(|v| input.columns.contains(v))
            .collect::<Vec<_>>();
        let variables = name_args(step, "var")
            .unwrap_or_else(|| numeric_columns(input))
            .into_iter()
            .filter(|v| input.columns.contains(v) && !by_vars.contains(v))
            .collect::<Vec<_>>();

        let mut output = ProcOutput::default();
        let var_width = variables
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max("Variable".len());

        let mut header = format!("{:<var_width$}", "Variable");
        for title in ["N", "Mean", "Std Dev", "Minimum", "Maximum"] {
            header.push_str("  ");
            header.push_str(&pad(title, STAT_WIDTH));
        }

        let mut columns = by_vars.clone();
        columns.extend(
            ["variable", "n", "mean", "std", "min", "max"]
                .iter()
                .map(|c| (*c).to_owned()),
        );
        let mut out_table = Table::new(columns);

        for (key, rows) in by_groups(&input.rows, &by_vars) {
            if !key.is_empty() {
                let label = by_vars
                    .iter()
                    .zip(&key)
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                output.report.push(label);
            }
            output.report.push(header.clone());

            for var in &variables {
                let values: Vec<f64> = rows
                    .iter()
                    .filter_map(|row| row.get(var.as_str()).and_then(Value::as_number))
                    .collect();
                let summary = summarize(&values);

                let mut line = format!("{var:<var_width$}");
                line.push_str("  ");
                line.push_str(&pad(&summary.n.to_string(), STAT_WIDTH));
                for stat in [summary.mean, summary.std, summary.min, summary.max] {
                    line.push_str("  ");
                    line.push_str(&pad(&stat_cell(stat), STAT_WIDTH));
                }
                output.report.push(line);

                let mut row = Row::new();
                for (name, value) in by_vars.iter().zip(&key) {
                    row.insert(name.clone(), value.clone());
                }
                row.insert("variable".to_owned(), Value::Char(var.clone()));
                #[allow(clippy::cast_precision_loss)]
                row.insert("n".to_owned(), Value::num(summary.n as f64));
                row.insert("mean".to_owned(), Value::Number(summary.mean));
                row.insert("std".to_owned(), Value::Number(summary.std));
                row.insert("min".to_owned(), Value::Number(summary.min));
                row.insert("max".to_owned(), Value::Number(summary.max));
                out_table.rows.push(row);
            }
        }

        if let Some(target) = out_target(step) {
            output.tables.push((target, out_table));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SubStatement;

    fn sample() -> Table {
        let mut t = Table::new(vec!["name".into(), "age".into()]);
        for (name, age) in [
            ("a", Value::num(10.0)),
            ("b", Value::num(20.0)),
            ("c", Value::MISSING),
            ("d", Value::num(30.0)),
        ] {
            let mut row = Row::new();
            row.insert("name".into(), Value::Char(name.into()));
            row.insert("age".into(), age);
            t.rows.push(row);
        }
        t
    }

    fn grouped_sample() -> Table {
        let mut t = Table::new(vec!["g".into(), "x".into()]);
        for (g, x) in [(1.0, 10.0), (1.0, 20.0), (2.0, 30.0)] {
            let mut row = Row::new();
            row.insert("g".into(), Value::num(g));
            row.insert("x".into(), Value::num(x));
            t.rows.push(row);
        }
        t
    }

    fn step() -> ProcStep {
        ProcStep {
            name: "means".into(),
            data: None,
            out: None,
            noprint: false,
            options: Vec::new(),
            substatements: Vec::new(),
            line: 1,
        }
    }

    fn with_by(mut step: ProcStep, vars: &[&str]) -> ProcStep {
        step.substatements.push(SubStatement {
            keyword: "by".into(),
            args: vars.iter().map(|v| (*v).to_owned()).collect(),
            line: 2,
        });
        step
    }

    #[test]
    fn summary_skips_missing() {
        let out = Means.run(&sample(), "work.t", &step()).expect("run");
        // Header plus one numeric variable (`name` is character).
        assert_eq!(out.report.len(), 2);
        let line = &out.report[1];
        assert!(line.starts_with("age"), "{line}");
        assert!(line.contains(" 3 "), "n=3 in {line}");
        assert!(line.contains("20"), "mean in {line}");
        assert!(line.contains("10"), "min in {line}");
        assert!(line.contains("30"), "max in {line}");
    }

    #[test]
    fn out_table_has_one_row_per_variable() {
        let mut step = step();
        step.out = Some("work.stats".into());
        let out = Means.run(&sample(), "work.t", &step).expect("run");
        let (name, table) = &out.tables[0];
        assert_eq!(name, "work.stats");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "variable"), Value::Char("age".into()));
        assert_eq!(table.get(0, "n"), Value::num(3.0));
        assert_eq!(table.get(0, "mean"), Value::num(20.0));
        assert_eq!(table.get(0, "min"), Value::num(10.0));
        assert_eq!(table.get(0, "max"), Value::num(30.0));
    }

    #[test]
    fn out_target_from_output_substatement() {
        let mut step = step();
        step.substatements.push(SubStatement {
            keyword: "output".into(),
            args: vec!["out=stats".into()],
            line: 2,
        });
        let out = Means.run(&sample(), "work.t", &step).expect("run");
        assert_eq!(out.tables[0].0, "work.stats");
    }

    #[test]
    fn std_of_single_value_is_missing() {
        let mut t = Table::new(vec!["x".into()]);
        let mut row = Row::new();
        row.insert("x".into(), Value::num(5.0));
        t.rows.push(row);
        let mut step = step();
        step.out = Some("work.s".into());
        let out = Means.run(&t, "work.t", &step).expect("run");
        assert_eq!(out.tables[0].1.get(0, "std"), Value::MISSING);
    }

    #[test]
    fn sample_std_dev() {
        let s = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let std = s.std.expect("std defined");
        assert!((std - 2.138_089_935).abs() < 1e-6, "std = {std}");
    }

    #[test]
    fn var_list_ignores_unknown_names() {
        let mut step = step();
        step.substatements.push(SubStatement {
            keyword: "var".into(),
            args: vec!["age".into(), "ghost".into()],
            line: 2,
        });
        let out = Means.run(&sample(), "work.t", &step).expect("run");
        assert_eq!(out.report.len(), 2);
    }

    #[test]
    fn by_statement_groups_statistics() {
        let mut step = with_by(step(), &["g"]);
        step.out = Some("work.stats".into());
        let out = Means.run(&grouped_sample(), "work.t", &step).expect("run");

        // Two groups: label, header, one stats line each.
        assert_eq!(out.report.len(), 6);
        assert_eq!(out.report[0], "g=1");
        assert!(out.report[2].starts_with('x'), "{}", out.report[2]);
        assert!(out.report[2].contains("15"), "mean in {}", out.report[2]);
        assert_eq!(out.report[3], "g=2");
        assert!(out.report[5].contains("30"), "mean in {}", out.report[5]);

        let (_, table) = &out.tables[0];
        assert_eq!(table.columns[0], "g");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "g"), Value::num(1.0));
        assert_eq!(table.get(0, "n"), Value::num(2.0));
        assert_eq!(table.get(0, "mean"), Value::num(15.0));
        assert_eq!(table.get(1, "g"), Value::num(2.0));
        assert_eq!(table.get(1, "mean"), Value::num(30.0));
    }

    #[test]
    fn by_variables_are_not_analysis_variables() {
        // Without a `var` list, the BY variable must not be summarized.
        let out = Means
            .run(&grouped_sample(), "work.t", &with_by(step(), &["g"]))
            .expect("run");
        assert!(out.report.iter().all(|l| !l.starts_with("g ")), "{:?}", out.report);
    }
}
