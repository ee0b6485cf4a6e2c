//! PROC FREQ: one-way frequency tables and two-way cross-tabulations.

use crate::ast::ProcStep;
use crate::error::{ErrorKind, InterpResult, InterpreterError};
use crate::proc::{ProcOutput, Procedure};
use crate::table::{Row, Table, Value};

use super::{name_args, out_target, pad};

/// One request from the `tables` statement.
#[derive(Debug, PartialEq, Eq)]
enum TableRequest {
    /// `tables a;`
    OneWay(String),
    /// `tables a*b;` (row variable, column variable).
    CrossTab(String, String),
}

/// Counts distinct values of each `tables` request; `a*b` produces a
/// two-way table with row and column margins. Missing values are excluded
/// from the counts and the percent base.
pub struct Freq;

impl Procedure for Freq {
    fn name(&self) -> &'static str {
        "freq"
    }

    fn run(&self, input: &Table, _input_name: &str, step: &ProcStep) -> InterpResult<ProcOutput> {
        let args = name_args(step, "tables").ok_or_else(|| {
            InterpreterError::new(
                ErrorKind::Parse,
                "proc freq: a `tables` statement is required",
            )
            .at_line(step.line)
        })?;
        let (requests, options) = parse_tables(&args, step.line)?;
        let nopercent = options.iter().any(|o| o == "nopercent");

        for var in requests.iter().flat_map(|r| match r {
            TableRequest::OneWay(v) => vec![v],
            TableRequest::CrossTab(a, b) => vec![a, b],
        }) {
            if !input.columns.contains(var) {
                return Err(InterpreterError::new(
                    ErrorKind::Parse,
                    format!("proc freq: variable {var} is not in the input table"),
                )
                .at_line(step.line));
            }
        }

        let mut output = ProcOutput::default();
        for request in &requests {
            let out_table = match request {
                TableRequest::OneWay(var) => one_way(input, var, &mut output.report),
                TableRequest::CrossTab(rows_var, cols_var) => {
                    crosstab(input, rows_var, cols_var, nopercent, &mut output.report)
                }
            };
            // OUT= captures the first request only.
            if output.tables.is_empty() {
                if let Some(target) = out_target(step) {
                    output.tables.push((target, out_table));
                }
            }
        }
        Ok(output)
    }
}

/// Split `tables` arguments into requests and `/` options.
fn parse_tables(args: &[String], line: u32) -> InterpResult<(Vec<TableRequest>, Vec<String>)> {
    let bad = |msg: &str| {
        Err(InterpreterError::new(ErrorKind::Parse, format!("proc freq: {msg}")).at_line(line))
    };

    let (spec, options) = match args.iter().position(|a| a == "/") {
        Some(slash) => (&args[..slash], args[slash + 1..].to_vec()),
        None => (args, Vec::new()),
    };

    let mut requests = Vec::new();
    let mut i = 0;
    while i < spec.len() {
        let first = &spec[i];
        if first == "*" {
            return bad("`*` without a preceding variable in `tables`");
        }
        if spec.get(i + 1).is_some_and(|a| a == "*") {
            let Some(second) = spec.get(i + 2).filter(|a| *a != "*") else {
                return bad("`*` needs a variable on both sides");
            };
            if spec.get(i + 3).is_some_and(|a| a == "*") {
                return bad("only one-way and two-way tables are supported");
            }
            requests.push(TableRequest::CrossTab(first.clone(), second.clone()));
            i += 3;
        } else {
            requests.push(TableRequest::OneWay(first.clone()));
            i += 1;
        }
    }
    if requests.is_empty() {
        return bad("`tables` needs at least one variable");
    }
    Ok((requests, options))
}

/// One-way table: value / frequency / percent of non-missing total.
fn one_way(input: &Table, var: &str, report: &mut Vec<String>) -> Table {
    let counts = count_values(input, var);
    #[allow(clippy::cast_precision_loss)]
    let total: f64 = counts.iter().map(|(_, n)| *n as f64).sum();

    let value_width = counts
        .iter()
        .map(|(v, _)| v.to_string().len())
        .max()
        .unwrap_or(0)
        .max(var.len());
    report.push(format!(
        "{:<value_width$}  {}  {}",
        var,
        pad("Frequency", 9),
        pad("Percent", 7)
    ));

    let mut out_table = Table::new(vec![
        var.to_owned(),
        "count".to_owned(),
        "percent".to_owned(),
    ]);
    for (value, count) in counts {
        #[allow(clippy::cast_precision_loss)]
        let percent = if total > 0.0 {
            100.0 * (count as f64) / total
        } else {
            0.0
        };
        report.push(format!(
            "{:<value_width$}  {}  {}",
            value.to_string(),
            pad(&count.to_string(), 9),
            pad(&format!("{percent:.2}"), 7)
        ));
        let mut row = Row::new();
        row.insert(var.to_owned(), value);
        #[allow(clippy::cast_precision_loss)]
        row.insert("count".to_owned(), Value::num(count as f64));
        row.insert("percent".to_owned(), Value::num(percent));
        out_table.rows.push(row);
    }
    out_table
}

/// Two-way table: counts per (row value, column value) cell with `Total`
/// margins, then per-row percent lines unless `nopercent` was given.
fn crosstab(
    input: &Table,
    rows_var: &str,
    cols_var: &str,
    nopercent: bool,
    report: &mut Vec<String>,
) -> Table {
    // Pairs where both variables are present and non-missing.
    let pairs: Vec<(&Value, &Value)> = input
        .rows
        .iter()
        .filter_map(|row| {
            let a = row.get(rows_var).filter(|v| !v.is_missing())?;
            let b = row.get(cols_var).filter(|v| !v.is_missing())?;
            Some((a, b))
        })
        .collect();

    let row_values = distinct_sorted(pairs.iter().map(|(a, _)| *a));
    let col_values = distinct_sorted(pairs.iter().map(|(_, b)| *b));

    let mut cells = vec![vec![0usize; col_values.len()]; row_values.len()];
    for (a, b) in &pairs {
        let i = row_values.iter().position(|v| v == *a);
        let j = col_values.iter().position(|v| v == *b);
        if let (Some(i), Some(j)) = (i, j) {
            cells[i][j] += 1;
        }
    }
    let row_totals: Vec<usize> = cells.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<usize> =
        (0..col_values.len()).map(|j| cells.iter().map(|r| r[j]).sum()).collect();
    let grand_total: usize = row_totals.iter().sum();

    // Listing: row values down, column values across, margins on both.
    let label = format!("{rows_var}*{cols_var}");
    let row_width = row_values
        .iter()
        .map(|v| v.to_string().len())
        .max()
        .unwrap_or(0)
        .max(label.len())
        .max("Total".len());
    let col_widths: Vec<usize> = col_values
        .iter()
        .enumerate()
        .map(|(j, v)| {
            v.to_string()
                .len()
                .max(col_totals[j].to_string().len())
        })
        .collect();
    let total_width = "Total".len().max(grand_total.to_string().len());

    let mut header = format!("{label:<row_width$}");
    for (value, width) in col_values.iter().zip(&col_widths) {
        header.push_str("  ");
        header.push_str(&pad(&value.to_string(), *width));
    }
    header.push_str("  ");
    header.push_str(&pad("Total", total_width));
    report.push(header);

    for (i, value) in row_values.iter().enumerate() {
        let mut line = format!("{:<row_width$}", value.to_string());
        for (j, width) in col_widths.iter().enumerate() {
            line.push_str("  ");
            line.push_str(&pad(&cells[i][j].to_string(), *width));
        }
        line.push_str("  ");
        line.push_str(&pad(&row_totals[i].to_string(), total_width));
        report.push(line);
    }
    let mut totals = format!("{:<row_width$}", "Total");
    for (j, width) in col_widths.iter().enumerate() {
        totals.push_str("  ");
        totals.push_str(&pad(&col_totals[j].to_string(), *width));
    }
    totals.push_str("  ");
    totals.push_str(&pad(&grand_total.to_string(), total_width));
    report.push(totals);

    if !nopercent && grand_total > 0 {
        report.push(String::new());
        for (value, total) in row_values.iter().zip(&row_totals) {
            #[allow(clippy::cast_precision_loss)]
            let percent = 100.0 * (*total as f64) / (grand_total as f64);
            report.push(format!("{value}: {total} ({percent:.2}%)"));
        }
    }

    // OUT= rows are the full grid in long form, one row per cell.
    let mut out_table = Table::new(vec![
        rows_var.to_owned(),
        cols_var.to_owned(),
        "count".to_owned(),
    ]);
    for (i, row_value) in row_values.iter().enumerate() {
        for (j, col_value) in col_values.iter().enumerate() {
            let mut row = Row::new();
            row.insert(rows_var.to_owned(), row_value.clone());
            row.insert(cols_var.to_owned(), col_value.clone());
            #[allow(clippy::cast_precision_loss)]
            row.insert("count".to_owned(), Value::num(cells[i][j] as f64));
            out_table.rows.push(row);
        }
    }
    out_table
}

/// Distinct non-missing values with their counts, in value order.
fn count_values(input: &Table, var: &str) -> Vec<(Value, usize)> {
    let mut counts: Vec<(Value, usize)> = Vec::new();
    for row in &input.rows {
        let Some(value) = row.get(var) else { continue };
        if value.is_missing() {
            continue;
        }
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.clone(), 1)),
        }
    }
    counts.sort_by(|(a, _), (b, _)| a.order(b));
    counts
}

/// Distinct values in value order.
fn distinct_sorted<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for value in values {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out.sort_by(Value::order);
    out
}
