//! Reference procedures: PRINT, MEANS, FREQ, SORT.

pub mod freq;
pub mod means;
pub mod print;
pub mod sort;

use crate::ast::ProcStep;
use crate::parser::qualify;
use crate::table::{Table, Value};

/// Identifier arguments of a sub-statement, e.g. the `var` list.
fn name_args(step: &ProcStep, keyword: &str) -> Option<Vec<String>> {
    step.substatement(keyword)
        .map(|s| s.args.iter().map(|a| a.to_ascii_lowercase()).collect())
}

/// Columns holding no character value anywhere.
fn numeric_columns(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|col| {
            !table
                .rows
                .iter()
                .any(|row| matches!(row.get(col.as_str()), Some(Value::Char(_))))
        })
        .cloned()
        .collect()
}

/// The `out=` target: header option first, then an `output out=...`
/// sub-statement.
fn out_target(step: &ProcStep) -> Option<String> {
    if let Some(out) = &step.out {
        return Some(out.clone());
    }
    step.substatement("output").and_then(|s| {
        s.args
            .iter()
            .find_map(|a| a.strip_prefix("out=").map(qualify))
    })
}

/// Right-align `text` to `width`.
fn pad(text: &str, width: usize) -> String {
    format!("{text:>width$}")
}
