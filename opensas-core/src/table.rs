//! Tabular data model: values, rows, tables.
//!
//! A [`Value`] is either numeric (possibly missing) or character. A
//! [`Table`] is an ordered sequence of rows with an explicit column order;
//! DATA steps produce new tables rather than mutating sources in place.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A numeric value; `None` is the missing value, printed as `.`.
    Number(Option<f64>),
    /// A character value.
    Char(String),
}

impl Value {
    /// The numeric missing value.
    pub const MISSING: Self = Self::Number(None);

    /// Construct a known numeric value.
    #[must_use]
    pub const fn num(v: f64) -> Self {
        Self::Number(Some(v))
    }

    /// Whether this value is numeric missing.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Number(None))
    }

    /// The numeric value, if known.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => *v,
            Self::Char(_) => None,
        }
    }

    /// Truthiness: non-missing and nonzero (characters: non-blank).
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(Some(v)) => *v != 0.0,
            Self::Number(None) => false,
            Self::Char(s) => !s.trim().is_empty(),
        }
    }

    /// Total ordering used by BY-group comparison and PROC SORT.
    ///
    /// Numeric missing sorts below every finite number. Numbers sort below
    /// characters when types are mixed in a column.
    #[must_use]
    pub fn order(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                let a = a.unwrap_or(f64::NEG_INFINITY);
                let b = b.unwrap_or(f64::NEG_INFINITY);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Self::Char(a), Self::Char(b)) => a.cmp(b),
            (Self::Number(_), Self::Char(_)) => Ordering::Less,
            (Self::Char(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(None) => write!(f, "."),
            Self::Number(Some(v)) => write!(f, "{}", format_number(*v)),
            Self::Char(s) => write!(f, "{s}"),
        }
    }
}

/// Format a number the way listings print it: integers without a fraction,
/// other values with trailing zeros trimmed.
#[must_use]
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        let s = format!("{v:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A row: column name → value. Column order lives on the table.
pub type Row = HashMap<String, Value>;

/// A named, ordered sequence of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column names, in declaration order.
    pub columns: Vec<String>,
    /// Observations, in order.
    pub rows: Vec<Row>,
}

impl Table {
    /// Create an empty table with the given column order.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The value at (row, column); missing if the cell is absent.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or(Value::MISSING)
    }

    /// Append a row, extending the column list with any new names in the
    /// order given.
    pub fn push_row(&mut self, names: &[String], row: Row) {
        for name in names {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.clone());
            }
        }
        self.rows.push(row);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_basics() {
        assert!(Value::MISSING.is_missing());
        assert!(!Value::num(0.0).is_missing());
        assert_eq!(Value::MISSING.as_number(), None);
        assert_eq!(Value::num(2.5).as_number(), Some(2.5));
    }

    #[test]
    fn truthiness() {
        assert!(Value::num(1.0).is_truthy());
        assert!(Value::num(-0.5).is_truthy());
        assert!(!Value::num(0.0).is_truthy());
        assert!(!Value::MISSING.is_truthy());
        assert!(Value::Char("x".into()).is_truthy());
        assert!(!Value::Char("  ".into()).is_truthy());
    }

    #[test]
    fn missing_sorts_below_everything_numeric() {
        assert_eq!(Value::MISSING.order(&Value::num(-1e30)), Ordering::Less);
        assert_eq!(Value::num(1.0).order(&Value::MISSING), Ordering::Greater);
        assert_eq!(Value::MISSING.order(&Value::MISSING), Ordering::Equal);
    }

    #[test]
    fn character_ordering() {
        assert_eq!(
            Value::Char("a".into()).order(&Value::Char("b".into())),
            Ordering::Less
        );
        assert_eq!(
            Value::num(9.0).order(&Value::Char("a".into())),
            Ordering::Less
        );
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::MISSING.to_string(), ".");
        assert_eq!(Value::num(3.0).to_string(), "3");
        assert_eq!(Value::num(3.25).to_string(), "3.25");
        assert_eq!(Value::Char("abc".into()).to_string(), "abc");
    }

    #[test]
    fn number_formatting_trims_zeros() {
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.125), "0.125");
        assert_eq!(format_number(-2.0), "-2");
    }

    #[test]
    fn push_row_extends_columns_once() {
        let mut t = Table::new(vec!["x".into()]);
        let mut row = Row::new();
        row.insert("x".into(), Value::num(1.0));
        row.insert("y".into(), Value::num(2.0));
        t.push_row(&["x".into(), "y".into()], row.clone());
        t.push_row(&["x".into(), "y".into()], row);
        assert_eq!(t.columns, vec!["x".to_owned(), "y".to_owned()]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1, "y"), Value::num(2.0));
    }

    #[test]
    fn get_absent_cell_is_missing() {
        let t = Table::new(vec!["x".into()]);
        assert_eq!(t.get(0, "x"), Value::MISSING);
    }

    #[test]
    fn serde_round_trip() {
        let mut t = Table::new(vec!["x".into(), "name".into()]);
        let mut row = Row::new();
        row.insert("x".into(), Value::MISSING);
        row.insert("name".into(), Value::Char("Ada".into()));
        t.push_row(&t.columns.clone(), row);
        let json = serde_json::to_string(&t).expect("serialize");
        let back: Table = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, t);
    }
}
