//! Program and statement AST.
//!
//! A parsed program is an ordered sequence of top-level steps. Statements
//! form a closed variant set; PROC sub-statements stay uninterpreted
//! `(keyword, raw args)` pairs so the parser remains procedure-agnostic
//! and each procedure pattern-matches only the keys it understands.

use crate::expr::Expr;
use crate::table::Value;

// ---------------------------------------------------------------------------
// Program and steps
// ---------------------------------------------------------------------------

/// A whole parsed program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Top-level steps, in source order.
    pub steps: Vec<Step>,
}

/// One top-level step.
#[derive(Debug, Clone)]
pub enum Step {
    /// A `data ... run;` block.
    Data(DataStep),
    /// A `proc ... run;`/`quit;` block.
    Proc(ProcStep),
    /// A `libname lib "path";` binding.
    Libname(LibraryBinding),
}

/// A DATA step: one or more output targets plus its statement list.
#[derive(Debug, Clone)]
pub struct DataStep {
    /// Output table names (already libref-qualified), in declaration order.
    pub targets: Vec<String>,
    /// Statements between the header and `run;`, in source order.
    pub statements: Vec<Statement>,
    /// Line of the `data` header.
    pub line: u32,
}

/// A PROC step header plus its sub-statements.
#[derive(Debug, Clone)]
pub struct ProcStep {
    /// Procedure name, lowercased.
    pub name: String,
    /// `data=` input table (qualified), if given.
    pub data: Option<String>,
    /// `out=` result table (qualified), if given on the header.
    pub out: Option<String>,
    /// Whether `noprint` was given on the header.
    pub noprint: bool,
    /// Remaining header options as `(key, value)` pairs; flag options have
    /// no value.
    pub options: Vec<(String, Option<String>)>,
    /// Sub-statements, uninterpreted.
    pub substatements: Vec<SubStatement>,
    /// Line of the `proc` header.
    pub line: u32,
}

impl ProcStep {
    /// The first sub-statement with the given keyword, if any.
    #[must_use]
    pub fn substatement(&self, keyword: &str) -> Option<&SubStatement> {
        self.substatements.iter().find(|s| s.keyword == keyword)
    }
}

/// A generic PROC sub-statement: keyword plus raw argument words.
#[derive(Debug, Clone)]
pub struct SubStatement {
    /// Keyword, lowercased (`var`, `class`, `tables`, `by`, `output`, …).
    pub keyword: String,
    /// Argument words in source order (identifiers lowercased, literals
    /// and punctuation kept as written).
    pub args: Vec<String>,
    /// Source line.
    pub line: u32,
}

/// A `libname` binding of a libref to a directory.
#[derive(Debug, Clone)]
pub struct LibraryBinding {
    /// Libref, lowercased.
    pub libref: String,
    /// Directory path, as written.
    pub path: String,
    /// Source line.
    pub line: u32,
}

// ---------------------------------------------------------------------------
// DATA-step statements
// ---------------------------------------------------------------------------

/// How multiple input tables combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// `set a b;`: concatenate.
    Set,
    /// `merge a b;`: pair rows (by BY keys when a BY statement is given).
    Merge,
}

/// Input table list for SET/MERGE.
#[derive(Debug, Clone)]
pub struct SetSource {
    /// Qualified input table names.
    pub tables: Vec<String>,
    /// Concatenate or merge.
    pub mode: MergeMode,
}

/// An `input` variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputVar {
    /// Variable name, lowercased.
    pub name: String,
    /// Whether the variable is character (`name $`).
    pub is_char: bool,
}

/// One branch of an IF/ELSE IF chain.
#[derive(Debug, Clone)]
pub struct IfBranch {
    /// The branch condition.
    pub cond: Expr,
    /// Statements executed when the condition holds.
    pub body: Vec<Statement>,
}

/// A DATA-step statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// `target = expr;`
    Assign {
        /// Assigned variable, lowercased.
        target: String,
        /// Right-hand side.
        expr: Expr,
        /// Source line.
        line: u32,
    },
    /// `if ... then ...; else if ...; else ...;` chain.
    If {
        /// THEN/ELSE-IF branches, in order.
        branches: Vec<IfBranch>,
        /// ELSE body (empty if absent).
        else_body: Vec<Statement>,
        /// Source line.
        line: u32,
    },
    /// `input x y $ ...;`
    Input {
        /// Declared variables, in order.
        vars: Vec<InputVar>,
    },
    /// `datalines;` with its captured raw body.
    Datalines {
        /// Raw data text.
        body: String,
    },
    /// `set`/`merge` input tables.
    Set(SetSource),
    /// Step-level `where` filter.
    Where(Expr),
    /// `drop x y;`
    Drop(Vec<String>),
    /// `keep x y;`
    Keep(Vec<String>),
    /// `rename old=new ...;`
    Rename(Vec<(String, String)>),
    /// `output;` or `output t1 t2;`
    Output {
        /// Explicit targets; empty means all step targets.
        targets: Vec<String>,
    },
    /// `retain x y 0 ...;`, names with optional initial values.
    Retain {
        /// Retained variables and their initial values.
        vars: Vec<(String, Option<Value>)>,
    },
    /// `by x y;`
    By {
        /// BY variables, in order.
        vars: Vec<String>,
    },
}
