//! Interpreter for a SAS-flavored statistical scripting language:
//! macro preprocessing, DATA steps, and a small set of procedures.

pub mod ast;
pub mod datastep;
pub mod error;
pub mod expr;
pub mod interpreter;
pub mod macros;
pub mod parser;
pub mod proc;
pub mod procs;
pub mod scanner;
pub mod store;
pub mod table;
pub mod token;

pub use error::{Diagnostic, Diagnostics, ErrorKind, InterpResult, InterpreterError, Severity};
pub use interpreter::{Interpreter, RunReport};
pub use table::{Table, Value};
