//! Procedure contract and dispatcher.
//!
//! A procedure consumes one input table and produces zero or more named
//! result tables plus listing report lines. The dispatcher resolves the
//! `data=` input (falling back to the most recently created table), runs
//! the registered implementation, stores the result tables, and routes the
//! report to the listing. `NOPRINT` suppresses the report but never the
//! result tables.

use std::collections::HashMap;

use crate::ast::ProcStep;
use crate::error::{Diagnostics, ErrorKind, InterpResult, InterpreterError};
use crate::procs;
use crate::store::TableStore;
use crate::table::Table;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// What a procedure run produced.
#[derive(Debug, Default)]
pub struct ProcOutput {
    /// Result tables to store, `(qualified name, table)`.
    pub tables: Vec<(String, Table)>,
    /// Listing lines, in order.
    pub report: Vec<String>,
}

/// One procedure implementation.
pub trait Procedure {
    /// The procedure keyword this implementation answers to.
    fn name(&self) -> &'static str;

    /// Run against `input` (stored under `input_name`).
    fn run(&self, input: &Table, input_name: &str, step: &ProcStep) -> InterpResult<ProcOutput>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name → implementation registry.
pub struct ProcRegistry {
    map: HashMap<String, Box<dyn Procedure>>,
}

impl ProcRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// The standard registry: PRINT, MEANS, FREQ, SORT.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(procs::print::Print));
        registry.register(Box::new(procs::means::Means));
        registry.register(Box::new(procs::freq::Freq));
        registry.register(Box::new(procs::sort::Sort));
        registry
    }

    /// Register (or replace) an implementation.
    pub fn register(&mut self, procedure: Box<dyn Procedure>) {
        self.map.insert(procedure.name().to_owned(), procedure);
    }

    #[must_use]
    fn get(&self, name: &str) -> Option<&dyn Procedure> {
        self.map.get(name).map(|p| &**p)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Run one PROC step. Returns the names of the tables it created.
pub fn dispatch(
    registry: &ProcRegistry,
    step: &ProcStep,
    store: &mut dyn TableStore,
    default_input: Option<&str>,
    listing: &mut Vec<String>,
    diags: &mut Diagnostics,
) -> InterpResult<Vec<String>> {
    let Some(procedure) = registry.get(&step.name) else {
        return Err(InterpreterError::new(
            ErrorKind::UnknownProcedure,
            format!("procedure {} is not registered", step.name),
        )
        .at_line(step.line));
    };

    let input_name = match (&step.data, default_input) {
        (Some(name), _) => name.clone(),
        (None, Some(recent)) => recent.to_owned(),
        (None, None) => {
            return Err(InterpreterError::new(
                ErrorKind::TableNotFound,
                format!("proc {}: no input table available", step.name),
            )
            .at_line(step.line));
        }
    };
    let input = store.load(&input_name).map_err(|e| e.at_line(step.line))?;

    let output = procedure.run(&input, &input_name, step)?;

    let mut created = Vec::with_capacity(output.tables.len());
    for (name, table) in output.tables {
        diags.note(format!(
            "the table {name} has {} rows and {} columns",
            table.len(),
            table.columns.len()
        ));
        created.push(name.clone());
        store.save(&name, table)?;
    }
    if !step.noprint {
        listing.extend(output.report);
    }
    Ok(created)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
