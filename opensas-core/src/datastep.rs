//! DATA-step engine: the implicit per-observation execution loop.
//!
//! A step runs as a state machine `Initializing → Iterating → Finalizing →
//! Done`. Initializing resolves SET/MERGE inputs (and checks MERGE sort
//! order), seeds RETAIN initial values, and materializes the input rows.
//! Iterating executes the statement list once per input row; every
//! variable is implicitly retained, so a value written in one iteration is
//! still visible in the next unless the input row or an assignment
//! overwrites it. Finalizing persists the accumulated target tables.
//!
//! Failure policy: resolution problems (unknown input table, unsorted
//! MERGE) abort the step and leave its targets unchanged; per-row
//! evaluation errors set `_ERROR_`, record a diagnostic, and let the row
//! through with a missing value where the assignment failed.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::ast::{DataStep, InputVar, MergeMode, SetSource, Statement};
use crate::error::{Diagnostics, ErrorKind, InterpResult, InterpreterError, Severity};
use crate::expr::{self, Expr, FunctionTable, VarContext};
use crate::store::TableStore;
use crate::table::{Row, Table, Value};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one DATA step against the store. Returns the names of the tables
/// the step created.
pub fn run_data_step(
    step: &DataStep,
    store: &mut dyn TableStore,
    funcs: &FunctionTable,
    diags: &mut Diagnostics,
) -> InterpResult<Vec<String>> {
    let mut engine = Engine::new(step, funcs);
    engine.initialize(store)?;
    engine.iterate(diags);
    engine.finalize(store, diags)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Engine phase; transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Iterating,
    Finalizing,
    Done,
}

/// Declarative statements collected before the loop starts.
#[derive(Default)]
struct StepDecls<'a> {
    source: Option<&'a SetSource>,
    input_vars: Vec<InputVar>,
    datalines: Option<&'a str>,
    where_clause: Option<&'a Expr>,
    by_vars: Vec<String>,
    drop: Vec<String>,
    keep: Vec<String>,
    rename: Vec<(String, String)>,
    retain: Vec<(String, Option<Value>)>,
    has_explicit_output: bool,
}

struct Engine<'a> {
    step: &'a DataStep,
    funcs: &'a FunctionTable,
    phase: Phase,
    decls: StepDecls<'a>,
    /// Materialized input rows (empty for a no-input step).
    input_rows: Vec<Row>,
    /// Whether the step has an input source at all.
    has_input: bool,
    /// Retained variable store; automatics and FIRST./LAST. live here too.
    env: Row,
    /// Column order: first appearance wins.
    var_order: Vec<String>,
    /// Accumulated output tables, one per target, in declaration order.
    outputs: Vec<(String, Table)>,
    /// Names read before any value was bound.
    uninitialized: RefCell<HashSet<String>>,
}

impl<'a> Engine<'a> {
    fn new(step: &'a DataStep, funcs: &'a FunctionTable) -> Self {
        Self {
            step,
            funcs,
            phase: Phase::Initializing,
            decls: StepDecls::default(),
            input_rows: Vec::new(),
            has_input: false,
            env: Row::new(),
            var_order: Vec::new(),
            outputs: step
                .targets
                .iter()
                .map(|t| (t.clone(), Table::default()))
                .collect(),
            uninitialized: RefCell::new(HashSet::new()),
        }
    }

    // -- Initializing --

    fn initialize(&mut self, store: &mut dyn TableStore) -> InterpResult<()> {
        collect_decls(&self.step.statements, &mut self.decls);

        let retain = self.decls.retain.clone();
        for (name, init) in retain {
            self.note_var(&name);
            if let Some(value) = init {
                self.env.insert(name, value);
            }
        }

        if let Some(source) = self.decls.source {
            let mut tables = Vec::with_capacity(source.tables.len());
            for name in &source.tables {
                tables.push((name.as_str(), store.load(name)?));
            }
            self.input_rows = match source.mode {
                MergeMode::Set => concatenate(&tables, &mut self.var_order),
                MergeMode::Merge => {
                    merge_tables(&tables, &self.decls.by_vars, &mut self.var_order)?
                }
            };
            self.has_input = true;
        } else if let Some(body) = self.decls.datalines {
            self.input_rows = read_datalines(body, &self.decls.input_vars);
            let names: Vec<String> =
                self.decls.input_vars.iter().map(|v| v.name.clone()).collect();
            for name in names {
                self.note_var(&name);
            }
            self.has_input = true;
        }

        self.phase = Phase::Iterating;
        Ok(())
    }

    // -- Iterating --

    fn iterate(&mut self, diags: &mut Diagnostics) {
        debug_assert_eq!(self.phase, Phase::Iterating);

        if !self.has_input {
            // A step with no input source executes exactly once.
            self.run_iteration(1.0, diags);
            self.phase = Phase::Finalizing;
            return;
        }

        // WHERE filters input rows before they reach the loop, so filtered
        // rows never increment _N_.
        let rows = std::mem::take(&mut self.input_rows);
        let mut surviving = Vec::with_capacity(rows.len());
        for row in rows {
            match &self.decls.where_clause {
                Some(cond) => {
                    let ctx = WhereContext { row: &row };
                    match expr::evaluate(cond, &ctx, self.funcs) {
                        Ok(v) if v.is_truthy() => surviving.push(row),
                        Ok(_) => {}
                        Err(err) => diags.push_error(&err.at_line(self.step.line)),
                    }
                }
                None => surviving.push(row),
            }
        }

        let keys: Vec<Vec<Value>> = if self.decls.by_vars.is_empty() {
            Vec::new()
        } else {
            surviving
                .iter()
                .map(|r| key_of(r, &self.decls.by_vars))
                .collect()
        };

        for (i, row) in surviving.iter().enumerate() {
            // Input columns were noted in Initializing, so overlay order
            // does not affect the emitted column order.
            for (name, value) in row {
                self.env.insert(name.clone(), value.clone());
            }
            if !self.decls.by_vars.is_empty() {
                self.set_group_flags(&keys, i);
            }
            #[allow(clippy::cast_precision_loss)]
            self.run_iteration((i + 1) as f64, diags);
        }
        self.phase = Phase::Finalizing;
    }

    /// Set `FIRST.var`/`LAST.var` for the row at `index`.
    ///
    /// A change in a BY key flags that key and every key after it.
    fn set_group_flags(&mut self, keys: &[Vec<Value>], index: usize) {
        let by_vars = self.decls.by_vars.clone();
        let first_change = match index.checked_sub(1).map(|p| &keys[p]) {
            None => 0,
            Some(prev) => diverging_key(prev, &keys[index]).unwrap_or(by_vars.len()),
        };
        let last_change = match keys.get(index + 1) {
            None => 0,
            Some(next) => diverging_key(&keys[index], next).unwrap_or(by_vars.len()),
        };
        for (j, var) in by_vars.iter().enumerate() {
            let first = j >= first_change;
            let last = j >= last_change;
            self.env
                .insert(format!("first.{var}"), Value::num(f64::from(u8::from(first))));
            self.env
                .insert(format!("last.{var}"), Value::num(f64::from(u8::from(last))));
        }
    }

    /// One pass over the statement list.
    fn run_iteration(&mut self, n: f64, diags: &mut Diagnostics) {
        self.env.insert("_n_".to_owned(), Value::num(n));
        self.env.insert("_error_".to_owned(), Value::num(0.0));

        let step = self.step;
        self.exec_block(&step.statements, diags);

        if !self.decls.has_explicit_output {
            self.emit(None, diags);
        }
    }

    fn exec_block(&mut self, statements: &[Statement], diags: &mut Diagnostics) {
        for stmt in statements {
            match stmt {
                Statement::Assign { target, expr, line } => {
                    let value = match self.eval(expr) {
                        Ok(v) => v,
                        Err(err) => {
                            self.record_row_error(&err.at_line(*line), diags);
                            Value::MISSING
                        }
                    };
                    self.note_var(target);
                    self.env.insert(target.clone(), value);
                }
                Statement::If {
                    branches,
                    else_body,
                    line,
                } => {
                    let mut taken = false;
                    for branch in branches {
                        let holds = match self.eval(&branch.cond) {
                            Ok(v) => v.is_truthy(),
                            Err(err) => {
                                self.record_row_error(&err.at_line(*line), diags);
                                false
                            }
                        };
                        if holds {
                            self.exec_block(&branch.body, diags);
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.exec_block(else_body, diags);
                    }
                }
                Statement::Output { targets } => {
                    if targets.is_empty() {
                        self.emit(None, diags);
                    } else {
                        self.emit(Some(targets.as_slice()), diags);
                    }
                }
                // Declarative statements were collected in Initializing.
                Statement::Input { .. }
                | Statement::Datalines { .. }
                | Statement::Set(_)
                | Statement::Where(_)
                | Statement::Drop(_)
                | Statement::Keep(_)
                | Statement::Rename(_)
                | Statement::Retain { .. }
                | Statement::By { .. } => {}
            }
        }
    }

    fn eval(&self, expr: &Expr) -> InterpResult<Value> {
        let ctx = StepContext {
            env: &self.env,
            uninitialized: &self.uninitialized,
        };
        expr::evaluate(expr, &ctx, self.funcs)
    }

    fn record_row_error(&mut self, err: &InterpreterError, diags: &mut Diagnostics) {
        self.env.insert("_error_".to_owned(), Value::num(1.0));
        diags.push_error(err);
    }

    /// Emit the current row to all targets, or to `only` when given.
    fn emit(&mut self, only: Option<&[String]>, diags: &mut Diagnostics) {
        let (columns, row) = self.project_row();
        if let Some(named) = only {
            for name in named {
                if !self.outputs.iter().any(|(t, _)| t == name) {
                    diags.push(
                        Severity::Warning,
                        format!("output target {name} is not declared by this step"),
                        Some(self.step.line),
                    );
                }
            }
        }
        for (name, table) in &mut self.outputs {
            let selected = only.is_none_or(|named| named.iter().any(|t| t == name));
            if selected {
                table.push_row(&columns, row.clone());
            }
        }
    }

    /// The emitted view of the environment: automatics and group flags
    /// removed, DROP/KEEP applied, RENAME applied last.
    fn project_row(&self) -> (Vec<String>, Row) {
        let mut columns = Vec::new();
        let mut row = Row::new();
        for name in &self.var_order {
            if !self.decls.keep.is_empty() && !self.decls.keep.contains(name) {
                continue;
            }
            if self.decls.drop.contains(name) {
                continue;
            }
            let out_name = self
                .decls
                .rename
                .iter()
                .find(|(old, _)| old == name)
                .map_or_else(|| name.clone(), |(_, new)| new.clone());
            let value = self.env.get(name).cloned().unwrap_or(Value::MISSING);
            row.insert(out_name.clone(), value);
            columns.push(out_name);
        }
        (columns, row)
    }

    /// Record a variable in column order. Automatics never appear.
    fn note_var(&mut self, name: &str) {
        if is_automatic(name) {
            return;
        }
        if !self.var_order.iter().any(|v| v == name) {
            self.var_order.push(name.to_owned());
        }
    }

    // -- Finalizing --

    fn finalize(
        &mut self,
        store: &mut dyn TableStore,
        diags: &mut Diagnostics,
    ) -> InterpResult<Vec<String>> {
        debug_assert_eq!(self.phase, Phase::Finalizing);
        let mut created = Vec::with_capacity(self.outputs.len());
        for (name, table) in std::mem::take(&mut self.outputs) {
            diags.note(format!(
                "the table {name} has {} rows and {} columns",
                table.len(),
                table.columns.len()
            ));
            created.push(name.clone());
            store.save(&name, table)?;
        }
        let mut unset: Vec<String> = self.uninitialized.borrow().iter().cloned().collect();
        unset.sort();
        for name in unset {
            diags.note(format!("variable {name} is uninitialized"));
        }
        self.phase = Phase::Done;
        Ok(created)
    }
}

/// `_N_`, `_ERROR_`, and the BY-group flags never become table columns.
fn is_automatic(name: &str) -> bool {
    name == "_n_" || name == "_error_" || name.starts_with("first.") || name.starts_with("last.")
}

// ---------------------------------------------------------------------------
// Evaluation contexts
// ---------------------------------------------------------------------------

/// Context for statement evaluation: unknown names read as missing, and
/// are recorded for an end-of-step note.
struct StepContext<'a> {
    env: &'a Row,
    uninitialized: &'a RefCell<HashSet<String>>,
}

impl VarContext for StepContext<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.env.get(name) {
            return Some(value.clone());
        }
        if !is_automatic(name) {
            self.uninitialized.borrow_mut().insert(name.to_owned());
        }
        Some(Value::MISSING)
    }
}

/// Context for WHERE filtering: absent columns read as missing, so
/// `where age > 5` excludes rows with missing `age`.
struct WhereContext<'a> {
    row: &'a Row,
}

impl VarContext for WhereContext<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        Some(self.row.get(name).cloned().unwrap_or(Value::MISSING))
    }
}

// ---------------------------------------------------------------------------
// Declarative statement collection
// ---------------------------------------------------------------------------

fn collect_decls<'a>(statements: &'a [Statement], decls: &mut StepDecls<'a>) {
    for stmt in statements {
        match stmt {
            Statement::Set(source) => decls.source = Some(source),
            Statement::Input { vars } => decls.input_vars.extend(vars.iter().cloned()),
            Statement::Datalines { body } => decls.datalines = Some(body),
            Statement::Where(cond) => decls.where_clause = Some(cond),
            Statement::By { vars } => decls.by_vars.clone_from(vars),
            Statement::Drop(names) => decls.drop.extend(names.iter().cloned()),
            Statement::Keep(names) => decls.keep.extend(names.iter().cloned()),
            Statement::Rename(pairs) => decls.rename.extend(pairs.iter().cloned()),
            Statement::Retain { vars } => decls.retain.extend(vars.iter().cloned()),
            Statement::Output { .. } => decls.has_explicit_output = true,
            Statement::If {
                branches,
                else_body,
                ..
            } => {
                // OUTPUT anywhere, even in a branch, disables implicit
                // output.
                for branch in branches {
                    collect_decls(&branch.body, decls);
                }
                collect_decls(else_body, decls);
            }
            Statement::Assign { .. } => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Input materialization
// ---------------------------------------------------------------------------

/// SET: concatenate tables in order.
fn concatenate(tables: &[(&str, Table)], var_order: &mut Vec<String>) -> Vec<Row> {
    let mut rows = Vec::new();
    for (_, table) in tables {
        note_columns(&table.columns, var_order);
        rows.extend(table.rows.iter().cloned());
    }
    rows
}

/// MERGE: match-merge on BY keys, or pair rows positionally without BY.
fn merge_tables(
    tables: &[(&str, Table)],
    by_vars: &[String],
    var_order: &mut Vec<String>,
) -> InterpResult<Vec<Row>> {
    for (_, table) in tables {
        note_columns(&table.columns, var_order);
    }

    if by_vars.is_empty() {
        let width = tables.iter().map(|(_, t)| t.len()).max().unwrap_or(0);
        let mut rows = Vec::with_capacity(width);
        for i in 0..width {
            let mut row = Row::new();
            for (_, table) in tables {
                if let Some(r) = table.rows.get(i) {
                    for (k, v) in r {
                        row.insert(k.clone(), v.clone());
                    }
                }
            }
            rows.push(row);
        }
        return Ok(rows);
    }

    // MERGE with BY requires every input sorted by the keys.
    for (name, table) in tables {
        for pair in table.rows.windows(2) {
            let a = key_of(&pair[0], by_vars);
            let b = key_of(&pair[1], by_vars);
            if compare_keys(&a, &b) == Ordering::Greater {
                return Err(InterpreterError::new(
                    ErrorKind::UnsortedMerge,
                    format!(
                        "merge requires sorted input: table {name} is not sorted by {}",
                        by_vars.join(" ")
                    ),
                ));
            }
        }
    }

    // Walk all tables in key order, one group of equal keys at a time.
    let mut cursor = vec![0usize; tables.len()];
    let mut rows = Vec::new();
    loop {
        let mut current: Option<Vec<Value>> = None;
        for ((_, table), &at) in tables.iter().zip(&cursor) {
            if let Some(row) = table.rows.get(at) {
                let key = key_of(row, by_vars);
                let smaller = current
                    .as_ref()
                    .is_none_or(|c| compare_keys(&key, c) == Ordering::Less);
                if smaller {
                    current = Some(key);
                }
            }
        }
        let Some(key) = current else {
            break;
        };

        // Per-table group of rows carrying the current key.
        let mut groups: Vec<&[Row]> = Vec::with_capacity(tables.len());
        for ((_, table), at) in tables.iter().zip(&mut cursor) {
            let start = *at;
            let mut end = start;
            while let Some(row) = table.rows.get(end) {
                if compare_keys(&key_of(row, by_vars), &key) != Ordering::Equal {
                    break;
                }
                end += 1;
            }
            groups.push(&table.rows[start..end]);
            *at = end;
        }

        let width = groups.iter().map(|g| g.len()).max().unwrap_or(0);
        for i in 0..width {
            let mut row = Row::new();
            for (var, value) in by_vars.iter().zip(&key) {
                row.insert(var.clone(), value.clone());
            }
            for (group, (_, table)) in groups.iter().zip(tables) {
                // A shorter group keeps contributing its last row; a table
                // with no rows for this key contributes missing values.
                match group.get(i).or_else(|| group.last()) {
                    Some(r) => {
                        for (k, v) in r {
                            row.insert(k.clone(), v.clone());
                        }
                    }
                    None => {
                        for column in &table.columns {
                            if !by_vars.contains(column) {
                                row.insert(column.clone(), Value::MISSING);
                            }
                        }
                    }
                }
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

/// DATALINES: whitespace-tokenize the body and consume one value per
/// INPUT variable, cycling until the tokens run out.
fn read_datalines(body: &str, vars: &[InputVar]) -> Vec<Row> {
    if vars.is_empty() {
        return Vec::new();
    }
    let tokens: Vec<&str> = body.split_whitespace().collect();
    let mut rows = Vec::new();
    for chunk in tokens.chunks(vars.len()) {
        let mut row = Row::new();
        for (i, var) in vars.iter().enumerate() {
            let value = match chunk.get(i) {
                Some(word) if var.is_char => Value::Char((*word).to_owned()),
                Some(word) => parse_datalines_number(word),
                None => Value::MISSING,
            };
            row.insert(var.name.clone(), value);
        }
        rows.push(row);
    }
    rows
}

/// `.` and unparseable words read as missing.
fn parse_datalines_number(word: &str) -> Value {
    if word == "." {
        return Value::MISSING;
    }
    word.parse::<f64>().map_or(Value::MISSING, Value::num)
}

fn note_columns(columns: &[String], var_order: &mut Vec<String>) {
    for column in columns {
        if !var_order.iter().any(|v| v == column) {
            var_order.push(column.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// BY-key helpers
// ---------------------------------------------------------------------------

fn key_of(row: &Row, by_vars: &[String]) -> Vec<Value> {
    by_vars
        .iter()
        .map(|v| row.get(v).cloned().unwrap_or(Value::MISSING))
        .collect()
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.order(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Index of the first BY key that differs, or `None` when equal.
fn diverging_key(a: &[Value], b: &[Value]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x.order(y) != Ordering::Equal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
