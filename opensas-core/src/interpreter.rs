//! Interpreter driver: preprocess, scan, parse, execute.
//!
//! Steps run strictly sequentially; a step only starts after the previous
//! one reached Done, so a `data` step always sees the tables its
//! predecessors wrote. The driver never aborts on the first problem:
//! fatal macro errors end the run, but every other failure is scoped to
//! its step or statement and execution continues. The caller always gets
//! the full diagnostic list back in a [`RunReport`].

use crate::ast::Step;
use crate::datastep;
use crate::error::{Diagnostic, Diagnostics, Severity};
use crate::expr::FunctionTable;
use crate::macros::Preprocessor;
use crate::parser;
use crate::proc::{self, ProcRegistry};
use crate::scanner;
use crate::store::LibraryStore;

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// The outcome of one program run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Tables created or replaced, in creation order.
    pub tables: Vec<String>,
    /// Listing lines produced by procedures.
    pub listing: Vec<String>,
    /// All diagnostics, in emission order.
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// Whether any ERROR-severity diagnostic was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// A self-contained interpreter: table store, macro table, function
/// registry, and procedure registry, owned by one run at a time.
pub struct Interpreter {
    store: LibraryStore,
    funcs: FunctionTable,
    registry: ProcRegistry,
    /// Most recently created table; the default PROC input.
    recent: Option<String>,
}

impl Interpreter {
    /// An interpreter with the standard functions and procedures.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: LibraryStore::new(),
            funcs: FunctionTable::standard(),
            registry: ProcRegistry::standard(),
            recent: None,
        }
    }

    /// The table store, for seeding and inspection.
    pub fn store_mut(&mut self) -> &mut LibraryStore {
        &mut self.store
    }

    /// Shared view of the table store.
    #[must_use]
    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    /// Run a program and report the outcome. Never panics on bad input;
    /// everything surfaces through the report's diagnostics.
    pub fn run(&mut self, source: &str) -> RunReport {
        let mut report = RunReport::default();
        let mut diags = Diagnostics::new();

        let mut preprocessor = Preprocessor::new();
        let expanded = match preprocessor.expand(source, &mut diags) {
            Ok(text) => text,
            Err(err) => {
                // Macro failures abort before anything executes.
                diags.push_error(&err);
                report.diagnostics = diags.take();
                return report;
            }
        };

        let statements = scanner::split_statements(&expanded);
        let program = parser::parse_program(&statements, &mut diags);

        for step in &program.steps {
            match step {
                Step::Libname(binding) => {
                    self.store.bind(&binding.libref, &binding.path);
                    diags.note(format!(
                        "libref {} bound to {}",
                        binding.libref, binding.path
                    ));
                }
                Step::Data(data_step) => {
                    match datastep::run_data_step(
                        data_step,
                        &mut self.store,
                        &self.funcs,
                        &mut diags,
                    ) {
                        Ok(created) => {
                            self.recent = created.last().cloned();
                            report.tables.extend(created);
                        }
                        Err(err) => diags.push_error(&err.at_line(data_step.line)),
                    }
                }
                Step::Proc(proc_step) => {
                    match proc::dispatch(
                        &self.registry,
                        proc_step,
                        &mut self.store,
                        self.recent.as_deref(),
                        &mut report.listing,
                        &mut diags,
                    ) {
                        Ok(created) => {
                            if let Some(last) = created.last() {
                                self.recent = Some(last.clone());
                            }
                            report.tables.extend(created);
                        }
                        Err(err) => diags.push_error(&err),
                    }
                }
            }
        }

        report.diagnostics = diags.take();
        report
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TableStore;
    use crate::table::{Table, Value};

    fn run(source: &str) -> (Interpreter, RunReport) {
        let mut interp = Interpreter::new();
        let report = interp.run(source);
        (interp, report)
    }

    fn run_clean(source: &str) -> (Interpreter, RunReport) {
        let (interp, report) = run(source);
        assert!(!report.has_errors(), "diagnostics: {:?}", report.diagnostics);
        (interp, report)
    }

    fn column(table: &Table, name: &str) -> Vec<Value> {
        (0..table.len()).map(|i| table.get(i, name)).collect()
    }

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::num).collect()
    }

    #[test]
    fn datalines_then_derived_table() {
        let (interp, report) = run_clean(
            "data w.t; input x; datalines; 1 2 3 ; run;\n\
             data w.u; set w.t; y = x * 2; run;",
        );
        assert_eq!(report.tables, vec!["w.t".to_owned(), "w.u".to_owned()]);
        let u = interp.store().load("w.u").expect("table");
        assert_eq!(column(&u, "x"), nums(&[1.0, 2.0, 3.0]));
        assert_eq!(column(&u, "y"), nums(&[2.0, 4.0, 6.0]));
    }

    #[test]
    fn macro_variable_drives_where() {
        let (interp, _) = run_clean(
            "%let cutoff = 15;\n\
             data t; input age; datalines; 10 20 30 ; run;\n\
             data u; set t; where age > &cutoff; run;",
        );
        let u = interp.store().load("work.u").expect("table");
        assert_eq!(column(&u, "age"), nums(&[20.0, 30.0]));
    }

    #[test]
    fn macro_definition_generates_a_step() {
        let (interp, _) = run_clean(
            "%macro double(src, dst); data &dst; set &src; x = x * 2; run; %mend;\n\
             data t; input x; datalines; 4 ; run;\n\
             %double(t, u)",
        );
        let u = interp.store().load("work.u").expect("table");
        assert_eq!(column(&u, "x"), nums(&[8.0]));
    }

    #[test]
    fn macro_syntax_error_aborts_the_run() {
        let (interp, report) = run("%macro broken; data t; x = 1; run;");
        assert!(report.has_errors());
        assert!(!interp.store().exists("work.t"));
    }

    #[test]
    fn proc_means_end_to_end() {
        let (interp, report) = run_clean(
            "data t; input age; datalines; 10 20 30 ; run;\n\
             proc means data=t noprint out=stats; var age; run;",
        );
        assert!(report.listing.is_empty());
        let stats = interp.store().load("work.stats").expect("stats");
        assert_eq!(stats.get(0, "mean"), Value::num(20.0));
        assert_eq!(stats.get(0, "n"), Value::num(3.0));
    }

    #[test]
    fn proc_means_by_groups_end_to_end() {
        let (interp, _) = run_clean(
            "data t; input g x; datalines; 1 10 1 20 2 30 ; run;\n\
             proc means data=t noprint out=stats; by g; var x; run;",
        );
        let stats = interp.store().load("work.stats").expect("stats");
        assert_eq!(stats.len(), 2);
        assert_eq!(stats.get(0, "g"), Value::num(1.0));
        assert_eq!(stats.get(0, "mean"), Value::num(15.0));
        assert_eq!(stats.get(1, "g"), Value::num(2.0));
        assert_eq!(stats.get(1, "mean"), Value::num(30.0));
    }

    #[test]
    fn proc_freq_crosstab_end_to_end() {
        let (interp, _) = run_clean(
            "data t; input g $ s $; datalines; a f a m b f ; run;\n\
             proc freq data=t noprint out=cells; tables g*s; run;",
        );
        // Full grid in long form: (a,f) (a,m) (b,f) (b,m).
        let cells = interp.store().load("work.cells").expect("cells");
        assert_eq!(cells.len(), 4);
        assert_eq!(cells.get(0, "g"), Value::Char("a".into()));
        assert_eq!(cells.get(0, "s"), Value::Char("f".into()));
        assert_eq!(cells.get(0, "count"), Value::num(1.0));
        assert_eq!(cells.get(3, "count"), Value::num(0.0));
    }

    #[test]
    fn proc_print_uses_most_recent_table() {
        let (_, report) = run_clean(
            "data t; input x; datalines; 7 ; run;\n\
             proc print; run;",
        );
        assert!(report.listing.iter().any(|l| l.contains('7')));
    }

    #[test]
    fn proc_sort_then_by_groups() {
        let (interp, _) = run_clean(
            "data t; input g x; datalines; 2 20 1 10 2 30 ; run;\n\
             proc sort data=t; by g; run;\n\
             data u; set t; by g; f = first.g; run;",
        );
        let u = interp.store().load("work.u").expect("table");
        assert_eq!(column(&u, "g"), nums(&[1.0, 2.0, 2.0]));
        assert_eq!(column(&u, "f"), nums(&[1.0, 1.0, 0.0]));
    }

    #[test]
    fn unknown_procedure_is_recoverable() {
        let (interp, report) = run(
            "data t; input x; datalines; 1 ; run;\n\
             proc bogus; run;\n\
             data u; set t; run;",
        );
        assert!(report.has_errors());
        assert!(interp.store().exists("work.u"));
    }

    #[test]
    fn unsorted_merge_leaves_target_and_run_continues() {
        let (interp, report) = run(
            "data a; input id; datalines; 2 1 ; run;\n\
             data b; input id; datalines; 1 2 ; run;\n\
             data c; x = 99; run;\n\
             data c; merge a b; by id; run;\n\
             data d; y = 1; run;",
        );
        assert!(report.has_errors());
        let c = interp.store().load("work.c").expect("target");
        assert_eq!(c.get(0, "x"), Value::num(99.0));
        assert!(interp.store().exists("work.d"));
    }

    #[test]
    fn per_row_eval_error_still_writes_rows() {
        let (interp, report) = run(
            "data t; input x; datalines; 0 5 ; run;\n\
             data u; set t; y = 10 / x; run;",
        );
        assert!(report.has_errors());
        let u = interp.store().load("work.u").expect("table");
        assert_eq!(u.len(), 2);
        assert_eq!(u.get(0, "y"), Value::MISSING);
        assert_eq!(u.get(1, "y"), Value::num(2.0));
    }

    #[test]
    fn parse_error_skips_statement_only() {
        let (interp, report) = run("data t; y = ((1; x = 2; run;");
        assert!(report.has_errors());
        let t = interp.store().load("work.t").expect("table");
        assert_eq!(t.get(0, "x"), Value::num(2.0));
    }

    #[test]
    fn report_lists_created_tables_in_order() {
        let (_, report) = run_clean("data a; x = 1; run; data b; x = 2; run;");
        assert_eq!(report.tables, vec!["work.a".to_owned(), "work.b".to_owned()]);
    }

    #[test]
    fn diagnostics_include_row_count_notes() {
        let (_, report) = run_clean("data t; input x; datalines; 1 2 ; run;");
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Note && d.message.contains("2 rows")));
    }

    #[test]
    fn unresolved_macro_reference_is_a_warning() {
        let (_, report) = run("data t; x = 1; y = &ghost 2; run;");
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("&ghost")));
    }

    #[test]
    fn libname_bound_tables_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "opensas_interp_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos())
        ));
        std::fs::create_dir_all(&dir).expect("create test dir");

        let source = format!(
            "libname lab '{}';\n\
             data lab.t; input x; datalines; 1 2 ; run;",
            dir.display()
        );
        let (_, report) = run_clean(&source);
        assert!(report.tables.contains(&"lab.t".to_owned()));
        assert!(dir.join("t.json").is_file());

        // A fresh interpreter reads the persisted table back.
        let source = format!(
            "libname lab '{}';\n\
             data u; set lab.t; y = x + 1; run;",
            dir.display()
        );
        let (interp, _) = run_clean(&source);
        let u = interp.store().load("work.u").expect("table");
        assert_eq!(column(&u, "y"), nums(&[2.0, 3.0]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn error_kind_taxonomy_is_reported_not_thrown() {
        // Three independent failures in one program; all are reported and
        // the run still finishes.
        let (_, report) = run(
            "frobnicate;\n\
             data t; set nosuch; run;\n\
             proc bogus; run;",
        );
        let errors = report
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        assert!(errors >= 3, "diagnostics: {:?}", report.diagnostics);
    }
}
