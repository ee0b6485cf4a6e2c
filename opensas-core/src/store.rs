//! Table store: named, persisted tables.
//!
//! The interpreter addresses tables by a normalized `libref.member` name.
//! [`TableStore`] is the seam the DATA-step engine and PROC dispatcher use;
//! [`LibraryStore`] is the standard implementation, holding unbound
//! librefs (including `work`) in memory and reading/writing one JSON file
//! per member for librefs bound to a directory via `LIBNAME`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{ErrorKind, InterpResult, InterpreterError};
use crate::table::Table;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Storage for named tables.
pub trait TableStore {
    /// Load the table under `name`.
    fn load(&self, name: &str) -> InterpResult<Table>;
    /// Save `table` under `name`, replacing any prior table of that name.
    fn save(&mut self, name: &str, table: Table) -> InterpResult<()>;
    /// Whether a table exists under `name`.
    fn exists(&self, name: &str) -> bool;
    /// Names of all stored tables (memory libraries only).
    fn names(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Library store
// ---------------------------------------------------------------------------

/// The standard store: in-memory tables plus directory-bound librefs.
#[derive(Debug, Default)]
pub struct LibraryStore {
    /// In-memory tables, keyed by `libref.member`.
    memory: HashMap<String, Table>,
    /// Librefs bound to directories.
    bindings: HashMap<String, PathBuf>,
}

impl LibraryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a libref to a directory. Subsequent saves into this libref
    /// write JSON files there; loads read them back.
    pub fn bind(&mut self, libref: &str, path: impl Into<PathBuf>) {
        self.bindings.insert(libref.to_ascii_lowercase(), path.into());
    }

    /// The file path for a bound name, or `None` for memory names.
    fn file_for(&self, name: &str) -> Option<PathBuf> {
        let (libref, member) = name.split_once('.')?;
        let dir = self.bindings.get(libref)?;
        Some(dir.join(format!("{member}.json")))
    }
}

impl TableStore for LibraryStore {
    fn load(&self, name: &str) -> InterpResult<Table> {
        if let Some(path) = self.file_for(name) {
            let text = fs::read_to_string(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    InterpreterError::new(
                        ErrorKind::TableNotFound,
                        format!("table {name} does not exist"),
                    )
                } else {
                    InterpreterError::new(
                        ErrorKind::Io,
                        format!("cannot read {}: {e}", path.display()),
                    )
                }
            })?;
            return serde_json::from_str(&text).map_err(|e| {
                InterpreterError::new(
                    ErrorKind::Io,
                    format!("malformed table file {}: {e}", path.display()),
                )
            });
        }

        self.memory.get(name).cloned().ok_or_else(|| {
            InterpreterError::new(
                ErrorKind::TableNotFound,
                format!("table {name} does not exist"),
            )
        })
    }

    fn save(&mut self, name: &str, table: Table) -> InterpResult<()> {
        if let Some(path) = self.file_for(name) {
            let text = serde_json::to_string(&table).map_err(|e| {
                InterpreterError::new(ErrorKind::Internal, format!("serialize {name}: {e}"))
            })?;
            return fs::write(&path, text).map_err(|e| {
                InterpreterError::new(
                    ErrorKind::Io,
                    format!("cannot write {}: {e}", path.display()),
                )
            });
        }
        self.memory.insert(name.to_owned(), table);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        if let Some(path) = self.file_for(name) {
            return path.is_file();
        }
        self.memory.contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.memory.keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Row, Value};

    fn sample_table() -> Table {
        let mut t = Table::new(vec!["x".into()]);
        let mut row = Row::new();
        row.insert("x".into(), Value::num(7.0));
        t.rows.push(row);
        t
    }

    #[test]
    fn memory_save_load_exists() {
        let mut store = LibraryStore::new();
        assert!(!store.exists("work.a"));
        store.save("work.a", sample_table()).expect("save");
        assert!(store.exists("work.a"));
        let t = store.load("work.a").expect("load");
        assert_eq!(t.get(0, "x"), Value::num(7.0));
    }

    #[test]
    fn load_unknown_is_table_not_found() {
        let store = LibraryStore::new();
        let err = store.load("work.nope").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TableNotFound);
    }

    #[test]
    fn save_replaces_prior_table() {
        let mut store = LibraryStore::new();
        store.save("work.a", sample_table()).expect("save");
        store.save("work.a", Table::new(vec!["y".into()])).expect("resave");
        let t = store.load("work.a").expect("load");
        assert_eq!(t.columns, vec!["y".to_owned()]);
        assert!(t.is_empty());
    }

    #[test]
    fn names_sorted() {
        let mut store = LibraryStore::new();
        store.save("work.b", sample_table()).expect("save");
        store.save("work.a", sample_table()).expect("save");
        assert_eq!(store.names(), vec!["work.a".to_owned(), "work.b".to_owned()]);
    }

    #[test]
    fn bound_libref_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!(
            "opensas_store_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos())
        ));
        fs::create_dir_all(&dir).expect("create test dir");

        let mut store = LibraryStore::new();
        store.bind("mylib", &dir);
        store.save("mylib.t", sample_table()).expect("save to disk");
        assert!(dir.join("t.json").is_file());
        assert!(store.exists("mylib.t"));
        let t = store.load("mylib.t").expect("load from disk");
        assert_eq!(t.get(0, "x"), Value::num(7.0));

        let err = store.load("mylib.other").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TableNotFound);

        let _ = fs::remove_dir_all(&dir);
    }
}
