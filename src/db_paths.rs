//! Purpose: Resolve the default database directory for the CLI.
//! Exports: `default_db_dir`.
//! Invariants: Default directory remains `~/.docstore/db`.

use std::path::PathBuf;

pub(crate) fn default_db_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".docstore").join("db")
}
