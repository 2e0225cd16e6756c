//! Purpose: Hold top-level CLI command dispatch for `docstore`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Output envelopes are the same JSON shapes the MCP tools return.
//! Invariants: The store is opened once per invocation and only for commands that touch it.

use std::fs;
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use docstore::api::{
    self, Document, Store, bulk_insert_json, count_json, created_json, get_row_json,
    key_page_json, next_pending_json, range_json, record_page_json, stats_json, updated_json,
};

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    db_dir: PathBuf,
    options: StoreOptions,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "docstore", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Search { field, value, page } => {
            let store = open_store(&db_dir, options)?;
            let page = api::search(&store, &field, &parse_match_value(&value), page)?;
            emit_json(record_page_json(&page));
            Ok(RunOutcome::ok())
        }
        Command::Get { key } => {
            let store = open_store(&db_dir, options)?;
            match api::get_row(&store, &key)? {
                Some(value) => {
                    emit_json(get_row_json(&key, Some(&value)));
                    Ok(RunOutcome::ok())
                }
                None => Err(Error::new(ErrorKind::NotFound)
                    .with_message("record not found")
                    .with_key(&key)
                    .with_hint(format!(
                        "Create it first: docstore create {key} '{{...}}' (or check `docstore keys`)."
                    ))),
            }
        }
        Command::Keys { page } => {
            let store = open_store(&db_dir, options)?;
            let page = api::list_keys(&store, page)?;
            emit_json(key_page_json(&page));
            Ok(RunOutcome::ok())
        }
        Command::Count {
            column,
            value,
            prefix,
        } => {
            let store = open_store(&db_dir, options)?;
            let count = api::count(&store, &prefix, &column, &parse_match_value(&value))?;
            emit_json(count_json(count));
            Ok(RunOutcome::ok())
        }
        Command::Set { key, column, value } => {
            let store = open_store(&db_dir, options)?;
            api::set_value(&store, &key, &column, parse_match_value(&value))
                .map_err(|err| add_missing_record_hint(err, &key))?;
            emit_json(updated_json(&key, None));
            Ok(RunOutcome::ok())
        }
        Command::Create { key, document } => {
            let document = parse_json_object(&document, "document")?;
            let store = open_store(&db_dir, options)?;
            api::create_record(&store, &key, &document)
                .map_err(|err| add_existing_record_hint(err, &key))?;
            emit_json(created_json(&key));
            Ok(RunOutcome::ok())
        }
        Command::SetColumns { key, updates } => {
            let updates = parse_json_object(&updates, "updates")?;
            let store = open_store(&db_dir, options)?;
            api::set_columns(&store, &key, updates)
                .map_err(|err| add_missing_record_hint(err, &key))?;
            emit_json(updated_json(&key, None));
            Ok(RunOutcome::ok())
        }
        Command::NextPending { column, after } => {
            let store = open_store(&db_dir, options)?;
            let record = api::next_pending(&store, &column, after.as_deref())?;
            emit_json(next_pending_json(record.as_ref()));
            Ok(RunOutcome::ok())
        }
        Command::Increment { key, column, by } => {
            let amount = parse_amount(&by)?;
            let store = open_store(&db_dir, options)?;
            let value = api::increment_field(&store, &key, &column, &amount)
                .map_err(|err| add_missing_record_hint(err, &key))?;
            emit_json(updated_json(&key, Some(Value::Number(value))));
            Ok(RunOutcome::ok())
        }
        Command::BulkInsert { file } => {
            let records = read_bulk_records(file.as_deref())?;
            let store = open_store(&db_dir, options)?;
            let outcome = api::bulk_insert(&store, records)?;
            emit_json(bulk_insert_json(&outcome));
            Ok(RunOutcome::ok())
        }
        Command::Scan { start, end, values } => {
            let store = open_store(&db_dir, options)?;
            let entries = api::scan_range(&store, &start, &end, values)?;
            emit_json(range_json(&entries, values));
            Ok(RunOutcome::ok())
        }
        Command::Backup { dest } => {
            let store = open_store(&db_dir, options)?;
            let path = store.backup(&dest)?;
            emit_json(json!({ "backup_path": path.display().to_string() }));
            Ok(RunOutcome::ok())
        }
        Command::Info => {
            let store = open_store(&db_dir, options)?;
            emit_json(stats_json(&store.stats()?));
            Ok(RunOutcome::ok())
        }
        Command::Mcp => {
            let store = open_store(&db_dir, options)?;
            mcp_stdio::serve(store)?;
            Ok(RunOutcome::ok())
        }
        Command::Serve {
            bind,
            allow_non_loopback,
            max_body_bytes,
        } => {
            let bind: SocketAddr = bind.parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid bind address")
                    .with_hint("Use a host:port value like 127.0.0.1:9800.")
            })?;
            let config = serve::ServeConfig {
                bind,
                allow_non_loopback,
                max_body_bytes,
            };
            let store = open_store(&db_dir, options)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config, store))?;
            Ok(RunOutcome::ok())
        }
    }
}

fn open_store(db_dir: &Path, options: StoreOptions) -> Result<Store, Error> {
    Store::open(db_dir, options).map_err(|err| {
        if err.path().is_some() {
            err
        } else {
            err.with_path(db_dir)
        }
    })
}

fn read_bulk_records(file: Option<&Path>) -> Result<Vec<(String, Document)>, Error> {
    let input = match file {
        Some(path) => fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read records file")
                .with_path(path)
                .with_source(err)
        })?,
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read records from stdin")
                    .with_source(err)
            })?;
            input
        }
    };
    parse_bulk_records(&input)
}

fn parse_bulk_records(input: &str) -> Result<Vec<(String, Document)>, Error> {
    let records = parse_json_object(input, "records")?;
    records
        .into_iter()
        .map(|(key, value)| match value {
            Value::Object(document) => Ok((key, document)),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message("each record must be a JSON object")
                .with_key(key)),
        })
        .collect()
}

fn add_missing_record_hint(err: Error, key: &str) -> Error {
    if err.kind() != ErrorKind::NotFound || err.hint().is_some() {
        return err;
    }
    err.with_hint(format!(
        "Updates never create records. Create it first: docstore create {key} '{{...}}'."
    ))
}

fn add_existing_record_hint(err: Error, key: &str) -> Error {
    if err.kind() != ErrorKind::AlreadyExists || err.hint().is_some() {
        return err;
    }
    err.with_hint(format!(
        "Use `docstore set-columns {key} '{{...}}'` to change an existing record."
    ))
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, parse_bulk_records};

    #[test]
    fn bulk_records_keep_key_order() {
        let records = parse_bulk_records(r#"{"b": {"n": 2}, "a": {"n": 1}}"#).expect("records");
        let keys: Vec<&str> = records.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn bulk_records_reject_non_objects() {
        let err = parse_bulk_records(r#"{"a": 1}"#).expect_err("non-object record");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.key(), Some("a"));
    }
}
