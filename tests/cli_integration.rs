// CLI integration tests for the document commands.
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::{Value, json};

fn cmd(db: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_docstore"));
    command.arg("--db").arg(db);
    command
}

fn run(db: &Path, args: &[&str]) -> Output {
    cmd(db).args(args).output().expect("spawn docstore")
}

fn stdout_json(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

fn stderr_json(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("json error line");
    serde_json::from_str(line).expect("valid json")
}

#[test]
fn create_get_update_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    let create = run(&db, &["create", "task:1", r#"{"status": 1, "title": "index"}"#]);
    assert!(create.status.success());
    assert_eq!(stdout_json(&create), json!({"created": true, "key": "task:1"}));

    let set = run(&db, &["set", "task:1", "status", "0"]);
    assert!(set.status.success());

    let set_columns = run(&db, &["set-columns", "task:1", r#"{"owner": "ops", "extra": 5}"#]);
    assert!(set_columns.status.success());

    let get = run(&db, &["get", "task:1"]);
    assert!(get.status.success());
    assert_eq!(
        stdout_json(&get),
        json!({
            "key": "task:1",
            "value": {"status": 0, "title": "index", "owner": "ops", "extra": 5},
        })
    );

    let increment = run(&db, &["increment", "task:1", "extra", "--by", "-2"]);
    assert!(increment.status.success());
    assert_eq!(stdout_json(&increment)["value"], json!(3));
}

#[test]
fn search_count_and_pending_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    for (key, status) in [("a", "1"), ("b", "0"), ("c", "1")] {
        let document = format!(r#"{{"status": {status}}}"#);
        assert!(run(&db, &["create", key, &document]).status.success());
    }

    let search = run(&db, &["search", "status", "1"]);
    assert!(search.status.success());
    let search_json = stdout_json(&search);
    assert_eq!(search_json["results"][0]["key"], json!("a"));
    assert_eq!(search_json["results"][1]["key"], json!("c"));
    assert_eq!(search_json["next_page"], Value::Null);

    let count = run(&db, &["count", "status", "1"]);
    assert_eq!(stdout_json(&count), json!({"count": 2}));

    let next = run(&db, &["next-pending", "status", "--after", "a"]);
    assert_eq!(stdout_json(&next)["key"], json!("c"));

    let done = run(&db, &["next-pending", "status", "--after", "c"]);
    assert!(done.status.success());
    assert_eq!(stdout_json(&done), json!({"key": null, "value": null}));

    let keys = run(&db, &["keys"]);
    assert_eq!(stdout_json(&keys)["keys"], json!(["a", "b", "c"]));

    let scan = run(&db, &["scan", "a", "b"]);
    assert_eq!(stdout_json(&scan), json!({"results": ["a", "b"]}));
}

#[test]
fn bulk_insert_reads_stdin() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");
    assert!(run(&db, &["create", "a", "{}"]).status.success());

    let mut child = cmd(&db)
        .arg("bulk-insert")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(br#"{"a": {"n": 1}, "b": {"n": 2}}"#)
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!({"inserted": 1, "skipped": ["a"]}));
}

#[test]
fn not_found_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    let get = run(&db, &["get", "missing"]);
    assert_eq!(get.status.code(), Some(3));
    let error = stderr_json(&get);
    assert_eq!(error["error"]["kind"], json!("NotFound"));
    assert_eq!(error["error"]["key"], json!("missing"));

    let set = run(&db, &["set", "missing", "status", "1"]);
    assert_eq!(set.status.code(), Some(3));
}

#[test]
fn already_exists_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    assert!(run(&db, &["create", "k", "{}"]).status.success());
    let again = run(&db, &["create", "k", "{}"]);
    assert_eq!(again.status.code(), Some(4));
    assert_eq!(stderr_json(&again)["error"]["kind"], json!("AlreadyExists"));
}

#[test]
fn usage_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    let not_object = run(&db, &["create", "k", "[1, 2]"]);
    assert_eq!(not_object.status.code(), Some(2));

    let bad_size = run(&db, &["--map-size", "12X", "keys"]);
    assert_eq!(bad_size.status.code(), Some(2));

    let unknown = run(&db, &["frobnicate"]);
    assert_eq!(unknown.status.code(), Some(2));
}

#[test]
fn info_and_backup() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");
    assert!(run(&db, &["create", "k", r#"{"n": 1}"#]).status.success());

    let info = run(&db, &["info"]);
    assert!(info.status.success());
    assert_eq!(stdout_json(&info)["entries"], json!(1));

    let backup_dir = temp.path().join("backup");
    let backup = run(&db, &["backup", backup_dir.to_str().expect("utf8 path")]);
    assert!(backup.status.success());
    assert!(backup_dir.join("data.mdb").exists());

    let restored = run(&backup_dir, &["get", "k"]);
    assert_eq!(stdout_json(&restored)["value"], json!({"n": 1}));
}
