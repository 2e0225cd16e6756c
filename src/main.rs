//! Purpose: `docstore` CLI entry point.
//! Role: Binary crate root; parses args, opens the store, emits JSON on stdout.
//! Invariants: stdout carries only command results; logs and errors go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod db_paths;
mod mcp_stdio;
mod serve;

use db_paths::default_db_dir;
use docstore::api::{DEFAULT_MAX_READERS, Error, ErrorKind, StoreOptions, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    init_tracing(match cli.command {
        Command::Serve { .. } => "info",
        _ => "warn",
    });

    let db_dir = cli.db.unwrap_or_else(default_db_dir);
    let options = store_options(cli.map_size.as_deref(), cli.max_readers)
        .map_err(|err| (err, color_mode))?;

    command_dispatch::dispatch_command(cli.command, db_dir, options)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

/// Logs go to stderr so stdout stays machine-readable; `RUST_LOG` overrides the default.
fn init_tracing(default_directive: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn store_options(map_size: Option<&str>, max_readers: u32) -> Result<StoreOptions, Error> {
    let mut options = StoreOptions::new().with_max_readers(max_readers);
    if let Some(map_size) = map_size {
        let bytes = parse_size(map_size)?;
        let bytes = usize::try_from(bytes).map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message("--map-size exceeds platform limits")
                .with_hint("Use a smaller size value.")
        })?;
        options = options.with_map_size(bytes);
    }
    options.validate()?;
    Ok(options)
}

#[derive(Parser)]
#[command(
    name = "docstore",
    version,
    about = "Query and update JSON documents stored in LMDB",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Every value in the database is a JSON object stored under a string key.

Mental model:
  - `search` / `count` scan documents by one top-level field
  - `get` / `keys` / `scan` read by key
  - `create` / `set` / `set-columns` / `increment` write one document
  - `next-pending` walks records whose column equals 1
"#,
    after_help = r#"EXAMPLES
  $ docstore create task:1 '{"status": 1, "title": "index logs"}'
  $ docstore get task:1
  $ docstore search status 1
  $ docstore next-pending status --after task:1
  $ docstore set task:1 status 0

LEARN MORE
  $ docstore <command> --help
  $ docstore mcp            # serve the same operations as MCP tools on stdio"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Database directory (default: ~/.docstore/db)",
        value_hint = ValueHint::DirPath
    )]
    db: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "SIZE",
        help = "LMDB map size in bytes or K/M/G (default: 10M)"
    )]
    map_size: Option<String>,
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_READERS,
        help = "Maximum concurrent LMDB readers"
    )]
    max_readers: u32,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Find documents whose field equals a value",
        long_about = r#"Scan every document in key order and return those whose top-level FIELD
equals VALUE, 10 per page. VALUE is parsed as JSON; anything that is not valid
JSON is matched as a plain string."#,
        after_help = r#"EXAMPLES
  $ docstore search status 1
  $ docstore search owner alice --page 2
  $ docstore search done true"#
    )]
    Search {
        #[arg(help = "Top-level field name")]
        field: String,
        #[arg(allow_hyphen_values = true, help = "Value to match (JSON, or a bare string)")]
        value: String,
        #[arg(long, default_value_t = 0, help = "Zero-based page index")]
        page: u64,
    },
    #[command(
        arg_required_else_help = true,
        about = "Fetch one document by key",
        after_help = r#"EXAMPLES
  $ docstore get task:1"#
    )]
    Get {
        #[arg(help = "Record key")]
        key: String,
    },
    #[command(
        about = "List keys in ascending order, 200 per page",
        after_help = r#"EXAMPLES
  $ docstore keys
  $ docstore keys --page 1"#
    )]
    Keys {
        #[arg(long, default_value_t = 0, help = "Zero-based page index")]
        page: u64,
    },
    #[command(
        arg_required_else_help = true,
        about = "Count documents under a key prefix whose column equals a value",
        after_help = r#"EXAMPLES
  $ docstore count status 1
  $ docstore count status 1 --prefix task:"#
    )]
    Count {
        #[arg(help = "Top-level column name")]
        column: String,
        #[arg(allow_hyphen_values = true, help = "Value to match (JSON, or a bare string)")]
        value: String,
        #[arg(long, default_value = "", help = "Only count keys starting with this prefix")]
        prefix: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Set one column of an existing document",
        after_help = r#"EXAMPLES
  $ docstore set task:1 status 0
  $ docstore set task:1 owner '"bob"'"#
    )]
    Set {
        #[arg(help = "Record key")]
        key: String,
        #[arg(help = "Column name")]
        column: String,
        #[arg(allow_hyphen_values = true, help = "New value (JSON, or a bare string)")]
        value: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Create a new document; fails if the key exists",
        after_help = r#"EXAMPLES
  $ docstore create task:2 '{"status": 1}'"#
    )]
    Create {
        #[arg(help = "Record key")]
        key: String,
        #[arg(help = "Document as a JSON object")]
        document: String,
    },
    #[command(
        name = "set-columns",
        arg_required_else_help = true,
        about = "Update several columns of an existing document at once",
        after_help = r#"EXAMPLES
  $ docstore set-columns task:1 '{"status": 0, "owner": "bob"}'"#
    )]
    SetColumns {
        #[arg(help = "Record key")]
        key: String,
        #[arg(help = "Column updates as a JSON object")]
        updates: String,
    },
    #[command(
        name = "next-pending",
        arg_required_else_help = true,
        about = "Find the next document after a key whose column equals 1",
        after_help = r#"EXAMPLES
  $ docstore next-pending status
  $ docstore next-pending status --after task:1"#
    )]
    NextPending {
        #[arg(help = "Column that marks pending work")]
        column: String,
        #[arg(long, value_name = "KEY", help = "Start strictly after this key")]
        after: Option<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Add to a numeric column (a missing column starts at 0)",
        after_help = r#"EXAMPLES
  $ docstore increment task:1 attempts
  $ docstore increment task:1 score --by 2.5"#
    )]
    Increment {
        #[arg(help = "Record key")]
        key: String,
        #[arg(help = "Column name")]
        column: String,
        #[arg(long, default_value = "1", allow_hyphen_values = true, help = "Amount to add")]
        by: String,
    },
    #[command(
        name = "bulk-insert",
        about = "Create many documents from a JSON object of key -> document",
        long_about = r#"Read a JSON object mapping keys to documents (from --file or stdin) and
create each one. Keys that already exist are skipped and reported."#,
        after_help = r#"EXAMPLES
  $ echo '{"a": {"status": 1}, "b": {"status": 0}}' | docstore bulk-insert
  $ docstore bulk-insert --file seed.json"#
    )]
    BulkInsert {
        #[arg(long, value_name = "PATH", help = "Read records from a file instead of stdin", value_hint = ValueHint::FilePath)]
        file: Option<PathBuf>,
    },
    #[command(
        arg_required_else_help = true,
        about = "List keys in an inclusive range",
        after_help = r#"EXAMPLES
  $ docstore scan task:0 task:9
  $ docstore scan a z --values"#
    )]
    Scan {
        #[arg(help = "First key (inclusive)")]
        start: String,
        #[arg(help = "Last key (inclusive)")]
        end: String,
        #[arg(long, help = "Include decoded documents")]
        values: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Write a compacted copy of the database into a directory",
        after_help = r#"EXAMPLES
  $ docstore backup /tmp/docstore-backup"#
    )]
    Backup {
        #[arg(help = "Destination directory", value_hint = ValueHint::DirPath)]
        dest: PathBuf,
    },
    #[command(about = "Show database path, entry count, and map size")]
    Info,
    #[command(
        about = "Serve the document tools over MCP on stdio",
        long_about = r#"Run a Model Context Protocol server that reads newline-delimited JSON-RPC
requests on stdin and writes responses on stdout."#
    )]
    Mcp,
    #[command(
        about = "Serve the document tools over MCP on HTTP",
        after_help = r#"EXAMPLES
  $ docstore serve
  $ docstore serve --bind 127.0.0.1:9900"#
    )]
    Serve {
        #[arg(
            long,
            default_value = serve::DEFAULT_BIND,
            help = "Bind address",
            help_heading = "Connection"
        )]
        bind: String,
        #[arg(
            long,
            help = "Allow non-loopback binds (no authentication is performed)",
            help_heading = "Safety"
        )]
        allow_non_loopback: bool,
        #[arg(
            long,
            default_value_t = serve::DEFAULT_MAX_BODY_BYTES,
            help = "Max request body size in bytes",
            help_heading = "Safety"
        )]
        max_body_bytes: u64,
    },
    #[command(
        about = "Print version info",
        after_help = r#"EXAMPLES
  $ docstore version"#
    )]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ docstore completion bash > ~/.local/share/bash-completion/completions/docstore
  $ docstore completion zsh > ~/.zfunc/_docstore"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn parse_size(input: &str) -> Result<u64, Error> {
    let trimmed = input.trim();
    let split = trimmed
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    let digits = trimmed[..split].trim();
    let suffix = trimmed[split..].trim();

    let value: u64 = digits.parse().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid size")
            .with_hint("Use bytes or K/M/G (e.g. 64M).")
            .with_source(err)
    })?;

    let multiplier = match suffix {
        "" => 1,
        "K" | "k" => 1024,
        "M" | "m" => 1024 * 1024,
        "G" | "g" => 1024 * 1024 * 1024,
        _ => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("invalid size suffix")
                .with_hint("Use K/M/G (e.g. 64M)."));
        }
    };

    value.checked_mul(multiplier).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("size overflow")
            .with_hint("Use a smaller size value.")
    })
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_match_value(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}

fn parse_json_object(input: &str, what: &str) -> Result<Map<String, Value>, Error> {
    let value: Value = serde_json::from_str(input).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid json for {what}"))
            .with_hint("Provide a JSON object (e.g. '{\"status\":1}').")
            .with_source(err)
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{what} must be a JSON object"))
            .with_hint("Wrap columns in braces (e.g. '{\"status\":1}').")),
    }
}

fn parse_amount(input: &str) -> Result<serde_json::Number, Error> {
    match serde_json::from_str::<Value>(input.trim()) {
        Ok(Value::Number(number)) => Ok(number),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message("increment amount must be a number")
            .with_hint("Use an integer or decimal (e.g. --by 2 or --by 0.5).")),
    }
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Busy => err.with_hint("Database is busy. Retry with backoff."),
        ErrorKind::Full => err.with_hint("Database map is full. Reopen with a larger --map-size (e.g. --map-size 256M)."),
        ErrorKind::Io => err.with_hint("I/O error. Check the --db path, permissions, and disk space."),
        _ => err,
    }
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("Stored data is not a JSON object. Inspect it with `docstore scan <start> <end> --values`.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("docstore {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "docstore",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Busy => "database is busy".to_string(),
        ErrorKind::Full => "database is full".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    inner.insert("retryable".to_string(), json!(err.is_retryable()));
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(key) = err.key() {
        lines.push(format!(
            "{} {key}",
            colorize_label("key:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `docstore --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "docstore") else {
        return "Try `docstore --help`.".to_string();
    };

    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect();

    if parts.is_empty() {
        return "Try `docstore --help`.".to_string();
    }
    format!("Try `docstore {} --help`.", parts.join(" "))
}
