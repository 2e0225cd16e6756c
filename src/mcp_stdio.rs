//! Purpose: Run the MCP tool server over stdio.
//! Exports: `serve`, `serve_lines`.
//! Role: Bridge newline-delimited JSON-RPC lines to the shared MCP dispatcher.
//! Invariants: The output stream only carries JSON-RPC messages, one per line.
//! Invariants: Input EOF exits cleanly; blank lines are ignored.

use std::io::{self, BufRead, Write};

use docstore::api::{Error, ErrorKind, Store};
use docstore::mcp::{
    DispatchOutcome, DocstoreMcpHandler, JsonRpcId, JsonRpcResponse, McpDispatcher,
    parse_jsonrpc_line,
};

pub(super) fn serve(store: Store) -> Result<(), Error> {
    tracing::info!(path = %store.path().display(), "mcp stdio server started");
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve_lines(store, stdin.lock(), stdout.lock())
}

pub(super) fn serve_lines(
    store: Store,
    mut reader: impl BufRead,
    mut writer: impl Write,
) -> Result<(), Error> {
    let mut dispatcher = McpDispatcher::new(DocstoreMcpHandler::new(store));
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|err| io_error("failed to read MCP request", err))?;
        if read == 0 {
            return writer
                .flush()
                .map_err(|err| io_error("failed to flush MCP output", err));
        }

        let message = line.trim_end_matches(['\n', '\r']);
        if message.trim().is_empty() {
            continue;
        }

        let outcome = match parse_jsonrpc_line(message) {
            Ok(request) => dispatcher.dispatch_value(request),
            Err(error) => DispatchOutcome::Response(JsonRpcResponse::failure(JsonRpcId::Null, error)),
        };
        if let DispatchOutcome::Response(response) = outcome {
            write_response(&mut writer, &response)?;
        }
    }
}

fn write_response(writer: &mut impl Write, response: &JsonRpcResponse) -> Result<(), Error> {
    serde_json::to_writer(&mut *writer, response).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode MCP response")
            .with_source(err)
    })?;
    writer
        .write_all(b"\n")
        .map_err(|err| io_error("failed to write MCP response", err))?;
    writer
        .flush()
        .map_err(|err| io_error("failed to flush MCP response", err))
}

fn io_error(message: &str, err: io::Error) -> Error {
    Error::new(ErrorKind::Io).with_message(message).with_source(err)
}
