//! Purpose: Library crate behind the `docstore` CLI and MCP servers.
//! Exports: `core` (engine internals), `api` (stable operation surface), `mcp` (tool protocol).
//! Role: Query and mutate JSON documents held in an LMDB key/value store.
//! Invariants: Every operation takes an explicit `Store` handle; there is no global state.
//! Invariants: Each single-document operation runs in exactly one storage transaction.
pub mod api;
pub mod core;
pub mod mcp;
