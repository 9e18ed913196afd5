//! Purpose: Shared library crate behind the `cardfile` binary and tests.
//! Exports: `api` (items, service, remote client, sync), `config`, `core`, `notice`.
//! Role: Internal library backing the binary; not yet a stable public SDK.
//! Invariants: `api` is the only intended path to record operations.
//! Invariants: Modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod config;
pub mod core;
pub mod notice;
