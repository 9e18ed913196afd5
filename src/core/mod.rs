//! Purpose: Internal building blocks behind the public `api` surface.
//! Exports: `error`, `item`, `notify`, `store`.
pub mod error;
pub mod item;
pub mod notify;
pub mod store;
