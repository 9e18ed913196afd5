//! Purpose: Define the stable public Rust API boundary for cardfile.
//! Exports: Record types and operations needed by the server, CLI, and tests.
//! Role: Public, additive-only surface; hides internal module layout.
//! Invariants: This module is the only intended path to record operations.

mod remote;
mod service;
mod sync;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::item::{Item, ItemDraft};
pub use crate::core::notify::{Update, UpdateBus};
pub use crate::core::store::{DocumentStore, JsonStore};
pub use remote::{RemoteClient, RemoteEvents};
pub use service::ItemService;
pub use sync::{ListSource, SyncController, SyncPhase, filter_items};
