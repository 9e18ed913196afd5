//! Purpose: Keep a client-side snapshot of the item list in step with the server.
//! Exports: `ListSource`, `SyncController`, `SyncPhase`, `filter_items`.
//! Role: The client sync state machine; re-fetches wholesale on every signal.
//! Invariants: Fetch failures never change phase; they surface as one transient notice.
//! Invariants: A failed refresh keeps the previous snapshot intact.
//! Invariants: Filtering is pure and local; it never touches the source.

use crate::core::error::Error;
use crate::core::item::Item;

/// The one thing the controller needs from the outside world.
pub trait ListSource {
    fn fetch_items(&self) -> Result<Vec<Item>, Error>;
}

impl ListSource for super::remote::RemoteClient {
    fn fetch_items(&self) -> Result<Vec<Item>, Error> {
        self.list_items()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncPhase {
    Loading,
    Ready,
}

pub struct SyncController<S: ListSource> {
    source: S,
    phase: SyncPhase,
    snapshot: Vec<Item>,
    notice: Option<String>,
}

impl<S: ListSource> SyncController<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            phase: SyncPhase::Loading,
            snapshot: Vec::new(),
            notice: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn snapshot(&self) -> &[Item] {
        &self.snapshot
    }

    /// Fetch the full list and replace the snapshot wholesale. No diffing.
    pub fn refresh(&mut self) {
        match self.source.fetch_items() {
            Ok(items) => {
                self.snapshot = items;
                self.notice = None;
            }
            Err(err) => {
                self.notice = Some(err.to_string());
            }
        }
        self.phase = SyncPhase::Ready;
    }

    /// Broadcast signals and local mutation confirmations converge here.
    pub fn handle_update(&mut self) {
        self.refresh();
    }

    /// One-shot transient notice from the last failed call, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn filtered(&self, query: &str) -> Vec<&Item> {
        filter_items(&self.snapshot, query)
    }
}

/// Case-insensitive substring match on `name` only, never `description`.
/// An empty query matches everything.
pub fn filter_items<'a>(items: &'a [Item], query: &str) -> Vec<&'a Item> {
    if query.is_empty() {
        return items.iter().collect();
    }
    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|item| item.name.to_lowercase().contains(&needle))
        .collect()
}
