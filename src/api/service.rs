//! Purpose: Expose create/read/update/delete over an injected document store.
//! Exports: `ItemService`.
//! Role: The record service; every successful mutation triggers a change notification.
//! Invariants: Persisted items always carry a non-empty name.
//! Invariants: Delete is idempotent by design; a missing id is not an error.
//! Invariants: Dependencies are injected at construction, never ambient.

use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::item::{Item, ItemDraft};
use crate::core::notify::UpdateBus;
use crate::core::store::DocumentStore;

#[derive(Clone)]
pub struct ItemService {
    store: Arc<dyn DocumentStore>,
    bus: UpdateBus,
}

impl ItemService {
    pub fn new(store: Arc<dyn DocumentStore>, bus: UpdateBus) -> Self {
        Self { store, bus }
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    /// All items, insertion order. No server-side filtering or pagination.
    pub fn list(&self) -> Result<Vec<Item>, Error> {
        self.store.find_all()
    }

    pub fn create(&self, draft: &ItemDraft) -> Result<Item, Error> {
        draft.validate()?;
        let item = self.store.insert(draft)?;
        self.bus.notify();
        Ok(item)
    }

    pub fn update(&self, id: &str, draft: &ItemDraft) -> Result<Item, Error> {
        draft.validate()?;
        let Some(item) = self.store.update(id, draft)? else {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("no item with that id")
                .with_id(id));
        };
        self.bus.notify();
        Ok(item)
    }

    /// Returns whether an item actually existed. The notification fires
    /// either way, matching the original delete route.
    pub fn delete(&self, id: &str) -> Result<bool, Error> {
        let existed = self.store.remove(id)?;
        self.bus.notify();
        Ok(existed)
    }
}
