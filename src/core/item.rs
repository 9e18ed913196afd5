//! Purpose: Define the persisted `Item` record and its validated input draft.
//! Exports: `Item`, `ItemDraft`.
//! Role: Single-entity data model shared by the store, service, server, and client.
//! Invariants: Every persisted item has a non-empty name; ids are store-assigned and immutable.
//! Invariants: Drafts reject unknown fields instead of silently accepting them.

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

/// The sole persisted entity: an opaque id plus user-supplied fields.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Request body for create and update. The draft is the whole new truth:
/// an update without `description` clears it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ItemDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("item name must not be empty")
                .with_hint("Provide a non-empty name field."));
        }
        Ok(())
    }
}
