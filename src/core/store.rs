//! Purpose: Persist item records behind the `DocumentStore` seam.
//! Exports: `DocumentStore`, `JsonStore`.
//! Role: Document-store collaborator; the service depends only on the trait.
//! Invariants: Each operation succeeds or fails atomically from the caller's view.
//! Invariants: The store file is exclusively locked for the lifetime of the handle.
//! Invariants: `find_all` preserves insertion order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use fs2::FileExt;
use getrandom::fill as fill_random;

use crate::core::error::{Error, ErrorKind};
use crate::core::item::{Item, ItemDraft};

/// Operations the record service needs from a document store. Each returns a
/// found/nullable result rather than erroring on a missing id; classifying a
/// miss is the service's call.
pub trait DocumentStore: Send + Sync {
    fn insert(&self, draft: &ItemDraft) -> Result<Item, Error>;
    fn find_all(&self) -> Result<Vec<Item>, Error>;
    fn update(&self, id: &str, draft: &ItemDraft) -> Result<Option<Item>, Error>;
    fn remove(&self, id: &str) -> Result<bool, Error>;
}

/// File-backed store: one JSON array in one exclusively locked file.
///
/// Mutations rewrite the whole file before committing the in-memory copy, so
/// a failed write leaves the previous state visible. Because the handle holds
/// the exclusive lock, the in-memory copy is always current.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    file: File,
    items: Vec<Item>,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    Error::new(ErrorKind::Connectivity)
                        .with_message("failed to create store directory")
                        .with_source(err)
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                Error::new(ErrorKind::Connectivity)
                    .with_message("failed to open store file")
                    .with_source(err)
            })?;
        file.try_lock_exclusive().map_err(|err| {
            Error::new(ErrorKind::Connectivity)
                .with_message("store file is locked by another process")
                .with_hint("Stop the other cardfile instance or point --store elsewhere.")
                .with_source(err)
        })?;

        let items = load_items(&mut file)?;
        Ok(Self {
            path,
            inner: Mutex::new(StoreInner { file, items }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for JsonStore {
    fn insert(&self, draft: &ItemDraft) -> Result<Item, Error> {
        let mut inner = self.lock();
        let item = Item {
            id: assign_id()?,
            name: draft.name.clone(),
            description: draft.description.clone(),
        };
        let mut next = inner.items.clone();
        next.push(item.clone());
        save_items(&mut inner.file, &next)?;
        inner.items = next;
        Ok(item)
    }

    fn find_all(&self) -> Result<Vec<Item>, Error> {
        Ok(self.lock().items.clone())
    }

    fn update(&self, id: &str, draft: &ItemDraft) -> Result<Option<Item>, Error> {
        let mut inner = self.lock();
        let Some(position) = inner.items.iter().position(|item| item.id == id) else {
            return Ok(None);
        };
        let mut next = inner.items.clone();
        next[position].name = draft.name.clone();
        next[position].description = draft.description.clone();
        let updated = next[position].clone();
        save_items(&mut inner.file, &next)?;
        inner.items = next;
        Ok(Some(updated))
    }

    fn remove(&self, id: &str) -> Result<bool, Error> {
        let mut inner = self.lock();
        let mut next = inner.items.clone();
        let before = next.len();
        next.retain(|item| item.id != id);
        if next.len() == before {
            return Ok(false);
        }
        save_items(&mut inner.file, &next)?;
        inner.items = next;
        Ok(true)
    }
}

fn load_items(file: &mut File) -> Result<Vec<Item>, Error> {
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(|err| {
        Error::new(ErrorKind::Connectivity)
            .with_message("failed to read store file")
            .with_source(err)
    })?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&contents).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("store file is not a valid item array")
            .with_hint("Repair or remove the store file, then restart.")
            .with_source(err)
    })
}

fn save_items(file: &mut File, items: &[Item]) -> Result<(), Error> {
    let encoded = serde_json::to_vec(items).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode store contents")
            .with_source(err)
    })?;
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.set_len(0))
        .and_then(|_| file.write_all(&encoded))
        .and_then(|_| file.flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write store file")
                .with_source(err)
        })
}

fn assign_id() -> Result<String, Error> {
    let mut bytes = [0u8; 12];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal).with_message(format!("failed to generate id: {err}"))
    })?;
    Ok(hex_encode(&bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(nibble_hex(byte >> 4));
        out.push(nibble_hex(byte & 0x0f));
    }
    out
}

fn nibble_hex(nibble: u8) -> char {
    match nibble {
        0..=9 => char::from(b'0' + nibble),
        _ => char::from(b'a' + (nibble - 10)),
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentStore, JsonStore, assign_id};
    use crate::core::error::ErrorKind;
    use crate::core::item::ItemDraft;

    fn scratch_store(temp: &tempfile::TempDir) -> JsonStore {
        JsonStore::open(temp.path().join("items.json")).expect("store")
    }

    #[test]
    fn insert_then_find_all_preserves_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = scratch_store(&temp);

        let first = store.insert(&ItemDraft::new("Pen")).expect("insert");
        let second = store
            .insert(&ItemDraft::new("Notebook").with_description("A5"))
            .expect("insert");

        let items = store.find_all().expect("find_all");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], first);
        assert_eq!(items[1], second);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn update_missing_id_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = scratch_store(&temp);
        let result = store
            .update("0000000000000000deadbeef", &ItemDraft::new("Pen"))
            .expect("update");
        assert!(result.is_none());
    }

    #[test]
    fn update_replaces_both_fields_and_keeps_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = scratch_store(&temp);
        let created = store
            .insert(&ItemDraft::new("Pen").with_description("Blue ink"))
            .expect("insert");

        let updated = store
            .update(&created.id, &ItemDraft::new("Pencil"))
            .expect("update")
            .expect("found");
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Pencil");
        assert!(updated.description.is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = scratch_store(&temp);
        let created = store.insert(&ItemDraft::new("Pen")).expect("insert");

        assert!(store.remove(&created.id).expect("remove"));
        assert!(!store.remove(&created.id).expect("remove again"));
        assert!(store.find_all().expect("find_all").is_empty());
    }

    #[test]
    fn reopen_reloads_persisted_items() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("items.json");
        let created = {
            let store = JsonStore::open(&path).expect("store");
            store
                .insert(&ItemDraft::new("Pen").with_description("Blue ink"))
                .expect("insert")
        };

        let store = JsonStore::open(&path).expect("reopen");
        let items = store.find_all().expect("find_all");
        assert_eq!(items, vec![created]);
    }

    #[test]
    fn second_open_fails_while_lock_is_held() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("items.json");
        let _store = JsonStore::open(&path).expect("store");

        let err = JsonStore::open(&path).expect_err("locked");
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[test]
    fn corrupt_store_file_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("items.json");
        std::fs::write(&path, "not json").expect("write");

        let err = JsonStore::open(&path).expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn assigned_ids_are_24_hex_chars() {
        let id = assign_id().expect("id");
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
