//! Key-path state store: one JSON document addressed by dotted paths.
//!
//! The document root is always an object. Every write persists the whole
//! document as one blob under a fixed key and then notifies subscribers of
//! the written path and of each ancestor path:
//!
//! ```text
//! set("progress.alice.level", "A2")
//!   -> subscribers of "progress.alice.level"   get "A2"
//!   -> subscribers of "progress.alice"         get the current alice object
//!   -> subscribers of "progress"               get the current progress object
//! ```
//!
//! Siblings (`progress.bob`) and descendants are never notified.
//!
//! # Re-entrancy
//! A callback may call [`KeyPathStore::set`]. The nested write is applied
//! and persisted at once, but its notification is queued behind the pass
//! that is currently running. A single flush delivers at most
//! [`MAX_NOTIFICATIONS_PER_FLUSH`] writes, then drops the rest with an
//! error log, so a cyclic callback chain cannot spin forever.
//!
//! # Persistence failures
//! Storage errors on read fall back to an empty document; storage errors on
//! write are logged and counted ([`KeyPathStore::persist_failures`]). The
//! in-memory write always stands.

pub mod path;
pub mod storage;

pub use path::KeyPath;
pub use storage::{FileStorage, MemoryStorage, Storage};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::listeners::{Listeners, Subscription};

/// Upper bound on notifications delivered by one outermost `set`.
pub const MAX_NOTIFICATIONS_PER_FLUSH: usize = 10_000;

/// Deepest object/array nesting a write may produce, counting the root.
/// Kept below the JSON reader's recursion limit (128) so every persisted
/// blob can be read back at startup.
pub const MAX_DOCUMENT_DEPTH: usize = 100;

/// How the document was obtained at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// Nothing was stored under the key.
    Empty,
    /// The stored blob was adopted.
    Restored,
    /// The blob was unreadable or malformed; started empty.
    Fallback,
}

pub struct KeyPathStore {
    doc: RefCell<Map<String, Value>>,
    storage: Arc<dyn Storage>,
    key: String,
    listeners: Listeners,
    pending: RefCell<VecDeque<(KeyPath, Value)>>,
    flushing: Cell<bool>,
    persist_failures: Cell<u64>,
    hydration: Hydration,
}

impl KeyPathStore {
    /// Open the store over `storage`, hydrating from the blob under `key`.
    ///
    /// Never fails: any read or parse problem is logged and the store
    /// starts from an empty document.
    pub fn open(storage: Arc<dyn Storage>, key: &str) -> Self {
        let (doc, hydration) = hydrate(storage.as_ref(), key);
        Self {
            doc: RefCell::new(doc),
            storage,
            key: key.to_string(),
            listeners: Listeners::new(),
            pending: RefCell::new(VecDeque::new()),
            flushing: Cell::new(false),
            persist_failures: Cell::new(0),
            hydration,
        }
    }

    /// Shorthand for a store over fresh [`MemoryStorage`].
    pub fn in_memory(key: &str) -> Self {
        Self::open(Arc::new(MemoryStorage::new()), key)
    }

    pub fn hydration(&self) -> Hydration {
        self.hydration
    }

    /// Number of writes whose persistence failed since construction.
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.get()
    }

    // ── Reads ─────────────────────────────────────────────────────────

    /// Value at `path`, or `None` when any step is missing or steps into a
    /// non-object. Errors only for a malformed path.
    pub fn get(&self, path: &str) -> Result<Option<Value>, AppError> {
        Ok(self.get_path(&KeyPath::parse(path)?))
    }

    pub fn get_path(&self, path: &KeyPath) -> Option<Value> {
        let doc = self.doc.borrow();
        let (first, rest) = path.segments().split_first()?;
        let mut node = doc.get(first)?;
        for seg in rest {
            node = node.as_object()?.get(seg)?;
        }
        Some(node.clone())
    }

    /// Typed read. `Ok(None)` when absent or `null`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AppError> {
        match self.get(path)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| AppError::Value {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Clone of the whole document.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.doc.borrow().clone())
    }

    // ── Writes ────────────────────────────────────────────────────────

    /// Assign `value` at `path`, creating missing intermediate objects.
    ///
    /// A `null` intermediate is replaced by an object. Any other non-object
    /// intermediate rejects the write with [`AppError::PathConflict`] and
    /// leaves the document untouched.
    pub fn set(&self, path: &str, value: Value) -> Result<(), AppError> {
        self.set_path(&KeyPath::parse(path)?, value)
    }

    pub fn set_path(&self, path: &KeyPath, value: Value) -> Result<(), AppError> {
        let depth = path.segments().len();
        if depth > MAX_DOCUMENT_DEPTH {
            return Err(AppError::Path(format!(
                "path '{path}' has {depth} segments (limit {MAX_DOCUMENT_DEPTH})"
            )));
        }
        if exceeds_depth(&value, MAX_DOCUMENT_DEPTH - depth) {
            return Err(AppError::Value {
                path: path.to_dotted(),
                message: format!("value would nest deeper than {MAX_DOCUMENT_DEPTH} levels"),
            });
        }
        {
            let mut doc = self.doc.borrow_mut();
            let (last, parents) = path
                .segments()
                .split_last()
                .ok_or_else(|| AppError::Path("empty path".into()))?;
            let mut node: &mut Map<String, Value> = &mut doc;
            for (depth, seg) in parents.iter().enumerate() {
                let entry = node.entry(seg.clone()).or_insert(Value::Null);
                if entry.is_null() {
                    *entry = Value::Object(Map::new());
                }
                node = match entry {
                    Value::Object(map) => map,
                    _ => {
                        return Err(AppError::PathConflict {
                            path: path.segments()[..=depth].join("."),
                        });
                    }
                };
            }
            node.insert(last.clone(), value.clone());
        }
        debug!(path = %path, "state set");
        self.persist();
        self.notify(path.clone(), value);
        Ok(())
    }

    /// Typed write via `serde_json::to_value`.
    pub fn set_as<T: Serialize>(&self, path: &str, value: &T) -> Result<(), AppError> {
        let value = serde_json::to_value(value).map_err(|e| AppError::Value {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.set(path, value)
    }

    /// Delete the leaf or subtree at `path`. Returns `false` when nothing
    /// was there. Subscribers are notified with `null`.
    pub fn remove(&self, path: &str) -> Result<bool, AppError> {
        let path = KeyPath::parse(path)?;
        let removed = {
            let mut doc = self.doc.borrow_mut();
            let Some((last, parents)) = path.segments().split_last() else {
                return Ok(false);
            };
            let mut node: &mut Map<String, Value> = &mut doc;
            for seg in parents {
                node = match node.get_mut(seg) {
                    Some(Value::Object(map)) => map,
                    _ => return Ok(false),
                };
            }
            node.remove(last).is_some()
        };
        if removed {
            debug!(path = %path, "state removed");
            self.persist();
            self.notify(path, Value::Null);
        }
        Ok(removed)
    }

    // ── Subscriptions ─────────────────────────────────────────────────

    /// Register `callback` for writes to exactly `path` or any path below it.
    pub fn subscribe<F>(&self, path: &str, callback: F) -> Result<Subscription, AppError>
    where
        F: Fn(&Value) + 'static,
    {
        let path = KeyPath::parse(path)?;
        Ok(self.listeners.add(&path.to_dotted(), Rc::new(callback)))
    }

    /// Number of callbacks registered on exactly `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.listeners.count(path)
    }

    // ── Internal ──────────────────────────────────────────────────────

    fn persist(&self) {
        let blob = match serde_json::to_string(&*self.doc.borrow()) {
            Ok(blob) => blob,
            Err(e) => {
                self.persist_failures.set(self.persist_failures.get() + 1);
                error!(key = %self.key, error = %e, "failed to serialise state");
                return;
            }
        };
        if let Err(e) = self.storage.write(&self.key, &blob) {
            self.persist_failures.set(self.persist_failures.get() + 1);
            error!(
                key = %self.key,
                backend = self.storage.kind(),
                error = %e,
                "failed to save state; change kept in memory only"
            );
        }
    }

    fn notify(&self, path: KeyPath, value: Value) {
        self.pending.borrow_mut().push_back((path, value));
        if self.flushing.replace(true) {
            // An outer flush is running and will pick this up.
            return;
        }
        let _guard = FlushGuard { flushing: &self.flushing, pending: &self.pending };

        let mut delivered = 0usize;
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some((path, value)) = next else {
                break;
            };
            if delivered == MAX_NOTIFICATIONS_PER_FLUSH {
                let dropped = {
                    let mut pending = self.pending.borrow_mut();
                    let n = pending.len() + 1;
                    pending.clear();
                    n
                };
                error!(
                    limit = MAX_NOTIFICATIONS_PER_FLUSH,
                    dropped,
                    path = %path,
                    "notification limit reached; dropping queued notifications (cyclic subscribers?)"
                );
                break;
            }
            delivered += 1;
            self.deliver(&path, &value);
        }
    }

    fn deliver(&self, path: &KeyPath, value: &Value) {
        for cb in self.listeners.callbacks(&path.to_dotted()) {
            cb(value);
        }
        for ancestor in path.ancestors() {
            let key = ancestor.to_dotted();
            if !self.listeners.has(&key) {
                continue;
            }
            let current = self.get_path(&ancestor).unwrap_or(Value::Null);
            for cb in self.listeners.callbacks(&key) {
                cb(&current);
            }
        }
    }
}

/// Ends a flush. After a callback panic this also discards the queued
/// notifications, so they are not replayed by the next unrelated write.
struct FlushGuard<'a> {
    flushing: &'a Cell<bool>,
    pending: &'a RefCell<VecDeque<(KeyPath, Value)>>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.try_borrow_mut() {
            pending.clear();
        }
        self.flushing.set(false);
    }
}

/// Whether `value` nests more than `budget` objects/arrays deep.
fn exceeds_depth(value: &Value, budget: usize) -> bool {
    match value {
        Value::Object(map) => budget == 0 || map.values().any(|v| exceeds_depth(v, budget - 1)),
        Value::Array(items) => budget == 0 || items.iter().any(|v| exceeds_depth(v, budget - 1)),
        _ => false,
    }
}

fn hydrate(storage: &dyn Storage, key: &str) -> (Map<String, Value>, Hydration) {
    let blob = match storage.read(key) {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            debug!(key, backend = storage.kind(), "no persisted state");
            return (Map::new(), Hydration::Empty);
        }
        Err(e) => {
            error!(key, backend = storage.kind(), error = %e, "failed to load state; starting empty");
            return (Map::new(), Hydration::Fallback);
        }
    };
    match serde_json::from_str::<Value>(&blob) {
        Ok(Value::Object(doc)) => {
            info!(key, backend = storage.kind(), top_level_keys = doc.len(), "state restored");
            (doc, Hydration::Restored)
        }
        Ok(_) => {
            warn!(key, "persisted state is not an object; starting empty");
            (Map::new(), Hydration::Fallback)
        }
        Err(e) => {
            error!(key, error = %e, "persisted state is malformed; starting empty");
            (Map::new(), Hydration::Fallback)
        }
    }
}
