//! Tracked-Container Wrapper
//!
//! A `Tracked` is the intercepting façade over one raw container. Reads
//! record dependencies, writes notify subscribers, and nested containers are
//! wrapped lazily at access time rather than eagerly at wrap time.
//!
//! The container's shape (map vs list) is fixed when the wrapper is
//! constructed and decides the notification policy for structural changes:
//! lists notify `Length`, maps notify `Iterate`.
//!
//! # Cell unwrapping
//!
//! A map read whose stored value is a cell returns the cell's inner value
//! (reading through the cell, so the cell's dep is tracked too). A list
//! index read returns the cell itself: lists index into cells, they do not
//! flatten element cells away.
//!
//! # List instrumentation
//!
//! The length-mutating operations (`push`, `pop`, `shift`, `unshift`,
//! `splice`) pause tracking around the raw mutation and then notify exactly
//! the keys that changed. Pausing keeps a computation that mutates a list
//! from subscribing to `length` mid-mutation and re-triggering itself
//! through its own write. The pause is released before the notification
//! fires: notified effects must re-run under full tracking or they would
//! lose their subscriptions.

use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use crate::value::{Container, Key, NodeId, Value};

use super::dep::{ChangeKind, DepKey};
use super::runtime::Runtime;

pub(crate) struct TrackedInner {
    rt: Runtime,
    target: Container,
}

/// A transparent reactive wrapper over one raw container.
#[derive(Clone)]
pub struct Tracked {
    inner: Arc<TrackedInner>,
}

impl Tracked {
    pub(crate) fn construct(rt: Runtime, target: Container) -> Tracked {
        Tracked {
            inner: Arc::new(TrackedInner { rt, target }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<TrackedInner>) -> Tracked {
        Tracked { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<TrackedInner> {
        Arc::downgrade(&self.inner)
    }

    fn rt(&self) -> &Runtime {
        &self.inner.rt
    }

    fn target(&self) -> &Container {
        &self.inner.target
    }

    pub(crate) fn node_id(&self) -> NodeId {
        self.target().id()
    }

    /// Reference identity: do two handles wrap the same registry entry?
    pub fn ptr_eq(&self, other: &Tracked) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_map(&self) -> bool {
        !self.target().is_list()
    }

    pub fn is_list(&self) -> bool {
        self.target().is_list()
    }

    /// The underlying raw container, untracked.
    pub fn raw(&self) -> Value {
        self.target().as_value()
    }

    /// Coerce a numeric key on a map to its decimal name, mirroring how
    /// dynamic data addresses map slots by number.
    fn coerce(&self, key: Key) -> Key {
        match (&self.inner.target, key) {
            (Container::Map(_), Key::Index(index)) => Key::Name(index.to_string()),
            (_, key) => key,
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Read a property, recording the dependency and lazily wrapping nested
    /// containers. Missing keys read as `Null`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        match (self.target(), self.coerce(key.into())) {
            (Container::Map(node), Key::Name(name)) => {
                self.rt().track(self.target(), DepKey::Name(name.clone()));
                let stored = node.entries.read().get(&name).cloned();
                match stored {
                    // Maps read through cells to their inner value.
                    Some(Value::Cell(cell)) => cell.get(),
                    Some(value) => self.rt().wrap(value),
                    None => Value::Null,
                }
            }
            (Container::List(node), Key::Index(index)) => {
                self.rt().track(self.target(), DepKey::Index(index));
                let stored = node.items.read().get(index).cloned();
                match stored {
                    // Lists return element cells unflattened.
                    Some(cell @ Value::Cell(_)) => cell,
                    Some(value) => self.rt().wrap(value),
                    None => Value::Null,
                }
            }
            (Container::List(node), Key::Name(name)) if name == "length" => {
                self.rt().track(self.target(), DepKey::Length);
                Value::Int(node.items.read().len() as i64)
            }
            (Container::List(_), Key::Name(name)) => {
                tracing::warn!(key = %name, "named read on a tracked list; returning Null");
                Value::Null
            }
            (Container::Map(_), Key::Index(_)) => unreachable!("coerced above"),
        }
    }

    /// Read a property without recording a dependency or wrapping the
    /// result.
    pub fn get_untracked(&self, key: impl Into<Key>) -> Value {
        match (self.target(), self.coerce(key.into())) {
            (Container::Map(node), Key::Name(name)) => {
                node.entries.read().get(&name).cloned().unwrap_or(Value::Null)
            }
            (Container::List(node), Key::Index(index)) => {
                node.items.read().get(index).cloned().unwrap_or(Value::Null)
            }
            (Container::List(node), Key::Name(name)) if name == "length" => {
                Value::Int(node.items.read().len() as i64)
            }
            _ => Value::Null,
        }
    }

    /// Check for a key, recording a membership dependency on that key.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        match (self.target(), self.coerce(key.into())) {
            (Container::Map(node), Key::Name(name)) => {
                self.rt().track(self.target(), DepKey::Name(name.clone()));
                node.entries.read().contains_key(&name)
            }
            (Container::List(node), Key::Index(index)) => {
                self.rt().track(self.target(), DepKey::Index(index));
                index < node.items.read().len()
            }
            (Container::List(_), Key::Name(name)) if name == "length" => {
                self.rt().track(self.target(), DepKey::Length);
                true
            }
            _ => false,
        }
    }

    /// Enumerate keys, recording an iteration dependency (`Iterate` for
    /// maps, `Length` for lists).
    pub fn keys(&self) -> Vec<Key> {
        match self.target() {
            Container::Map(node) => {
                self.rt().track(self.target(), DepKey::Iterate);
                node.entries.read().keys().cloned().map(Key::Name).collect()
            }
            Container::List(node) => {
                self.rt().track(self.target(), DepKey::Length);
                (0..node.items.read().len()).map(Key::Index).collect()
            }
        }
    }

    /// Entry count, under the same iteration dependency as [`Tracked::keys`].
    pub fn len(&self) -> usize {
        match self.target() {
            Container::Map(node) => {
                self.rt().track(self.target(), DepKey::Iterate);
                node.entries.read().len()
            }
            Container::List(node) => {
                self.rt().track(self.target(), DepKey::Length);
                node.items.read().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Write a property. Notifies an add (key plus the structural synthetic
    /// key) for new keys, a set (key only) for changed values, and nothing
    /// when the stored value is already the same.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let value = value.into();
        match (self.target(), self.coerce(key.into())) {
            (Container::Map(node), Key::Name(name)) => {
                let change = {
                    let mut entries = node.entries.write();
                    let old = entries.get(&name).cloned();
                    entries.insert(name.clone(), value.clone());
                    match old {
                        None => Some(ChangeKind::Add),
                        Some(old) if !value.same(&old) => Some(ChangeKind::Set),
                        Some(_) => None,
                    }
                };
                if let Some(kind) = change {
                    self.rt()
                        .trigger(self.target(), kind, Some(DepKey::Name(name)));
                }
            }
            (Container::List(node), Key::Index(index)) => {
                let change = {
                    let mut items = node.items.write();
                    if index < items.len() {
                        if value.same(&items[index]) {
                            None
                        } else {
                            items[index] = value.clone();
                            Some(ChangeKind::Set)
                        }
                    } else {
                        // Writing past the end grows the list, padding with
                        // Null when there is a gap.
                        items.resize(index, Value::Null);
                        items.push(value.clone());
                        Some(ChangeKind::Add)
                    }
                };
                if let Some(kind) = change {
                    self.rt()
                        .trigger(self.target(), kind, Some(DepKey::Index(index)));
                }
            }
            (Container::List(node), Key::Name(name)) if name == "length" => {
                let Some(new_len) = value.as_i64().map(|n| n.max(0) as usize) else {
                    tracing::warn!("non-integer length write on a tracked list; ignored");
                    return;
                };
                self.set_len(node.items.write(), new_len);
            }
            (Container::List(_), Key::Name(name)) => {
                tracing::warn!(key = %name, "named write on a tracked list; ignored");
            }
            (Container::Map(_), Key::Index(_)) => unreachable!("coerced above"),
        }
    }

    fn set_len(
        &self,
        mut items: parking_lot::RwLockWriteGuard<'_, Vec<Value>>,
        new_len: usize,
    ) {
        let old_len = items.len();
        if new_len == old_len {
            return;
        }
        items.resize(new_len, Value::Null);
        drop(items);
        let mut keys: SmallVec<[DepKey; 2]> = SmallVec::new();
        // Truncated slots count as removed keys.
        for index in new_len..old_len {
            keys.push(DepKey::Index(index));
        }
        keys.push(DepKey::Length);
        self.rt().trigger_keys(self.target(), keys);
    }

    /// Delete a key. Returns whether it existed; existing keys notify the
    /// key plus the structural synthetic key.
    pub fn remove(&self, key: impl Into<Key>) -> bool {
        match (self.target(), self.coerce(key.into())) {
            (Container::Map(node), Key::Name(name)) => {
                let removed = node.entries.write().shift_remove(&name).is_some();
                if removed {
                    self.rt().trigger(
                        self.target(),
                        ChangeKind::Delete,
                        Some(DepKey::Name(name)),
                    );
                }
                removed
            }
            (Container::List(node), Key::Index(index)) => {
                let old_len = {
                    let mut items = node.items.write();
                    if index >= items.len() {
                        return false;
                    }
                    items.remove(index);
                    items.len() + 1
                };
                // Removal shifts everything after the hole and shrinks the
                // list, so all of those slots changed.
                let mut keys: SmallVec<[DepKey; 2]> = SmallVec::new();
                for shifted in index..old_len {
                    keys.push(DepKey::Index(shifted));
                }
                keys.push(DepKey::Length);
                self.rt().trigger_keys(self.target(), keys);
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // List instrumentation
    // ------------------------------------------------------------------

    fn list_node(&self, op: &str) -> Option<&Arc<crate::value::ListNode>> {
        match self.target() {
            Container::List(node) => Some(node),
            Container::Map(_) => {
                tracing::warn!(op, "list operation on a tracked map; ignored");
                None
            }
        }
    }

    /// Append an item. Notifies the new index and `length`.
    pub fn push(&self, value: impl Into<Value>) {
        let Some(node) = self.list_node("push") else {
            return;
        };
        // The pause covers only the raw mutation; it must be released
        // before triggering so notified effects re-run under full tracking.
        let index = {
            let _pause = self.rt().pause_scoped();
            let mut items = node.items.write();
            items.push(value.into());
            items.len() - 1
        };
        self.rt()
            .trigger(self.target(), ChangeKind::Add, Some(DepKey::Index(index)));
    }

    /// Remove and return the last item. Notifies the removed index and
    /// `length`.
    pub fn pop(&self) -> Option<Value> {
        let node = self.list_node("pop")?;
        let (removed, index) = {
            let _pause = self.rt().pause_scoped();
            let mut items = node.items.write();
            let removed = items.pop()?;
            (removed, items.len())
        };
        self.rt()
            .trigger_keys(self.target(), [DepKey::Index(index), DepKey::Length]);
        Some(removed)
    }

    /// Remove and return the first item; every surviving slot shifts.
    pub fn shift(&self) -> Option<Value> {
        let node = self.list_node("shift")?;
        let (removed, old_len) = {
            let _pause = self.rt().pause_scoped();
            let mut items = node.items.write();
            if items.is_empty() {
                return None;
            }
            let removed = items.remove(0);
            (removed, items.len() + 1)
        };
        let mut keys: SmallVec<[DepKey; 2]> = SmallVec::new();
        for index in 0..old_len {
            keys.push(DepKey::Index(index));
        }
        keys.push(DepKey::Length);
        self.rt().trigger_keys(self.target(), keys);
        Some(removed)
    }

    /// Insert an item at the front; every slot shifts.
    pub fn unshift(&self, value: impl Into<Value>) {
        let Some(node) = self.list_node("unshift") else {
            return;
        };
        let new_len = {
            let _pause = self.rt().pause_scoped();
            let mut items = node.items.write();
            items.insert(0, value.into());
            items.len()
        };
        let mut keys: SmallVec<[DepKey; 2]> = SmallVec::new();
        for index in 0..new_len {
            keys.push(DepKey::Index(index));
        }
        keys.push(DepKey::Length);
        self.rt().trigger_keys(self.target(), keys);
    }

    /// Remove `delete_count` items at `start`, inserting `replacements` in
    /// their place. Returns the removed items. Notifies every slot from
    /// `start` through the larger of the old and new ends, plus `length`
    /// when the size changed.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        replacements: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let Some(node) = self.list_node("splice") else {
            return Vec::new();
        };
        let (removed, old_len, new_len) = {
            let _pause = self.rt().pause_scoped();
            let mut items = node.items.write();
            let old_len = items.len();
            let start = start.min(old_len);
            let end = (start + delete_count).min(old_len);
            let removed: Vec<Value> = items.splice(start..end, replacements).collect();
            let new_len = items.len();
            (removed, old_len, new_len)
        };
        let mut keys: SmallVec<[DepKey; 2]> = SmallVec::new();
        for index in start.min(old_len)..old_len.max(new_len) {
            keys.push(DepKey::Index(index));
        }
        if new_len != old_len {
            keys.push(DepKey::Length);
        }
        if !keys.is_empty() {
            self.rt().trigger_keys(self.target(), keys);
        }
        removed
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("node", &self.node_id())
            .field("shape", if self.is_list() { &"list" } else { &"map" })
            .finish()
    }
}
