//! Dependency Graph
//!
//! The graph maps `(container, key)` pairs to the set of effects that read
//! them. Keys include two synthetic entries, `Length` (lists) and `Iterate`
//! (maps), which model whole-container reads: a computation that enumerated a
//! map's keys must re-run when a key is added or removed even though it never
//! read the new key directly.
//!
//! Each graph entry keeps a weak anchor on its container so entries keyed by
//! a dropped raw value can be pruned lazily; nothing is swept eagerly.
//! Subscriber sets hold weak effect references for the same reason.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::value::{Container, ContainerAnchor, Key, NodeId};

use super::effect::{Effect, EffectId, EffectInner};

/// A key in the dependency graph.
///
/// `Name`/`Index` mirror data keys; `Length` and `Iterate` are synthetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    Name(String),
    Index(usize),
    Length,
    Iterate,
}

impl From<Key> for DepKey {
    fn from(key: Key) -> Self {
        match key {
            Key::Name(name) => DepKey::Name(name),
            Key::Index(index) => DepKey::Index(index),
        }
    }
}

/// The kind of change a write performed, which decides the synthetic keys
/// included in the notification fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    /// A key that did not exist before.
    Add,
    /// An existing key whose value changed.
    Set,
    /// A key that was removed.
    Delete,
}

/// The keys whose subscribers a change notifies: the specific key, plus the
/// shape-specific synthetic key for structural changes.
pub(crate) fn change_keys(
    target: &Container,
    kind: ChangeKind,
    key: Option<DepKey>,
) -> SmallVec<[DepKey; 2]> {
    let mut keys = SmallVec::new();
    if let Some(key) = key {
        keys.push(key);
    }
    match kind {
        ChangeKind::Add => {
            if target.is_list() {
                keys.push(DepKey::Length);
            } else {
                keys.push(DepKey::Iterate);
            }
        }
        ChangeKind::Delete => {
            if !target.is_list() {
                keys.push(DepKey::Iterate);
            }
        }
        ChangeKind::Set => {}
    }
    keys
}

/// A subscriber set for one tracked slot.
///
/// Insertion-ordered so notification happens in subscription order. Entries
/// are weak; dead effects are dropped the next time the set is snapshotted.
pub(crate) struct Dep {
    subscribers: Mutex<IndexMap<EffectId, Weak<EffectInner>>>,
}

impl Dep {
    pub(crate) fn new() -> Arc<Dep> {
        Arc::new(Dep {
            subscribers: Mutex::new(IndexMap::new()),
        })
    }

    /// Add an effect to the set. Returns false if it was already subscribed.
    pub(crate) fn subscribe(&self, effect: &Effect) -> bool {
        self.subscribers
            .lock()
            .insert(effect.id(), effect.downgrade())
            .is_none()
    }

    pub(crate) fn unsubscribe(&self, id: EffectId) {
        self.subscribers.lock().shift_remove(&id);
    }

    /// Snapshot the live subscribers into a fixed sequence.
    ///
    /// Taken before iterating so a notified effect re-subscribing mid-flight
    /// cannot perturb the iteration. Dead entries are pruned here.
    pub(crate) fn snapshot(&self) -> SmallVec<[Effect; 4]> {
        let mut subscribers = self.subscribers.lock();
        let mut live = SmallVec::new();
        subscribers.retain(|_, weak| match weak.upgrade() {
            Some(inner) => {
                live.push(Effect::from_inner(inner));
                true
            }
            None => false,
        });
        live
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

struct NodeEntry {
    anchor: ContainerAnchor,
    deps: HashMap<DepKey, Arc<Dep>>,
}

/// The object-keyed half of the dependency graph.
///
/// Cells and computed values own their single dep directly and never appear
/// here.
pub(crate) struct DepGraph {
    entries: HashMap<NodeId, NodeEntry>,
    prune_at: usize,
}

impl DepGraph {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            prune_at: 64,
        }
    }

    /// Get or create the dep for `(target, key)`.
    pub(crate) fn dep_for(&mut self, target: &Container, key: DepKey) -> Arc<Dep> {
        if self.entries.len() >= self.prune_at {
            self.prune();
        }
        let entry = self
            .entries
            .entry(target.id())
            .or_insert_with(|| NodeEntry {
                anchor: target.downgrade(),
                deps: HashMap::new(),
            });
        Arc::clone(entry.deps.entry(key).or_insert_with(Dep::new))
    }

    /// Look up existing deps for the given keys on one node.
    ///
    /// Missing node or missing keys are normal: the result is simply shorter.
    pub(crate) fn existing(
        &self,
        id: NodeId,
        keys: &[DepKey],
    ) -> SmallVec<[Arc<Dep>; 2]> {
        let mut found = SmallVec::new();
        if let Some(entry) = self.entries.get(&id) {
            for key in keys {
                if let Some(dep) = entry.deps.get(key) {
                    found.push(Arc::clone(dep));
                }
            }
        }
        found
    }

    fn prune(&mut self) {
        self.entries.retain(|_, entry| entry.anchor.is_live());
        self.prune_at = (self.entries.len() * 2).max(64);
    }

    #[cfg(test)]
    pub(crate) fn node_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;
    use crate::value::Value;

    fn container(value: &Value) -> Container {
        value.container().expect("container value")
    }

    #[test]
    fn subscribe_is_idempotent_per_effect() {
        let rt = Runtime::new();
        let effect = rt.effect(|| {});
        let dep = Dep::new();

        assert!(dep.subscribe(&effect));
        assert!(!dep.subscribe(&effect));
        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn snapshot_preserves_subscription_order() {
        let rt = Runtime::new();
        let first = rt.effect(|| {});
        let second = rt.effect(|| {});
        let dep = Dep::new();

        dep.subscribe(&first);
        dep.subscribe(&second);

        let snapshot = dep.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id(), first.id());
        assert_eq!(snapshot[1].id(), second.id());
    }

    #[test]
    fn snapshot_prunes_dropped_effects() {
        let rt = Runtime::new();
        let dep = Dep::new();
        let kept = rt.effect(|| {});
        dep.subscribe(&kept);
        {
            let dropped = rt.effect(|| {});
            dep.subscribe(&dropped);
            assert_eq!(dep.subscriber_count(), 2);
        }

        let snapshot = dep.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn change_keys_follow_container_shape() {
        let map = Value::map();
        let list = Value::list();

        let keys = change_keys(
            &container(&map),
            ChangeKind::Add,
            Some(DepKey::Name("x".into())),
        );
        assert_eq!(&keys[..], &[DepKey::Name("x".into()), DepKey::Iterate]);

        let keys = change_keys(&container(&list), ChangeKind::Add, Some(DepKey::Index(0)));
        assert_eq!(&keys[..], &[DepKey::Index(0), DepKey::Length]);

        let keys = change_keys(
            &container(&map),
            ChangeKind::Delete,
            Some(DepKey::Name("x".into())),
        );
        assert_eq!(&keys[..], &[DepKey::Name("x".into()), DepKey::Iterate]);

        let keys = change_keys(
            &container(&map),
            ChangeKind::Set,
            Some(DepKey::Name("x".into())),
        );
        assert_eq!(&keys[..], &[DepKey::Name("x".into())]);
    }

    #[test]
    fn graph_entries_prune_with_their_container() {
        let mut graph = DepGraph::new();
        let keep = Value::map();
        graph.dep_for(&container(&keep), DepKey::Iterate);
        for _ in 0..64 {
            let dead = Value::map();
            graph.dep_for(&container(&dead), DepKey::Iterate);
        }
        // The 65th insert crosses the prune threshold and sweeps dead anchors.
        assert!(graph.node_count() <= 2);
        let found = graph.existing(container(&keep).id(), &[DepKey::Iterate]);
        assert_eq!(found.len(), 1);
    }
}
