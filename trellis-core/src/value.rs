//! Dynamic Value Model
//!
//! Raw state in Trellis is expressed as `Value`: a small dynamic type covering
//! scalars, insertion-ordered maps, lists, observable cells, and tracked
//! wrappers. Container nodes (`MapNode`, `ListNode`) are shared behind `Arc`
//! and carry a unique `NodeId`, which is what the dependency graph keys on.
//!
//! # Identity
//!
//! Two `Value`s are "the same" (`Value::same`) when a write replacing one with
//! the other should not notify anybody:
//!
//! - Scalars compare by value. `NaN` is the same as `NaN`.
//! - Containers, cells, and tracked wrappers compare by pointer.
//!
//! This is the comparison every no-change write check in the engine uses.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::reactive::{Ref, Tracked};

/// Unique identifier for a container node.
///
/// Uses an atomic counter to ensure uniqueness across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A map-shaped raw value: string keys to values, in insertion order.
pub struct MapNode {
    id: NodeId,
    pub(crate) entries: RwLock<IndexMap<String, Value>>,
}

impl MapNode {
    pub(crate) fn new(entries: IndexMap<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(),
            entries: RwLock::new(entries),
        })
    }

    /// Get this node's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl fmt::Debug for MapNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapNode")
            .field("id", &self.id)
            .field("len", &self.entries.read().len())
            .finish()
    }
}

/// A list-shaped raw value.
pub struct ListNode {
    id: NodeId,
    pub(crate) items: RwLock<Vec<Value>>,
}

impl ListNode {
    pub(crate) fn new(items: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(),
            items: RwLock::new(items),
        })
    }

    /// Get this node's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl fmt::Debug for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListNode")
            .field("id", &self.id)
            .field("len", &self.items.read().len())
            .finish()
    }
}

/// A property key on a tracked container.
///
/// Maps are addressed by name, lists by index. A numeric key applied to a map
/// is coerced to its decimal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name}"),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A dynamically typed value.
///
/// Containers are shared: cloning a `Value::Map` clones the handle, not the
/// entries. `Tracked` is the reactive wrapper form of a container and `Cell`
/// is a single-slot observable; both are explicit variants rather than
/// in-band marker keys, so the ordinary read path never has to probe for
/// sentinels.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Arc<ListNode>),
    Map(Arc<MapNode>),
    Cell(Ref),
    Tracked(Tracked),
}

impl Value {
    /// Create an empty map value.
    pub fn map() -> Value {
        Value::Map(MapNode::new(IndexMap::new()))
    }

    /// Create a map value from key/value pairs.
    pub fn map_of<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Map(MapNode::new(entries))
    }

    /// Create an empty list value.
    pub fn list() -> Value {
        Value::List(ListNode::new(Vec::new()))
    }

    /// Create a list value from items.
    pub fn list_of<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::List(ListNode::new(items.into_iter().map(Into::into).collect()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check whether this value is a tracked wrapper.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Value::Tracked(_))
    }

    /// Check whether this value is a raw (unwrapped) container.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Map(_) | Value::List(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tracked(&self) -> Option<&Tracked> {
        match self {
            Value::Tracked(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&Ref> {
        match self {
            Value::Cell(r) => Some(r),
            _ => None,
        }
    }

    /// Unwrap a tracked value back to its raw container.
    ///
    /// Non-tracked values are returned unchanged.
    pub fn raw(self) -> Value {
        match self {
            Value::Tracked(t) => t.raw(),
            other => other,
        }
    }

    /// Same-value comparison: the no-change rule for writes.
    ///
    /// Scalars by value (`NaN` equals `NaN`), containers and cells by
    /// pointer identity.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Cell(a), Value::Cell(b)) => a.ptr_eq(b),
            (Value::Tracked(a), Value::Tracked(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Get the container behind a `Map`/`List` value, if any.
    pub(crate) fn container(&self) -> Option<Container> {
        match self {
            Value::Map(node) => Some(Container::Map(Arc::clone(node))),
            Value::List(node) => Some(Container::List(Arc::clone(node))),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(n) => write!(f, "Float({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(node) => node.fmt(f),
            Value::Map(node) => node.fmt(f),
            Value::Cell(r) => r.fmt(f),
            Value::Tracked(t) => t.fmt(f),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Cell(r)
    }
}

impl From<Tracked> for Value {
    fn from(t: Tracked) -> Self {
        Value::Tracked(t)
    }
}

/// A container with its shape fixed at wrap time.
///
/// The wrapper and the dependency graph dispatch on this tag once instead of
/// re-deriving the shape on every access.
#[derive(Clone)]
pub(crate) enum Container {
    Map(Arc<MapNode>),
    List(Arc<ListNode>),
}

impl Container {
    pub(crate) fn id(&self) -> NodeId {
        match self {
            Container::Map(node) => node.id(),
            Container::List(node) => node.id(),
        }
    }

    pub(crate) fn is_list(&self) -> bool {
        matches!(self, Container::List(_))
    }

    pub(crate) fn as_value(&self) -> Value {
        match self {
            Container::Map(node) => Value::Map(Arc::clone(node)),
            Container::List(node) => Value::List(Arc::clone(node)),
        }
    }

    pub(crate) fn downgrade(&self) -> ContainerAnchor {
        match self {
            Container::Map(node) => ContainerAnchor::Map(Arc::downgrade(node)),
            Container::List(node) => ContainerAnchor::List(Arc::downgrade(node)),
        }
    }
}

/// Weak handle a graph entry keeps on its container, so entries keyed by a
/// dead raw value can be pruned lazily.
pub(crate) enum ContainerAnchor {
    Map(Weak<MapNode>),
    List(Weak<ListNode>),
}

impl ContainerAnchor {
    pub(crate) fn is_live(&self) -> bool {
        match self {
            ContainerAnchor::Map(weak) => weak.strong_count() > 0,
            ContainerAnchor::List(weak) => weak.strong_count() > 0,
        }
    }
}
