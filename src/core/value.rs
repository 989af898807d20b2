// ============================================================================
// trellis-reactive - Value Model
// The dynamic data tree the observation layer intercepts
// ============================================================================
//
// The engine observes plain structured data: records, lists, maps and sets of
// primitive values, nested arbitrarily. `Value` is the uniform handle; all
// structured forms are cheap Rc clones sharing one underlying `RawObject`.
//
// Identity matters throughout: the dependency store and the view caches are
// keyed by `RawObject::id`, and object-valued comparisons are by identity,
// never by structure.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::core::context::next_id;
use crate::observe::reference::RefBox;
use crate::observe::view::View;

// =============================================================================
// KEYS
// =============================================================================

/// Address of one observed slot: a record field, list element, collection
/// entry, or one of the dependency-store sentinels.
///
/// `Iterate` and `MapKeyIterate` never address stored data; they exist only as
/// dependency-store keys for enumeration-shaped reads. `Length` doubles as the
/// list length slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Named record field or string collection key
    Prop(Rc<str>),
    /// List element position
    Index(usize),
    /// List length slot
    Length,
    /// Integer collection key
    Int(i64),
    /// Boolean collection key
    Bool(bool),
    /// Object-identity collection key (raw object or ref id)
    Obj(u64),
    /// Sentinel: structural iteration (keys+values, size)
    Iterate,
    /// Sentinel: key-only iteration over a map
    MapKeyIterate,
}

impl Key {
    /// The slot key a ref-like box or computed value tracks itself under.
    pub fn value_slot() -> Key {
        Key::Prop(Rc::from("value"))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Prop(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Prop(Rc::from(s.as_str()))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

/// A value that cannot serve as a collection key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("{0} values cannot be used as collection keys")]
    Unkeyable(&'static str),
}

impl TryFrom<&Value> for Key {
    type Error = KeyError;

    /// Convert a value into a collection key.
    ///
    /// Objects and refs key by raw identity, so a wrapped view addresses the
    /// same entry as the raw object it observes. Floats and null are rejected:
    /// NaN and signed-zero identity make them hash-map hazards.
    fn try_from(value: &Value) -> Result<Self, KeyError> {
        match value {
            Value::Str(s) => Ok(Key::Prop(s.clone())),
            Value::Int(i) => Ok(Key::Int(*i)),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Obj(raw) => Ok(Key::Obj(raw.id())),
            Value::View(view) => Ok(Key::Obj(view.raw().id())),
            Value::Ref(r) => Ok(Key::Obj(r.id())),
            Value::Null => Err(KeyError::Unkeyable("null")),
            Value::Float(_) => Err(KeyError::Unkeyable("float")),
        }
    }
}

// =============================================================================
// RAW OBJECTS
// =============================================================================

/// Shared handle to an observed-object allocation.
pub type ObjRef = Rc<RawObject>;

/// The structured payload of a raw object.
pub enum RawData {
    Record(IndexMap<Rc<str>, Value>),
    List(Vec<Value>),
    Map(IndexMap<Key, Value>),
    Set(IndexSet<Key>),
}

/// An unwrapped structured object: the thing views observe.
///
/// Mutating a raw object directly never notifies subscribers; only writes
/// through a view do. `skip` opts the object out of wrapping entirely,
/// `sealed` marks it non-extensible (also never wrapped).
pub struct RawObject {
    id: u64,
    pub(crate) data: RefCell<RawData>,
    skip: Cell<bool>,
    sealed: Cell<bool>,
}

impl RawObject {
    pub(crate) fn new(data: RawData) -> ObjRef {
        Rc::new(Self {
            id: next_id(),
            data: RefCell::new(data),
            skip: Cell::new(false),
            sealed: Cell::new(false),
        })
    }

    /// Identity key for the dependency store and view caches
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_record(&self) -> bool {
        matches!(*self.data.borrow(), RawData::Record(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(*self.data.borrow(), RawData::List(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(*self.data.borrow(), RawData::Map(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(*self.data.borrow(), RawData::Set(_))
    }

    pub(crate) fn set_skip(&self) {
        self.skip.set(true);
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.get()
    }

    pub(crate) fn set_sealed(&self) {
        self.sealed.set(true);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match *self.data.borrow() {
            RawData::Record(_) => "record",
            RawData::List(_) => "list",
            RawData::Map(_) => "map",
            RawData::Set(_) => "set",
        };
        write!(f, "RawObject#{}<{}>", self.id, kind)
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// A dynamic value: primitive, ref-like box, raw object, or wrapped view.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// A ref-like box (auto-unwrapped by deep record reads)
    Ref(RefBox),
    /// An unwrapped structured object
    Obj(ObjRef),
    /// A wrapped, intercepted handle over a raw object
    View(View),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The raw object beneath this value, if it is structured (raw or view).
    pub(crate) fn underlying_raw(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(raw) => Some(raw.clone()),
            Value::View(view) => Some(view.raw().clone()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}

/// Structural equality for primitives, identity for objects/refs/views.
///
/// Floats use standard `==` here (`NaN != NaN`); change detection uses the
/// NaN-aware `same_value` instead.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Obj(a), Value::Obj(b)) => Rc::ptr_eq(a, b),
            (Value::View(a), Value::View(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

// =============================================================================
// CHANGE DETECTION
// =============================================================================

/// Value-or-identity comparison used to decide whether a write changed
/// anything.
///
/// NaN-aware: every NaN equals every NaN, and `0.0` is distinct from `-0.0`
/// (bit-pattern comparison). Objects, views and refs compare by identity.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => {
            (x.is_nan() && y.is_nan()) || x.to_bits() == y.to_bits()
        }
        _ => a == b,
    }
}

/// Negation of `same_value`; gates SET notifications.
pub fn has_changed(old: &Value, new: &Value) -> bool {
    !same_value(old, new)
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Build a raw record from field/value pairs.
///
/// # Example
///
/// ```ignore
/// let user = record([("name", "ada".into()), ("age", 36.into())]);
/// let state = reactive(user);
/// ```
pub fn record<K: Into<Rc<str>>>(fields: impl IntoIterator<Item = (K, Value)>) -> Value {
    let data: IndexMap<Rc<str>, Value> =
        fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Value::Obj(RawObject::new(RawData::Record(data)))
}

/// Build a raw list from values.
pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
    Value::Obj(RawObject::new(RawData::List(items.into_iter().collect())))
}

/// Build a raw associative map from key/value pairs.
pub fn map_of<K: Into<Key>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
    let data: IndexMap<Key, Value> =
        entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Value::Obj(RawObject::new(RawData::Map(data)))
}

/// Build a raw set from keys.
pub fn set_of<K: Into<Key>>(items: impl IntoIterator<Item = K>) -> Value {
    let data: IndexSet<Key> = items.into_iter().map(Into::into).collect();
    Value::Obj(RawObject::new(RawData::Set(data)))
}

// =============================================================================
// TESTS
// =============================================================================
