use duplicate::duplicate_item;
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A loosely-typed value.
///
/// Used for activity arguments, computed attributes, discrete resource samples,
/// and serialized events. Mission models convert to and from their own types at the
/// edges; the engine never looks inside.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum SerializedValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    String(String),
    Duration(Duration),
    List(Vec<SerializedValue>),
    Map(BTreeMap<String, SerializedValue>),
}

impl SerializedValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SerializedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SerializedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Ints are widened, since JSON-ish sources don't distinguish `1` from `1.0`.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            SerializedValue::Real(r) => Some(*r),
            SerializedValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SerializedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            SerializedValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, SerializedValue>> {
        match self {
            SerializedValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SerializedValue::Null)
    }
}

#[duplicate_item(
    ty           variant       conversion;
    [bool]       [Bool]        [value];
    [i64]        [Int]         [value];
    [i32]        [Int]         [value as i64];
    [u32]        [Int]         [value as i64];
    [f64]        [Real]        [value];
    [String]     [String]      [value];
    [Duration]   [Duration]    [value];
)]
impl From<ty> for SerializedValue {
    fn from(value: ty) -> Self {
        SerializedValue::variant(conversion)
    }
}

impl From<&str> for SerializedValue {
    fn from(value: &str) -> Self {
        SerializedValue::String(value.to_string())
    }
}

impl From<()> for SerializedValue {
    fn from(_: ()) -> Self {
        SerializedValue::Null
    }
}

impl<T: Into<SerializedValue>> From<Vec<T>> for SerializedValue {
    fn from(value: Vec<T>) -> Self {
        SerializedValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, SerializedValue>> for SerializedValue {
    fn from(value: BTreeMap<String, SerializedValue>) -> Self {
        SerializedValue::Map(value)
    }
}
