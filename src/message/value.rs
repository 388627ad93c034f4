use serde::de::{self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Deepest list/map nesting accepted from or sent to the wire. A scalar has
/// depth 0 and each enclosing list or map adds one.
pub const MAX_NESTING_DEPTH: usize = 128;

/// String-keyed mapping; the shape of every request and response on the wire.
pub type Map = BTreeMap<String, Value>;

/// A dynamically shaped value carried in protocol messages.
///
/// The variant set is closed: anything a request or response can contain
/// (including nested step actions and embedded binary frames) is expressed
/// with these eight shapes.
///
/// Deserialization is bounded by [`MAX_NESTING_DEPTH`] so a hostile payload
/// cannot recurse the decoder off the end of the stack.
#[derive(Clone, PartialEq, Default, Serialize)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  Bytes(#[serde(serialize_with = "serde_bytes::serialize")] Vec<u8>),
  List(Vec<Value>),
  Map(Map),
}

impl Value {
  /// Creates a byte blob value.
  pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
    Value::Bytes(data.into())
  }

  /// Creates an empty map value.
  pub fn map() -> Self {
    Value::Map(Map::new())
  }

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

  /// Returns the value as a float, widening integers.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Float(f) => Some(*f),
      Value::Int(i) => Some(*i as f64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bytes(&self) -> Option<&[u8]> {
    match self {
      Value::Bytes(b) => Some(b),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Value::List(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&Map> {
    match self {
      Value::Map(m) => Some(m),
      _ => None,
    }
  }

  /// Consumes the value, returning its map if it is one.
  pub fn into_map(self) -> Option<Map> {
    match self {
      Value::Map(m) => Some(m),
      _ => None,
    }
  }

  /// Looks up `key` if this value is a map.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.as_map().and_then(|m| m.get(key))
  }

  /// Inserts `key` into a map value, returning `self` for chaining.
  /// Non-map values are replaced by a single-entry map.
  pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    let mut m = match self {
      Value::Map(m) => m,
      _ => Map::new(),
    };
    m.insert(key.into(), value.into());
    Value::Map(m)
  }

  /// True if lists and maps nest more than `limit` levels deep.
  /// Never recurses further than `limit` levels.
  pub fn nesting_exceeds(&self, limit: usize) -> bool {
    match (self, limit) {
      (Value::List(_) | Value::Map(_), 0) => true,
      (Value::List(items), _) => items.iter().any(|v| v.nesting_exceeds(limit - 1)),
      (Value::Map(m), _) => m.values().any(|v| v.nesting_exceeds(limit - 1)),
      _ => false,
    }
  }

  /// Short name of the variant, used in protocol diagnostics.
  pub fn kind(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::Str(_) => "string",
      Value::Bytes(_) => "bytes",
      Value::List(_) => "list",
      Value::Map(_) => "map",
    }
  }
}

// --- Depth-limited deserialization ---

// Variant tags in declaration order; bincode addresses them by index.
#[derive(Deserialize)]
#[serde(variant_identifier)]
enum Tag {
  Null,
  Bool,
  Int,
  Float,
  Str,
  Bytes,
  List,
  Map,
}

const VARIANTS: &[&str] = &["Null", "Bool", "Int", "Float", "Str", "Bytes", "List", "Map"];

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    ValueSeed { depth: 0 }.deserialize(deserializer)
  }
}

/// Deserializes one `Value` found inside `depth` enclosing containers.
#[derive(Clone, Copy)]
struct ValueSeed {
  depth: usize,
}

impl ValueSeed {
  fn enter<E: de::Error>(self) -> Result<ValueSeed, E> {
    if self.depth >= MAX_NESTING_DEPTH {
      return Err(E::custom(format!("value nests deeper than {} levels", MAX_NESTING_DEPTH)));
    }
    Ok(ValueSeed { depth: self.depth + 1 })
  }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
  type Value = Value;

  fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
    deserializer.deserialize_enum("Value", VARIANTS, self)
  }
}

impl<'de> Visitor<'de> for ValueSeed {
  type Value = Value;

  fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("a Value variant")
  }

  fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Value, A::Error> {
    let (tag, variant) = data.variant::<Tag>()?;
    match tag {
      Tag::Null => variant.unit_variant().map(|()| Value::Null),
      Tag::Bool => variant.newtype_variant().map(Value::Bool),
      Tag::Int => variant.newtype_variant().map(Value::Int),
      Tag::Float => variant.newtype_variant().map(Value::Float),
      Tag::Str => variant.newtype_variant().map(Value::Str),
      Tag::Bytes => variant
        .newtype_variant::<serde_bytes::ByteBuf>()
        .map(|b| Value::Bytes(b.into_vec())),
      Tag::List => {
        let inner = self.enter::<A::Error>()?;
        variant.newtype_variant_seed(ListSeed(inner)).map(Value::List)
      }
      Tag::Map => {
        let inner = self.enter::<A::Error>()?;
        variant.newtype_variant_seed(MapSeed(inner)).map(Value::Map)
      }
    }
  }
}

// Length hints come from the peer; cap the up-front allocation.
const MAX_PREALLOCATED: usize = 4096;

struct ListSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
  type Value = Vec<Value>;

  fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
    deserializer.deserialize_seq(self)
  }
}

impl<'de> Visitor<'de> for ListSeed {
  type Value = Vec<Value>;

  fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("a list of values")
  }

  fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
    let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(MAX_PREALLOCATED));
    while let Some(item) = seq.next_element_seed(self.0)? {
      items.push(item);
    }
    Ok(items)
  }
}

struct MapSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
  type Value = Map;

  fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
    deserializer.deserialize_map(self)
  }
}

impl<'de> Visitor<'de> for MapSeed {
  type Value = Map;

  fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("a string-keyed map of values")
  }

  fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
    let mut m = Map::new();
    while let Some(key) = access.next_key::<String>()? {
      let value = access.next_value_seed(self.0)?;
      m.insert(key, value);
    }
    Ok(m)
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => f.write_str("Null"),
      Value::Bool(b) => write!(f, "{:?}", b),
      Value::Int(i) => write!(f, "{:?}", i),
      Value::Float(x) => write!(f, "{:?}", x),
      Value::Str(s) => write!(f, "{:?}", s),
      // Frames can be megabytes; only show the size.
      Value::Bytes(b) => f.debug_struct("Bytes").field("len", &b.len()).finish(),
      Value::List(items) => f.debug_list().entries(items).finish(),
      Value::Map(m) => f.debug_map().entries(m).finish(),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Str(s) => f.write_str(s),
      other => write!(f, "{:?}", other),
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

impl From<u32> for Value {
  fn from(i: u32) -> Self {
    Value::Int(i as i64)
  }
}

impl From<f64> for Value {
  fn from(x: f64) -> Self {
    Value::Float(x)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Str(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::Str(s)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Value::List(items)
  }
}

impl From<Map> for Value {
  fn from(m: Map) -> Self {
    Value::Map(m)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(opt: Option<T>) -> Self {
    opt.map_or(Value::Null, Into::into)
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}
