//! Value model: document ids, node references, REF values, and the total
//! order used for sorting JSON values.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Document id: a positive integer unique within its entity.
pub type DocId = u64;

/// JSON object shorthand.
pub type JsonMap = serde_json::Map<String, Value>;

/// A document viewed through the graph lens: `entity:id`.
///
/// Serializes as the string form so it can key JSON maps in the persisted
/// graph index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    /// Owning entity (collection) name
    pub entity: String,
    /// Document id within the entity
    pub id: DocId,
}

impl NodeRef {
    /// Create a node reference.
    pub fn new(entity: impl Into<String>, id: DocId) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.id)
    }
}

impl FromStr for NodeRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (entity, id) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::validation(format!("Invalid node reference: {s}")))?;
        let id = id
            .parse::<DocId>()
            .map_err(|_| Error::validation(format!("Invalid node reference: {s}")))?;
        validate_entity_name(entity)?;
        Ok(NodeRef::new(entity, id))
    }
}

impl Serialize for NodeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A parsed reference value from a document field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefValue {
    /// Target entity; `None` when the short form `{"id": n}` appears on a
    /// field whose schema names the entity.
    pub entity: Option<String>,
    /// Target document id
    pub id: DocId,
}

impl RefValue {
    /// Resolve the target entity, falling back to the schema-declared one.
    pub fn target(&self, declared: Option<&str>) -> Option<NodeRef> {
        self.entity
            .as_deref()
            .or(declared)
            .map(|e| NodeRef::new(e, self.id))
    }
}

/// Parse a single reference value.
///
/// Accepts the short form `{"id": n}` and the long form
/// `{"type": "REF", "entity": "...", "id": n}`. Anything else is not a
/// reference.
pub fn parse_ref(value: &Value) -> Option<RefValue> {
    let obj = value.as_object()?;
    let id = obj.get("id")?.as_u64()?;
    if id == 0 {
        return None;
    }
    match obj.get("type").and_then(Value::as_str) {
        Some("REF") => {
            let entity = obj.get("entity")?.as_str()?;
            Some(RefValue {
                entity: Some(entity.to_string()),
                id,
            })
        }
        Some(_) => None,
        // Short form: an object holding nothing but `id`
        None if obj.len() == 1 => Some(RefValue { entity: None, id }),
        None => None,
    }
}

/// Parse a reference field value, which may be a single reference or a list.
pub fn parse_refs(value: &Value) -> Vec<RefValue> {
    match value {
        Value::Array(items) => items.iter().filter_map(parse_ref).collect(),
        other => parse_ref(other).into_iter().collect(),
    }
}

/// Normalise a reference value to the stored shape `{"id": n}`.
pub fn normalize_ref(id: DocId) -> Value {
    serde_json::json!({ "id": id })
}

/// Check an entity name against `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_entity_name(entity: &str) -> Result<()> {
    let mut chars = entity.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::validation(format!("Invalid entity name: {entity}")))
    }
}

/// Node type name for an entity: title-cased singular (`users` -> `User`).
pub fn type_name_for_entity(entity: &str) -> String {
    let singular = entity.strip_suffix('s').filter(|s| !s.is_empty()).unwrap_or(entity);
    let mut chars = singular.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Case-insensitive entity/type match accepting singular and plural forms:
/// entity `users` matches `User`, `Users`, `user`, and `users`.
///
/// This is the single normalisation routine applied at ingest and at every
/// Sulpher type match.
pub fn entity_matches_type(entity: &str, type_name: &str) -> bool {
    let e = entity.to_lowercase();
    let t = type_name.to_lowercase();
    e == t || e == format!("{t}s") || t == format!("{e}s")
}

/// Total order over JSON values used by `ORDER BY`, list sorting, and
/// MIN/MAX: null < booleans < numbers < strings < arrays < objects.
pub fn json_cmp(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xa, ya) in x.iter().zip(y.iter()) {
                let ord = json_cmp(xa, ya);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
