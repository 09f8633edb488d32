use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::model::{EntityKind, Id};

/// Declared type of an entity attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Text,
    Integer,
    Boolean,
    /// Identifier of another entity of the given kind
    Reference(EntityKind),
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Text => f.write_str("text"),
            AttributeType::Integer => f.write_str("integer"),
            AttributeType::Boolean => f.write_str("boolean"),
            AttributeType::Reference(kind) => write!(f, "reference to {}", kind),
        }
    }
}

/// A decoded attribute value, tagged by the attribute's declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    Reference(Id),
}

impl AttributeType {
    /// Coerce a proposed (user supplied) JSON value into this type.
    ///
    /// Lenient on input: empty strings count as null, and numeric or boolean
    /// attributes also accept their textual form. Returns `None` when the
    /// value cannot be coerced.
    pub fn cast(&self, raw: &Value) -> Option<AttributeValue> {
        if raw.is_null() {
            return Some(AttributeValue::Null);
        }
        if let Value::String(s) = raw {
            if s.trim().is_empty() {
                return Some(AttributeValue::Null);
            }
        }

        match (self, raw) {
            (AttributeType::Text, Value::String(s)) => Some(AttributeValue::Text(s.clone())),
            (AttributeType::Integer, Value::Number(n)) => n.as_i64().map(AttributeValue::Integer),
            (AttributeType::Integer, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(AttributeValue::Integer)
            }
            (AttributeType::Boolean, Value::Bool(b)) => Some(AttributeValue::Boolean(*b)),
            (AttributeType::Boolean, Value::String(s)) => match s.trim() {
                "true" => Some(AttributeValue::Boolean(true)),
                "false" => Some(AttributeValue::Boolean(false)),
                _ => None,
            },
            (AttributeType::Reference(_), Value::String(s)) => {
                Some(AttributeValue::Reference(s.trim().to_string()))
            }
            _ => None,
        }
    }

    /// Strictly decode a stored JSON value previously produced by [`AttributeValue::encode`]
    pub fn decode(&self, stored: &Value) -> Option<AttributeValue> {
        match (self, stored) {
            (_, Value::Null) => Some(AttributeValue::Null),
            (AttributeType::Text, Value::String(s)) => Some(AttributeValue::Text(s.clone())),
            (AttributeType::Integer, Value::Number(n)) => n.as_i64().map(AttributeValue::Integer),
            (AttributeType::Boolean, Value::Bool(b)) => Some(AttributeValue::Boolean(*b)),
            (AttributeType::Reference(_), Value::String(s)) => {
                Some(AttributeValue::Reference(s.clone()))
            }
            _ => None,
        }
    }
}

impl AttributeValue {
    /// Canonical kind-erased form used for persistence
    pub fn encode(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Text(s) => Value::String(s.clone()),
            AttributeValue::Integer(i) => Value::from(*i),
            AttributeValue::Boolean(b) => Value::Bool(*b),
            AttributeValue::Reference(id) => Value::String(id.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Id> {
        match self {
            AttributeValue::Reference(id) => Some(id),
            _ => None,
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cast_is_lenient_about_text_input() {
        assert_eq!(
            AttributeType::Integer.cast(&json!("42")),
            Some(AttributeValue::Integer(42))
        );
        assert_eq!(
            AttributeType::Boolean.cast(&json!("false")),
            Some(AttributeValue::Boolean(false))
        );
        assert_eq!(AttributeType::Text.cast(&json!("   ")), Some(AttributeValue::Null));
        assert_eq!(
            AttributeType::Reference(EntityKind::Room).cast(&json!(" room-1 ")),
            Some(AttributeValue::Reference("room-1".to_string()))
        );
    }

    #[test]
    fn test_cast_rejects_mismatched_types() {
        assert_eq!(AttributeType::Integer.cast(&json!("ten")), None);
        assert_eq!(AttributeType::Integer.cast(&json!(1.5)), None);
        assert_eq!(AttributeType::Text.cast(&json!(12)), None);
        assert_eq!(AttributeType::Reference(EntityKind::Room).cast(&json!(7)), None);
    }

    #[test]
    fn test_decode_is_strict() {
        // Stored integers are never text
        assert_eq!(AttributeType::Integer.decode(&json!("42")), None);
        assert_eq!(
            AttributeType::Integer.decode(&json!(42)),
            Some(AttributeValue::Integer(42))
        );
        assert_eq!(AttributeType::Text.decode(&json!(null)), Some(AttributeValue::Null));
    }

    #[test]
    fn test_decode_accepts_encoded_values() {
        let cases = [
            (AttributeType::Text, AttributeValue::Text("Midgaard".to_string())),
            (AttributeType::Integer, AttributeValue::Integer(-3)),
            (AttributeType::Boolean, AttributeValue::Boolean(true)),
            (
                AttributeType::Reference(EntityKind::Room),
                AttributeValue::Reference("room-9".to_string()),
            ),
        ];
        for (attr_type, value) in cases {
            assert_eq!(attr_type.decode(&value.encode()), Some(value));
        }
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let value = AttributeValue::Text("Old".to_string());
        assert_eq!(serde_json::to_value(&value).unwrap(), json!("Old"));
        assert_eq!(serde_json::to_value(AttributeValue::Null).unwrap(), json!(null));
    }
}
