//! Property values and declared value types.

use crate::model::identity::TypeKey;
use crate::model::object::{AccessError, ObjectRef};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Dynamic value of one property.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    /// Shared handle to an entity, embeddable or other mapped object.
    Object(ObjectRef),
    /// Materialized collection of values.
    List(Vec<Value>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Null-safe equality that may fail when an object comparison fails.
    pub fn try_equals(&self, other: &Value) -> Result<bool, AccessError> {
        match (self, other) {
            (Self::Null, Self::Null) => Ok(true),
            (Self::Bool(a), Self::Bool(b)) => Ok(a == b),
            (Self::Int(a), Self::Int(b)) => Ok(a == b),
            (Self::Float(a), Self::Float(b)) => Ok(a == b),
            (Self::Text(a), Self::Text(b)) => Ok(a == b),
            (Self::Uuid(a), Self::Uuid(b)) => Ok(a == b),
            (Self::Object(a), Self::Object(b)) => a.try_equals(b),
            (Self::List(a), Self::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (left, right) in a.iter().zip(b) {
                    if !left.try_equals(right)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Forces lazily fetched content behind this value to materialize.
    ///
    /// Materialized lists and scalars are always initialized.
    pub fn initialize(&self) -> Result<(), AccessError> {
        match self {
            Self::Object(object) => object.initialize(),
            _ => Ok(()),
        }
    }
}

/// Returns whether two values differ.
///
/// A failed comparison counts as a difference.
pub fn values_differ(a: &Value, b: &Value) -> bool {
    !matches!(a.try_equals(b), Ok(true))
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Object(object) => f.write_str(&object.to_text()),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    /// Mapped object type (entity, embeddable or value object).
    Object(TypeKey),
    /// Collection whose elements have the inner type.
    List(Box<ValueType>),
}

impl ValueType {
    pub fn object(key: impl Into<TypeKey>) -> Self {
        Self::Object(key.into())
    }

    pub fn list_of(element: ValueType) -> Self {
        Self::List(Box::new(element))
    }

    /// Returns whether `value` can be stored without coercion.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Text, Value::Text(_))
            | (Self::Uuid, Value::Uuid(_)) => true,
            (Self::Object(key), Value::Object(object)) => {
                object.type_key().is_ok_and(|actual| &actual == key)
            }
            (Self::List(element), Value::List(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            _ => false,
        }
    }

    /// Builds a value of this type from its string representation.
    ///
    /// Only scalar types have a built-in string constructor.
    pub fn parse_text(&self, text: &str) -> Option<Value> {
        match self {
            Self::Bool => text.trim().parse::<bool>().ok().map(Value::Bool),
            Self::Int => text.trim().parse::<i64>().ok().map(Value::Int),
            Self::Float => text.trim().parse::<f64>().ok().map(Value::Float),
            Self::Text => Some(Value::Text(text.to_string())),
            Self::Uuid => Uuid::parse_str(text.trim()).ok().map(Value::Uuid),
            Self::Object(_) | Self::List(_) => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Mapped object type of this type or of its elements.
    pub fn object_key(&self) -> Option<&TypeKey> {
        match self {
            Self::Object(key) => Some(key),
            Self::List(element) => element.object_key(),
            _ => None,
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("text"),
            Self::Uuid => f.write_str("uuid"),
            Self::Object(key) => write!(f, "{key}"),
            Self::List(element) => write!(f, "list<{element}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{values_differ, Value, ValueType};
    use crate::model::identity::TypeKey;
    use crate::model::object::{AccessError, MappedObject, ObjectRef};

    #[derive(Debug)]
    struct Fragile;

    impl MappedObject for Fragile {
        fn type_key(&self) -> TypeKey {
            TypeKey::new("Fragile")
        }

        fn equals(&self, _other: &dyn MappedObject) -> Result<bool, AccessError> {
            Err(AccessError::new("equality override failed"))
        }
    }

    #[test]
    fn values_differ_is_null_safe() {
        assert!(!values_differ(&Value::Null, &Value::Null));
        assert!(values_differ(&Value::Null, &Value::from("a")));
        assert!(values_differ(&Value::from("a"), &Value::Null));
        assert!(!values_differ(&Value::from(3), &Value::Int(3)));
    }

    #[test]
    fn failed_comparison_counts_as_different() {
        let a = ObjectRef::new(Fragile);
        let b = ObjectRef::new(Fragile);
        assert!(values_differ(&Value::Object(a.clone()), &Value::Object(b)));
        assert!(!values_differ(&Value::Object(a.clone()), &Value::Object(a)));
    }

    #[test]
    fn accepts_matches_declared_types() {
        assert!(ValueType::Text.accepts(&Value::Null));
        assert!(ValueType::Int.accepts(&Value::Int(1)));
        assert!(!ValueType::Int.accepts(&Value::from("1")));
        assert!(ValueType::object("Fragile").accepts(&Value::Object(ObjectRef::new(Fragile))));
        assert!(!ValueType::object("Other").accepts(&Value::Object(ObjectRef::new(Fragile))));
        assert!(ValueType::list_of(ValueType::Int).accepts(&Value::List(vec![Value::Int(1)])));
        assert!(!ValueType::list_of(ValueType::Int).accepts(&Value::List(vec![Value::from("x")])));
    }

    #[test]
    fn parse_text_builds_scalars_only() {
        assert_eq!(ValueType::Int.parse_text(" 42 ").and_then(|v| v.as_int()), Some(42));
        assert_eq!(ValueType::Bool.parse_text("true").and_then(|v| v.as_bool()), Some(true));
        assert!(ValueType::Int.parse_text("forty-two").is_none());
        assert!(ValueType::object("Money").parse_text("10 EUR").is_none());
        assert_eq!(Value::List(vec![Value::Int(1), Value::from("b")]).to_string(), "[1, b]");
    }
}
