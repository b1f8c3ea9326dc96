//! Type keys and entity identities.

use crate::model::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Name of one mapped type as known to the property source.
///
/// Cheap to clone; two keys are equal iff their names are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of one entity, derived from its identifier property.
///
/// Identities are immutable once assigned to a record and are used to key
/// entity-source lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    /// Identifier made of several values, e.g. an embedded identifier.
    Composite(Vec<Identity>),
}

impl Identity {
    /// Derives an identity from an identifier value.
    ///
    /// Returns `None` for `Null`, floating point, boolean and object values.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(Self::Int(*v)),
            Value::Text(v) => Some(Self::Text(v.clone())),
            Value::Uuid(v) => Some(Self::Uuid(*v)),
            Value::List(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Self::Composite),
            _ => None,
        }
    }

    /// Converts this identity back into a property value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(v) => Value::Int(*v),
            Self::Text(v) => Value::Text(v.clone()),
            Self::Uuid(v) => Value::Uuid(*v),
            Self::Composite(parts) => Value::List(parts.iter().map(Self::to_value).collect()),
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Composite(parts) => {
                f.write_str("(")?;
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
        }
    }
}
