//! Flat, dotted-path projection of a type's metadata.
//!
//! # Responsibility
//! - Expose base and registered nested property names of one root type.
//! - Read and write values through descriptor chains.
//! - Hold per-path writability overrides.
//!
//! # Invariants
//! - Reads through an absent intermediate value yield `Value::Null`.
//! - Writes through an absent intermediate value fail with `IllegalState`.
//! - Only `Embedded` and `ToOneReference` descriptors are traversable.

use crate::metadata::MetadataError;
use crate::model::object::AccessError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod list;

pub type PropertyResult<T> = Result<T, PropertyError>;

/// Path resolution and value access errors.
#[derive(Debug)]
pub enum PropertyError {
    UnknownProperty(String),
    NotNestable { path: String, segment: String },
    IllegalState(String),
    Conversion { property: String, source: AccessError },
    Access { property: String, source: AccessError },
    Metadata(MetadataError),
}

impl Display for PropertyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProperty(name) => write!(f, "unknown property: {name}"),
            Self::NotNestable { path, segment } => {
                write!(f, "property `{segment}` in `{path}` cannot be traversed")
            }
            Self::IllegalState(message) => write!(f, "illegal state: {message}"),
            Self::Conversion { property, source } => {
                write!(f, "cannot convert value for `{property}`: {source}")
            }
            Self::Access { property, source } => {
                write!(f, "accessor failed for `{property}`: {source}")
            }
            Self::Metadata(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PropertyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Conversion { source, .. } | Self::Access { source, .. } => Some(source),
            Self::Metadata(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MetadataError> for PropertyError {
    fn from(value: MetadataError) -> Self {
        Self::Metadata(value)
    }
}
