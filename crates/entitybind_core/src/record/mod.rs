//! Buffered record layer.
//!
//! # Responsibility
//! - Wrap one live entity and expose its properties by name.
//! - Buffer edits behind read-through/write-through modes with commit/discard.
//! - Resolve lazily fetched values through external collaborators.
//!
//! # Invariants
//! - `write_through` implies `read_through`.
//! - `is_dirty()` is never true while the record is not persistent.
//! - A failed `set_value` leaves the entity and the cache unchanged.
//! - A failed `commit` leaves `modified` set and the mode unchanged.
//!
//! # See also
//! - `property::list` for path resolution and coercion.

use crate::metadata::MetadataError;
use crate::model::object::AccessError;
use crate::property::PropertyError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod buffered_property;
pub mod buffered_record;
pub mod collaborators;

pub type RecordResult<T> = Result<T, RecordError>;

/// Record-level errors surfaced to the caller.
#[derive(Debug)]
pub enum RecordError {
    UnknownProperty(String),
    NotNestable { path: String, segment: String },
    ReadOnly(String),
    /// Coercion failed, or the setter rejected the value.
    Conversion { property: String, source: AccessError },
    IllegalState(String),
    Metadata(MetadataError),
    /// A getter or an external collaborator failed.
    Access { context: String, source: AccessError },
}

impl RecordError {
    /// Stable short code for log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProperty(_) => "unknown_property",
            Self::NotNestable { .. } => "not_nestable",
            Self::ReadOnly(_) => "read_only",
            Self::Conversion { .. } => "conversion",
            Self::IllegalState(_) => "illegal_state",
            Self::Metadata(_) => "metadata",
            Self::Access { .. } => "access",
        }
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProperty(name) => write!(f, "unknown property: {name}"),
            Self::NotNestable { path, segment } => {
                write!(f, "property `{segment}` in `{path}` cannot be traversed")
            }
            Self::ReadOnly(name) => write!(f, "property is read-only: {name}"),
            Self::Conversion { property, source } => {
                write!(f, "cannot convert value for `{property}`: {source}")
            }
            Self::IllegalState(message) => write!(f, "illegal state: {message}"),
            Self::Metadata(err) => write!(f, "{err}"),
            Self::Access { context, source } => write!(f, "{context} failed: {source}"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Conversion { source, .. } | Self::Access { source, .. } => Some(source),
            Self::Metadata(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MetadataError> for RecordError {
    fn from(value: MetadataError) -> Self {
        Self::Metadata(value)
    }
}

impl From<PropertyError> for RecordError {
    fn from(value: PropertyError) -> Self {
        match value {
            PropertyError::UnknownProperty(name) => Self::UnknownProperty(name),
            PropertyError::NotNestable { path, segment } => Self::NotNestable { path, segment },
            PropertyError::IllegalState(message) => Self::IllegalState(message),
            PropertyError::Conversion { property, source } => {
                Self::Conversion { property, source }
            }
            PropertyError::Access { property, source } => Self::Access {
                context: format!("accessor `{property}`"),
                source,
            },
            PropertyError::Metadata(err) => Self::Metadata(err),
        }
    }
}
