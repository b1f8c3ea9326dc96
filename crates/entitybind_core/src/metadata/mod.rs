//! Metadata model for mapped types.
//!
//! # Responsibility
//! - Describe every property of a mapped type once, via the property source.
//! - Track identifier and version designations per type.
//! - Resolve nested type metadata, including cyclic type graphs.
//!
//! # Invariants
//! - Registry entries are built at most once per type and shared read-only.
//! - A designated identifier/version always names a persistent descriptor of
//!   the same entry.
//! - Entries built during a failed `describe` are never published.

use crate::metadata::descriptor::PropertyKind;
use crate::model::identity::TypeKey;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod descriptor;
pub mod registry;
pub mod source;

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Which designation an identifier/version change targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignationRole {
    Identifier,
    Version,
}

impl DesignationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Version => "version",
        }
    }
}

/// Metadata construction and designation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The property source yielded nothing usable for this type.
    UnresolvedType(TypeKey),
    /// Identifier/version designation names an unusable property.
    InvalidPropertyDesignation {
        type_key: TypeKey,
        role: DesignationRole,
        property: String,
        reason: &'static str,
    },
    /// The property source reported the same name twice.
    DuplicateProperty { type_key: TypeKey, property: String },
    /// Property kind and declared type do not fit together.
    KindMismatch {
        type_key: TypeKey,
        property: String,
        kind: PropertyKind,
    },
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedType(type_key) => {
                write!(f, "type cannot be resolved to mapped metadata: {type_key}")
            }
            Self::InvalidPropertyDesignation {
                type_key,
                role,
                property,
                reason,
            } => write!(
                f,
                "invalid {} property `{property}` for {type_key}: {reason}",
                role.as_str()
            ),
            Self::DuplicateProperty { type_key, property } => {
                write!(f, "duplicate property `{property}` in {type_key}")
            }
            Self::KindMismatch {
                type_key,
                property,
                kind,
            } => write!(
                f,
                "property `{property}` of {type_key} is {} but its declared type does not fit",
                kind.as_str()
            ),
        }
    }
}

impl Error for MetadataError {}
