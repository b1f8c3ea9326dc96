//! Property source contract.
//!
//! The property source is the external collaborator that knows how mapped
//! types are laid out. It is queried once per type by `MetadataRegistry`.

use crate::metadata::descriptor::{AccessHandle, FetchMode, PropertyKind, TextFactory};
use crate::model::identity::TypeKey;
use crate::model::value::ValueType;
use std::fmt::{Debug, Formatter};

/// Classification of a mapped type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeClass {
    /// Managed type with its own identity.
    Entity { entity_name: String },
    /// Identity-less type nested inside entities.
    Embeddable,
    /// Type that is neither; valid only when it exposes properties.
    Plain,
}

/// Raw description of one property as reported by the source.
#[derive(Clone)]
pub struct PropertySpec {
    pub name: String,
    pub value_type: ValueType,
    pub kind: PropertyKind,
    pub access: AccessHandle,
    pub fetch: FetchMode,
    /// Marks the identifier property.
    pub identifier: bool,
    /// Marks the optimistic-concurrency version property.
    pub version: bool,
    pub from_text: Option<TextFactory>,
}

impl PropertySpec {
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        kind: PropertyKind,
        access: AccessHandle,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            kind,
            access,
            fetch: FetchMode::Eager,
            identifier: false,
            version: false,
            from_text: None,
        }
    }

    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.fetch = FetchMode::Lazy;
        self
    }

    pub fn from_text(mut self, factory: TextFactory) -> Self {
        self.from_text = Some(factory);
        self
    }
}

impl Debug for PropertySpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("kind", &self.kind)
            .field("fetch", &self.fetch)
            .field("identifier", &self.identifier)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Raw description of one mapped type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub class: TypeClass,
    pub properties: Vec<PropertySpec>,
}

impl TypeInfo {
    pub fn entity(entity_name: impl Into<String>) -> Self {
        Self {
            class: TypeClass::Entity {
                entity_name: entity_name.into(),
            },
            properties: Vec::new(),
        }
    }

    pub fn embeddable() -> Self {
        Self {
            class: TypeClass::Embeddable,
            properties: Vec::new(),
        }
    }

    pub fn plain() -> Self {
        Self {
            class: TypeClass::Plain,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }
}

/// Black-box provider of per-type property descriptions.
pub trait PropertySource: Send + Sync {
    /// Returns the description of `type_key`, or `None` if the type is unknown.
    fn type_info(&self, type_key: &TypeKey) -> Option<TypeInfo>;
}
