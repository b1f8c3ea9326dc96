//! Property list and value accessors.

use crate::metadata::descriptor::{PropertyDescriptor, PropertyKind};
use crate::metadata::registry::{EntityMetadata, MetadataRegistry};
use crate::model::identity::{Identity, TypeKey};
use crate::model::object::{AccessError, ObjectRef};
use crate::model::value::{Value, ValueType};
use crate::property::{PropertyError, PropertyResult};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

const PATH_SEPARATOR: char = '.';

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid path segment regex"));

/// Resolved descriptor chain for one (possibly dotted) property name.
#[derive(Debug, Clone)]
pub struct ValueAccessor {
    path: String,
    parents: Vec<PropertyDescriptor>,
    terminal: PropertyDescriptor,
}

impl ValueAccessor {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Descriptors of the traversed intermediate segments.
    pub fn parents(&self) -> &[PropertyDescriptor] {
        &self.parents
    }

    pub fn terminal(&self) -> &PropertyDescriptor {
        &self.terminal
    }

    pub fn is_nested(&self) -> bool {
        !self.parents.is_empty()
    }

    /// True if any descriptor on the path is lazily fetched.
    pub fn is_lazy(&self) -> bool {
        self.parents
            .iter()
            .chain(std::iter::once(&self.terminal))
            .any(PropertyDescriptor::is_lazy)
    }

    /// Returns the object owning the terminal property.
    ///
    /// `Ok(None)` means some intermediate value is absent.
    fn owner_of(&self, entity: &ObjectRef) -> Result<Option<ObjectRef>, AccessError> {
        let mut owner = entity.clone();
        for parent in &self.parents {
            match parent.read(&owner)? {
                Value::Object(next) => owner = next,
                Value::Null => return Ok(None),
                other => {
                    return Err(AccessError::new(format!(
                        "intermediate `{}` holds a non-object value `{other}`",
                        parent.name()
                    )))
                }
            }
        }
        Ok(Some(owner))
    }

    /// Reads the value; an absent intermediate yields `Value::Null`.
    pub fn get(&self, entity: &ObjectRef) -> PropertyResult<Value> {
        let owner = self.owner_of(entity).map_err(|source| self.access_error(source))?;
        match owner {
            Some(owner) => self
                .terminal
                .read(&owner)
                .map_err(|source| self.access_error(source)),
            None => Ok(Value::Null),
        }
    }

    /// Writes the value as-is.
    ///
    /// # Errors
    /// - `IllegalState` when an intermediate value is absent.
    /// - `Access` when an accessor or the setter fails.
    pub fn set(&self, entity: &ObjectRef, value: Value) -> PropertyResult<()> {
        let owner = self
            .owner_of(entity)
            .map_err(|source| self.access_error(source))?
            .ok_or_else(|| {
                PropertyError::IllegalState(format!(
                    "cannot set `{}` through an absent intermediate value",
                    self.path
                ))
            })?;
        self.terminal
            .write(&owner, value)
            .map_err(|source| self.access_error(source))
    }

    /// Coerces `value` to the declared terminal type.
    ///
    /// Values the declared type accepts pass unchanged. Otherwise the string
    /// representation is handed to the type's string constructor once.
    pub fn coerce(&self, value: Value) -> PropertyResult<Value> {
        let declared = self.terminal.value_type();
        if declared.accepts(&value) {
            return Ok(value);
        }
        let text = value.to_string();
        let converted = self
            .terminal
            .value_from_text(&text)
            .map_err(|source| self.conversion_error(source))?;
        if !declared.accepts(&converted) {
            return Err(self.conversion_error(AccessError::new(format!(
                "string constructor of {declared} produced an incompatible value"
            ))));
        }
        Ok(converted)
    }

    fn access_error(&self, source: AccessError) -> PropertyError {
        PropertyError::Access {
            property: self.path.clone(),
            source,
        }
    }

    fn conversion_error(&self, source: AccessError) -> PropertyError {
        PropertyError::Conversion {
            property: self.path.clone(),
            source,
        }
    }
}

/// Per-consumer projection of one registry entry.
///
/// Available names are the root type's base properties plus every nested
/// path registered with [`PropertyList::add_nested_property`].
#[derive(Clone)]
pub struct PropertyList {
    registry: Arc<MetadataRegistry>,
    root: Arc<EntityMetadata>,
    nested: BTreeSet<String>,
    writable_overrides: BTreeMap<String, bool>,
}

impl PropertyList {
    /// Builds a list for `type_key`, describing it on first use.
    pub fn new(registry: Arc<MetadataRegistry>, type_key: &TypeKey) -> PropertyResult<Self> {
        let root = registry.describe(type_key)?;
        Ok(Self {
            registry,
            root,
            nested: BTreeSet::new(),
            writable_overrides: BTreeMap::new(),
        })
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.root
    }

    pub fn type_key(&self) -> &TypeKey {
        self.root.type_key()
    }

    /// Resolves `name` to its descriptor chain.
    ///
    /// # Errors
    /// - `UnknownProperty` when a segment is malformed or absent.
    /// - `NotNestable` when a non-terminal segment cannot be traversed.
    pub fn resolve(&self, name: &str) -> PropertyResult<ValueAccessor> {
        let segments: Vec<&str> = name.split(PATH_SEPARATOR).collect();
        if segments.iter().any(|segment| !SEGMENT_RE.is_match(segment)) {
            return Err(PropertyError::UnknownProperty(name.to_string()));
        }
        let Some((last, intermediate)) = segments.split_last() else {
            return Err(PropertyError::UnknownProperty(name.to_string()));
        };

        let mut metadata = Arc::clone(&self.root);
        let mut parents = Vec::with_capacity(intermediate.len());
        for segment in intermediate {
            let descriptor = metadata
                .property(segment)
                .cloned()
                .ok_or_else(|| PropertyError::UnknownProperty(name.to_string()))?;
            if !descriptor.kind().is_nestable() {
                return Err(PropertyError::NotNestable {
                    path: name.to_string(),
                    segment: (*segment).to_string(),
                });
            }
            metadata = descriptor.nested_metadata().ok_or_else(|| {
                PropertyError::IllegalState(format!(
                    "nested metadata of `{segment}` is not available"
                ))
            })?;
            parents.push(descriptor);
        }

        let terminal = metadata
            .property(last)
            .cloned()
            .ok_or_else(|| PropertyError::UnknownProperty(name.to_string()))?;
        Ok(ValueAccessor {
            path: name.to_string(),
            parents,
            terminal,
        })
    }

    pub fn get_value(&self, entity: &ObjectRef, name: &str) -> PropertyResult<Value> {
        self.resolve(name)?.get(entity)
    }

    pub fn set_value(&self, entity: &ObjectRef, name: &str, value: Value) -> PropertyResult<()> {
        self.resolve(name)?.set(entity, value)
    }

    /// Registers a dotted path as an available property.
    ///
    /// Base property names are accepted and leave the list unchanged.
    pub fn add_nested_property(&mut self, path: &str) -> PropertyResult<()> {
        let accessor = self.resolve(path)?;
        if !accessor.is_nested() {
            return Ok(());
        }
        if self.nested.insert(path.to_string()) {
            debug!(
                "event=nested_property_add module=property status=ok type={} path={}",
                self.root.type_key(),
                path
            );
        }
        Ok(())
    }

    /// Unregisters a nested path.
    ///
    /// Returns `false` for base properties and unknown paths.
    pub fn remove_nested_property(&mut self, path: &str) -> bool {
        let removed = self.nested.remove(path);
        if removed {
            self.writable_overrides.remove(path);
            debug!(
                "event=nested_property_remove module=property status=ok type={} path={}",
                self.root.type_key(),
                path
            );
        }
        removed
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.root.property(name).is_some() || self.nested.contains(name)
    }

    /// Base names followed by nested paths, each group sorted.
    pub fn all_available_property_names(&self) -> Vec<String> {
        self.root
            .property_names()
            .map(str::to_string)
            .chain(self.nested.iter().cloned())
            .collect()
    }

    pub fn nested_property_names(&self) -> Vec<String> {
        self.nested.iter().cloned().collect()
    }

    /// Writability of `name`: the per-path override, else the descriptor's.
    pub fn is_writable(&self, name: &str) -> PropertyResult<bool> {
        let accessor = self.resolve(name)?;
        Ok(self
            .writable_overrides
            .get(name)
            .copied()
            .unwrap_or_else(|| accessor.terminal().is_writable()))
    }

    pub fn set_writable(&mut self, name: &str, writable: bool) -> PropertyResult<()> {
        self.resolve(name)?;
        self.writable_overrides.insert(name.to_string(), writable);
        Ok(())
    }

    pub fn clear_writable_override(&mut self, name: &str) -> bool {
        self.writable_overrides.remove(name).is_some()
    }

    pub fn is_lazy_loaded(&self, name: &str) -> PropertyResult<bool> {
        Ok(self.resolve(name)?.is_lazy())
    }

    pub fn is_collection(&self, name: &str) -> PropertyResult<bool> {
        let accessor = self.resolve(name)?;
        let terminal = accessor.terminal();
        Ok(terminal.kind().is_collection() || terminal.value_type().is_collection())
    }

    pub fn value_type(&self, name: &str) -> PropertyResult<ValueType> {
        Ok(self.resolve(name)?.terminal().value_type().clone())
    }

    /// Identity carried by the designated identifier property of `entity`.
    ///
    /// An embedded identifier yields `Identity::Composite` of the nested
    /// persistent properties, in name order.
    ///
    /// Returns `Ok(None)` when no identifier is designated or its value is absent.
    ///
    /// # Errors
    /// - `IllegalState` when an embedded identifier has an absent component.
    /// - `Conversion` when a value cannot form an identity.
    pub fn identity_of(&self, entity: &ObjectRef) -> PropertyResult<Option<Identity>> {
        let Some(identifier) = self.root.identifier_property() else {
            return Ok(None);
        };
        let value = read_identifier_part(identifier, entity, identifier.name())?;
        if value.is_null() {
            return Ok(None);
        }
        identity_from(identifier, &value, identifier.name()).map(Some)
    }
}

fn read_identifier_part(
    descriptor: &PropertyDescriptor,
    owner: &ObjectRef,
    path: &str,
) -> PropertyResult<Value> {
    descriptor
        .read(owner)
        .map_err(|source| PropertyError::Access {
            property: path.to_string(),
            source,
        })
}

fn identity_from(
    descriptor: &PropertyDescriptor,
    value: &Value,
    path: &str,
) -> PropertyResult<Identity> {
    if descriptor.kind() != PropertyKind::Embedded {
        return Identity::from_value(value).ok_or_else(|| PropertyError::Conversion {
            property: path.to_string(),
            source: AccessError::new(format!("value `{value}` cannot form an identity")),
        });
    }

    let owner = value.as_object().ok_or_else(|| PropertyError::Conversion {
        property: path.to_string(),
        source: AccessError::new("embedded identifier does not hold an object"),
    })?;
    let nested = descriptor.nested_metadata().ok_or_else(|| {
        PropertyError::IllegalState(format!("nested metadata of `{path}` is not available"))
    })?;
    let mut parts = Vec::with_capacity(nested.len());
    for component in nested.persistent_properties() {
        let component_path = format!("{path}{PATH_SEPARATOR}{}", component.name());
        let part = read_identifier_part(component, owner, &component_path)?;
        if part.is_null() {
            return Err(PropertyError::IllegalState(format!(
                "identifier component `{component_path}` is absent"
            )));
        }
        parts.push(identity_from(component, &part, &component_path)?);
    }
    Ok(Identity::Composite(parts))
}

impl Debug for PropertyList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyList")
            .field("type_key", self.root.type_key())
            .field("nested", &self.nested)
            .field("writable_overrides", &self.writable_overrides)
            .finish()
    }
}
