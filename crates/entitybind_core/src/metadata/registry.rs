//! Per-type metadata registry.
//!
//! # Responsibility
//! - Build `EntityMetadata` from the property source exactly once per type.
//! - Break cyclic type graphs with forward placeholders that are back-filled
//!   when the referenced entry completes.
//!
//! # Invariants
//! - Construction is serialized by the registry lock; no reader observes a
//!   partially built entry.
//! - A self-referential descriptor resolves to the identical entry `Arc`.

use crate::metadata::descriptor::{NestedMetadata, PropertyDescriptor, PropertyKind};
use crate::metadata::source::{PropertySource, PropertySpec, TypeClass};
use crate::metadata::{DesignationRole, MetadataError, MetadataResult};
use crate::model::identity::TypeKey;
use crate::model::value::ValueType;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
struct Designations {
    identifier: Option<String>,
    version: Option<String>,
}

/// Registry entry describing one mapped type.
pub struct EntityMetadata {
    type_key: TypeKey,
    class: TypeClass,
    properties: BTreeMap<String, PropertyDescriptor>,
    designations: RwLock<Designations>,
}

impl EntityMetadata {
    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    pub fn class(&self) -> &TypeClass {
        &self.class
    }

    /// Entity name for entity types, `None` for embeddable and plain types.
    pub fn entity_name(&self) -> Option<&str> {
        match &self.class {
            TypeClass::Entity { entity_name } => Some(entity_name),
            _ => None,
        }
    }

    pub fn is_embeddable(&self) -> bool {
        self.class == TypeClass::Embeddable
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn persistent_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties
            .values()
            .filter(|property| property.kind().is_persistent())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn identifier_property_name(&self) -> Option<String> {
        self.read_designations().identifier
    }

    pub fn identifier_property(&self) -> Option<&PropertyDescriptor> {
        let name = self.identifier_property_name()?;
        self.properties.get(&name)
    }

    pub fn has_identifier_property(&self) -> bool {
        self.identifier_property_name().is_some()
    }

    /// Returns whether the identifier is an embedded (composite) value.
    pub fn has_embedded_identifier(&self) -> bool {
        self.identifier_property()
            .is_some_and(|property| property.kind() == PropertyKind::Embedded)
    }

    pub fn version_property_name(&self) -> Option<String> {
        self.read_designations().version
    }

    pub fn version_property(&self) -> Option<&PropertyDescriptor> {
        let name = self.version_property_name()?;
        self.properties.get(&name)
    }

    pub fn has_version_property(&self) -> bool {
        self.version_property_name().is_some()
    }

    /// Designates the identifier property; `None` clears the designation.
    ///
    /// # Errors
    /// - `InvalidPropertyDesignation` when `name` is unknown or names a
    ///   non-persistent property. The prior designation is kept.
    pub fn set_identifier_property(&self, name: Option<&str>) -> MetadataResult<()> {
        self.designate(DesignationRole::Identifier, name)
    }

    /// Designates the version property; `None` clears the designation.
    ///
    /// # Errors
    /// - Same rules as [`EntityMetadata::set_identifier_property`].
    pub fn set_version_property(&self, name: Option<&str>) -> MetadataResult<()> {
        self.designate(DesignationRole::Version, name)
    }

    fn designate(&self, role: DesignationRole, name: Option<&str>) -> MetadataResult<()> {
        if let Some(name) = name {
            self.validate_designation(role, name)?;
        }
        let mut designations = self
            .designations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = match role {
            DesignationRole::Identifier => &mut designations.identifier,
            DesignationRole::Version => &mut designations.version,
        };
        *slot = name.map(str::to_string);
        debug!(
            "event=metadata_designate module=metadata status=ok type={} role={} property={}",
            self.type_key,
            role.as_str(),
            name.unwrap_or("<none>")
        );
        Ok(())
    }

    fn validate_designation(&self, role: DesignationRole, name: &str) -> MetadataResult<()> {
        let reason = match self.properties.get(name) {
            None => "no such property",
            Some(property) if !property.kind().is_persistent() => "property is not persistent",
            Some(_) => return Ok(()),
        };
        Err(MetadataError::InvalidPropertyDesignation {
            type_key: self.type_key.clone(),
            role,
            property: name.to_string(),
            reason,
        })
    }

    fn read_designations(&self) -> Designations {
        self.designations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Debug for EntityMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let designations = self.read_designations();
        f.debug_struct("EntityMetadata")
            .field("type_key", &self.type_key)
            .field("class", &self.class)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("identifier", &designations.identifier)
            .field("version", &designations.version)
            .finish()
    }
}

/// Builds and caches `EntityMetadata` per mapped type.
///
/// The registry is an explicit instance; hold it in an `Arc` and share it
/// with every consumer that needs type descriptions.
pub struct MetadataRegistry {
    source: Arc<dyn PropertySource>,
    entries: Mutex<HashMap<TypeKey, Arc<EntityMetadata>>>,
}

impl MetadataRegistry {
    pub fn new(source: Arc<dyn PropertySource>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the metadata of `type_key`, building it on first use.
    ///
    /// Nested embedded/reference types are described in the same pass.
    ///
    /// # Errors
    /// - `UnresolvedType` when the source does not know the type, or knows it
    ///   only as a plain type without any property.
    /// - `DuplicateProperty`, `KindMismatch` and `InvalidPropertyDesignation`
    ///   when the source description is inconsistent.
    pub fn describe(&self, type_key: &TypeKey) -> MetadataResult<Arc<EntityMetadata>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(type_key) {
            return Ok(Arc::clone(entry));
        }

        let started_at = Instant::now();
        let mut session = BuildSession::new(self.source.as_ref(), &entries);
        let result = session.build(type_key);
        let staged = session.staged;

        match result {
            Ok(entry) => {
                let built = staged.len();
                entries.extend(staged);
                info!(
                    "event=metadata_describe module=metadata status=ok type={} built={} duration_ms={}",
                    type_key,
                    built,
                    started_at.elapsed().as_millis()
                );
                Ok(entry)
            }
            Err(err) => {
                warn!(
                    "event=metadata_describe module=metadata status=error type={} discarded={} error={}",
                    type_key,
                    staged.len(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Designates the identifier property of `entry`.
    pub fn set_identifier_property(
        &self,
        entry: &EntityMetadata,
        name: Option<&str>,
    ) -> MetadataResult<()> {
        entry.set_identifier_property(name)
    }

    /// Designates the version property of `entry`.
    pub fn set_version_property(
        &self,
        entry: &EntityMetadata,
        name: Option<&str>,
    ) -> MetadataResult<()> {
        entry.set_version_property(name)
    }

    pub fn is_described(&self, type_key: &TypeKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_key)
    }

    /// Returns the sorted keys of all cached entries.
    pub fn cached_types(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl Debug for MetadataRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("cached_types", &self.cached_types())
            .finish_non_exhaustive()
    }
}

type Slot = Arc<OnceCell<Weak<EntityMetadata>>>;

/// One top-level `describe` pass; staged entries are published only on success.
struct BuildSession<'a> {
    source: &'a dyn PropertySource,
    published: &'a HashMap<TypeKey, Arc<EntityMetadata>>,
    staged: HashMap<TypeKey, Arc<EntityMetadata>>,
    in_progress: HashMap<TypeKey, Slot>,
}

impl<'a> BuildSession<'a> {
    fn new(
        source: &'a dyn PropertySource,
        published: &'a HashMap<TypeKey, Arc<EntityMetadata>>,
    ) -> Self {
        Self {
            source,
            published,
            staged: HashMap::new(),
            in_progress: HashMap::new(),
        }
    }

    fn lookup(&self, type_key: &TypeKey) -> Option<Arc<EntityMetadata>> {
        self.published
            .get(type_key)
            .or_else(|| self.staged.get(type_key))
            .cloned()
    }

    fn build(&mut self, type_key: &TypeKey) -> MetadataResult<Arc<EntityMetadata>> {
        if let Some(entry) = self.lookup(type_key) {
            return Ok(entry);
        }

        let slot: Slot = Arc::new(OnceCell::new());
        self.in_progress.insert(type_key.clone(), Arc::clone(&slot));

        let info = self
            .source
            .type_info(type_key)
            .ok_or_else(|| MetadataError::UnresolvedType(type_key.clone()))?;
        if info.properties.is_empty() && info.class == TypeClass::Plain {
            return Err(MetadataError::UnresolvedType(type_key.clone()));
        }

        let mut properties = BTreeMap::new();
        let mut identifier: Option<String> = None;
        let mut version: Option<String> = None;
        for declared in info.properties {
            if properties.contains_key(&declared.name) {
                return Err(MetadataError::DuplicateProperty {
                    type_key: type_key.clone(),
                    property: declared.name,
                });
            }
            if declared.identifier {
                claim_marker(type_key, DesignationRole::Identifier, &mut identifier, &declared)?;
            }
            if declared.version {
                claim_marker(type_key, DesignationRole::Version, &mut version, &declared)?;
            }
            let nested = self.nested_for(type_key, &declared)?;
            let descriptor = PropertyDescriptor::new(
                declared.name.clone(),
                declared.value_type,
                declared.kind,
                declared.access,
                declared.fetch,
                declared.from_text,
                nested,
            );
            properties.insert(declared.name, descriptor);
        }

        let entry = Arc::new(EntityMetadata {
            type_key: type_key.clone(),
            class: info.class,
            properties,
            designations: RwLock::new(Designations::default()),
        });
        if let Some(name) = identifier.as_deref() {
            entry.set_identifier_property(Some(name))?;
        }
        if let Some(name) = version.as_deref() {
            entry.set_version_property(Some(name))?;
        }

        // Back-fill every placeholder handed out while this type was in progress.
        let _ = slot.set(Arc::downgrade(&entry));
        self.in_progress.remove(type_key);
        self.staged.insert(type_key.clone(), Arc::clone(&entry));
        debug!(
            "event=metadata_build module=metadata status=ok type={} properties={}",
            type_key,
            entry.len()
        );
        Ok(entry)
    }

    fn nested_for(
        &mut self,
        owner: &TypeKey,
        declared: &PropertySpec,
    ) -> MetadataResult<Option<NestedMetadata>> {
        let mismatch = || MetadataError::KindMismatch {
            type_key: owner.clone(),
            property: declared.name.clone(),
            kind: declared.kind,
        };
        let child = match declared.kind {
            PropertyKind::Embedded | PropertyKind::ToOneReference => match &declared.value_type {
                ValueType::Object(child) => child,
                _ => return Err(mismatch()),
            },
            PropertyKind::ElementCollection => match declared.value_type.object_key() {
                Some(child) => child,
                None => return Ok(None),
            },
            PropertyKind::ToManyReference => {
                if !declared.value_type.is_collection() {
                    return Err(mismatch());
                }
                return Ok(None);
            }
            PropertyKind::Simple | PropertyKind::NonPersistent => return Ok(None),
        };

        let slot = self.slot_for(child)?;
        Ok(Some(NestedMetadata::new(child.clone(), slot)))
    }

    fn slot_for(&mut self, type_key: &TypeKey) -> MetadataResult<Slot> {
        if let Some(slot) = self.in_progress.get(type_key) {
            return Ok(Arc::clone(slot));
        }
        let entry = match self.lookup(type_key) {
            Some(entry) => entry,
            None => self.build(type_key)?,
        };
        Ok(Arc::new(OnceCell::with_value(Arc::downgrade(&entry))))
    }
}

fn claim_marker(
    type_key: &TypeKey,
    role: DesignationRole,
    claimed: &mut Option<String>,
    declared: &PropertySpec,
) -> MetadataResult<()> {
    if claimed.is_some() {
        return Err(MetadataError::InvalidPropertyDesignation {
            type_key: type_key.clone(),
            role,
            property: declared.name.clone(),
            reason: "more than one property carries this marker",
        });
    }
    *claimed = Some(declared.name.clone());
    Ok(())
}
