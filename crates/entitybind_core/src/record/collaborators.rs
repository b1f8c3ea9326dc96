//! Contracts of the external collaborators a record talks to.
//!
//! Implementations live with the persistence backend and the owning
//! container; this crate only calls them.

use crate::model::identity::{Identity, TypeKey};
use crate::model::object::{AccessError, ObjectRef};
use crate::model::value::Value;
use crate::property::list::PropertyList;
use crate::record::buffered_record::BufferedRecord;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Entity lookup backed by the persistence layer.
pub trait EntitySource {
    /// Loads the entity of `type_key` with `identity`, `None` if it is gone.
    fn get_by_id(
        &self,
        type_key: &TypeKey,
        identity: &Identity,
    ) -> Result<Option<ObjectRef>, AccessError>;

    fn identity_of(&self, entity: &ObjectRef) -> Result<Option<Identity>, AccessError>;

    /// Reloads `entity`, `None` if it no longer exists.
    fn refresh(&self, entity: &ObjectRef) -> Result<Option<ObjectRef>, AccessError> {
        let Some(identity) = self.identity_of(entity)? else {
            return Ok(None);
        };
        let type_key = entity.type_key()?;
        self.get_by_id(&type_key, &identity)
    }
}

/// Materializes lazily fetched properties.
pub trait LazyLoadingDelegate {
    /// Returns an entity whose `property` is loaded; may be `entity` itself.
    fn ensure_loaded(&self, entity: &ObjectRef, property: &str) -> Result<ObjectRef, AccessError>;
}

/// Backend-specific recognition of lazy proxies.
pub trait LazyReferenceProbe {
    fn is_uninitialized_detached(&self, value: &Value) -> bool;
    fn is_lazy_initialization_failure(&self, error: &AccessError) -> bool;
}

/// Container that owns records and relays their changes.
pub trait RecordOwner {
    fn property_changed(&self, record: &BufferedRecord, property: &str);
    fn record_changed(&self, record: &BufferedRecord);
    /// Called when `refresh` finds the entity gone.
    fn record_removed(&self, record: &BufferedRecord);
}

/// Collaborators and the shared property list of one owning consumer.
///
/// Records hold it through an `Rc`; the consumer keeps its own handle to
/// register nested properties for every record at once.
pub struct RecordContext {
    properties: Rc<RefCell<PropertyList>>,
    entity_source: Option<Rc<dyn EntitySource>>,
    lazy_loading_delegate: Option<Rc<dyn LazyLoadingDelegate>>,
    lazy_reference_probe: Option<Rc<dyn LazyReferenceProbe>>,
    owner: Option<Rc<dyn RecordOwner>>,
}

impl RecordContext {
    pub fn new(properties: PropertyList) -> Self {
        Self {
            properties: Rc::new(RefCell::new(properties)),
            entity_source: None,
            lazy_loading_delegate: None,
            lazy_reference_probe: None,
            owner: None,
        }
    }

    pub fn with_entity_source(mut self, source: Rc<dyn EntitySource>) -> Self {
        self.entity_source = Some(source);
        self
    }

    pub fn with_lazy_loading_delegate(mut self, delegate: Rc<dyn LazyLoadingDelegate>) -> Self {
        self.lazy_loading_delegate = Some(delegate);
        self
    }

    pub fn with_lazy_reference_probe(mut self, probe: Rc<dyn LazyReferenceProbe>) -> Self {
        self.lazy_reference_probe = Some(probe);
        self
    }

    pub fn with_owner(mut self, owner: Rc<dyn RecordOwner>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Shared property list; records without a private copy read it live.
    pub fn properties(&self) -> Ref<'_, PropertyList> {
        self.properties.borrow()
    }

    pub fn properties_mut(&self) -> RefMut<'_, PropertyList> {
        self.properties.borrow_mut()
    }

    pub fn entity_source(&self) -> Option<&Rc<dyn EntitySource>> {
        self.entity_source.as_ref()
    }

    pub fn lazy_loading_delegate(&self) -> Option<&Rc<dyn LazyLoadingDelegate>> {
        self.lazy_loading_delegate.as_ref()
    }

    pub fn lazy_reference_probe(&self) -> Option<&Rc<dyn LazyReferenceProbe>> {
        self.lazy_reference_probe.as_ref()
    }

    pub fn owner(&self) -> Option<&Rc<dyn RecordOwner>> {
        self.owner.as_ref()
    }
}

impl Debug for RecordContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordContext")
            .field("properties", &self.properties)
            .field("entity_source", &self.entity_source.is_some())
            .field("lazy_loading_delegate", &self.lazy_loading_delegate.is_some())
            .field("lazy_reference_probe", &self.lazy_reference_probe.is_some())
            .field("owner", &self.owner.is_some())
            .finish()
    }
}
