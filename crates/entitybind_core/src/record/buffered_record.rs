//! Buffered record state machine.

use crate::model::identity::{Identity, TypeKey};
use crate::model::object::{AccessError, ObjectRef};
use crate::model::value::{values_differ, Value, ValueType};
use crate::property::list::{PropertyList, ValueAccessor};
use crate::property::PropertyError;
use crate::record::buffered_property::BufferedProperty;
use crate::record::collaborators::RecordContext;
use crate::record::{RecordError, RecordResult};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Buffering mode; `write_through` implies `read_through`, so three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// Reads and writes go straight to the entity.
    #[default]
    PassThrough,
    /// Writes are cached; read-through still on.
    WriteBuffered,
    /// Reads and writes both use the cache.
    FullyBuffered,
}

impl BufferMode {
    pub fn read_through(self) -> bool {
        !matches!(self, Self::FullyBuffered)
    }

    pub fn write_through(self) -> bool {
        matches!(self, Self::PassThrough)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::WriteBuffered => "write_buffered",
            Self::FullyBuffered => "fully_buffered",
        }
    }
}

/// Result of [`BufferedRecord::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Record is not persistent; nothing was reloaded.
    NotPersistent,
    /// Entity was reloaded and replaced.
    Refreshed,
    /// Entity no longer exists; record is no longer persistent.
    Removed,
}

/// Notification that a property value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChangeEvent {
    pub property: String,
}

pub type ValueChangeListener = Rc<dyn Fn(&ValueChangeEvent)>;

/// Handle returned when registering a listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct PropertyState {
    cached: Option<Value>,
    listeners: Vec<(ListenerId, ValueChangeListener)>,
}

/// One live entity exposed as an editable, optionally buffered record.
pub struct BufferedRecord {
    context: Rc<RecordContext>,
    entity: ObjectRef,
    identity: Option<Identity>,
    local_properties: Option<PropertyList>,
    states: BTreeMap<String, PropertyState>,
    mode: BufferMode,
    persistent: bool,
    modified: bool,
    dirty: bool,
    deleted: bool,
    next_listener_id: u64,
}

impl BufferedRecord {
    /// Wraps `entity`; `persistent` only holds when an identity is supplied.
    pub fn new(
        context: Rc<RecordContext>,
        entity: ObjectRef,
        identity: Option<Identity>,
        persistent: bool,
    ) -> Self {
        let persistent = persistent && identity.is_some();
        Self {
            context,
            entity,
            identity,
            local_properties: None,
            states: BTreeMap::new(),
            mode: BufferMode::PassThrough,
            persistent,
            modified: false,
            dirty: false,
            deleted: false,
            next_listener_id: 0,
        }
    }

    /// Wraps a not-yet-persisted entity.
    pub fn transient(context: Rc<RecordContext>, entity: ObjectRef) -> Self {
        Self::new(context, entity, None, false)
    }

    /// Wraps a stored entity, deriving the identity from its identifier property.
    pub fn from_persistent(context: Rc<RecordContext>, entity: ObjectRef) -> RecordResult<Self> {
        let identity = context.properties().identity_of(&entity)?;
        Ok(Self::new(context, entity, identity, true))
    }

    pub fn context(&self) -> &Rc<RecordContext> {
        &self.context
    }

    pub fn entity(&self) -> &ObjectRef {
        &self.entity
    }

    /// Replaces the wrapped entity; the previous instance is dropped.
    pub fn replace_entity(&mut self, entity: ObjectRef) {
        self.entity = entity;
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Assigns the identity once, e.g. after the entity was first stored.
    pub fn assign_identity(&mut self, identity: Identity) -> RecordResult<()> {
        if let Some(current) = &self.identity {
            return Err(RecordError::IllegalState(format!(
                "record identity is already assigned: {current}"
            )));
        }
        self.identity = Some(identity);
        Ok(())
    }

    pub fn type_key(&self) -> TypeKey {
        self.with_properties(|list| list.type_key().clone())
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn is_read_through(&self) -> bool {
        self.mode.read_through()
    }

    pub fn is_write_through(&self) -> bool {
        self.mode.write_through()
    }

    pub fn is_buffered(&self) -> bool {
        !self.is_read_through() && !self.is_write_through()
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent && self.identity.is_some();
        if !self.persistent {
            self.dirty = false;
        }
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_dirty(&self) -> bool {
        self.persistent && self.dirty
    }

    pub fn is_deleted(&self) -> bool {
        self.persistent && !self.is_buffered() && self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// Available property names: base names, then registered nested paths.
    pub fn property_names(&self) -> Vec<String> {
        self.with_properties(PropertyList::all_available_property_names)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.with_properties(|list| list.has_property(name))
    }

    /// Returns the property view for `name`, instantiating it on first use.
    ///
    /// # Errors
    /// - `UnknownProperty` when `name` is not an available property.
    pub fn property(&mut self, name: &str) -> RecordResult<BufferedProperty<'_>> {
        self.instantiate(name)?;
        Ok(BufferedProperty::new(self, name))
    }

    pub fn get_value(&mut self, name: &str) -> RecordResult<Value> {
        self.property(name)?.get_value()
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> RecordResult<()> {
        self.property(name)?.set_value(value)
    }

    /// Registers a nested path on this record only.
    pub fn add_nested_property(&mut self, path: &str) -> RecordResult<()> {
        self.local_properties_mut().add_nested_property(path)?;
        Ok(())
    }

    /// Unregisters a nested path from this record; base names return `false`.
    pub fn remove_nested_property(&mut self, path: &str) -> bool {
        if !path.contains('.') {
            return false;
        }
        let removed = self.local_properties_mut().remove_nested_property(path);
        if removed {
            self.states.remove(path);
        }
        removed
    }

    /// Overrides the writability of `name` on this record only.
    pub fn set_property_writable(&mut self, name: &str, writable: bool) -> RecordResult<()> {
        self.local_properties_mut().set_writable(name, writable)?;
        Ok(())
    }

    /// Registers `listener` on every available property.
    pub fn add_value_change_listener(
        &mut self,
        listener: impl Fn(&ValueChangeEvent) + 'static,
    ) -> RecordResult<ListenerId> {
        let listener: ValueChangeListener = Rc::new(listener);
        let id = self.allocate_listener_id();
        for name in self.property_names() {
            self.instantiate(&name)?;
            if let Some(state) = self.states.get_mut(&name) {
                state.listeners.push((id, Rc::clone(&listener)));
            }
        }
        Ok(id)
    }

    /// Removes a listener from every property; returns whether any was found.
    pub fn remove_value_change_listener(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        for state in self.states.values_mut() {
            let before = state.listeners.len();
            state.listeners.retain(|(listener_id, _)| *listener_id != id);
            removed |= state.listeners.len() != before;
        }
        removed
    }

    /// Turns write-through on or off.
    ///
    /// Turning it off snapshots the real value of every instantiated property.
    /// Turning it on commits first and restores read-through; on commit
    /// failure the mode is unchanged.
    pub fn set_write_through(&mut self, write_through: bool) -> RecordResult<()> {
        if write_through == self.is_write_through() {
            return Ok(());
        }
        if write_through {
            self.commit()?;
            for state in self.states.values_mut() {
                state.cached = None;
            }
            self.transition(BufferMode::PassThrough);
        } else {
            for name in self.instantiated_names() {
                self.cache_real_value(&name)?;
            }
            self.transition(BufferMode::WriteBuffered);
        }
        Ok(())
    }

    /// Turns read-through on or off; off requires write-through to be off.
    pub fn set_read_through(&mut self, read_through: bool) -> RecordResult<()> {
        if read_through == self.is_read_through() {
            return Ok(());
        }
        if !read_through && self.is_write_through() {
            return Err(RecordError::IllegalState(
                "read-through can only be turned off while write-through is off".to_string(),
            ));
        }
        self.transition(if read_through {
            BufferMode::WriteBuffered
        } else {
            BufferMode::FullyBuffered
        });
        Ok(())
    }

    /// Toggles write-through and read-through together.
    pub fn set_buffered(&mut self, buffered: bool) -> RecordResult<()> {
        self.set_write_through(!buffered)?;
        self.set_read_through(!buffered)
    }

    /// Applies cached edits to the entity.
    ///
    /// No-op while write-through. Read-only properties are skipped and
    /// re-cached from the entity. Only values that differ from the entity are
    /// written. Stops at the first failure, so earlier properties may already
    /// be applied; `modified` stays set in that case.
    pub fn commit(&mut self) -> RecordResult<()> {
        if self.is_write_through() {
            return Ok(());
        }
        let mut applied = 0usize;
        for name in self.instantiated_names() {
            if self.is_property_read_only(&name)? {
                self.cache_real_value(&name)?;
                continue;
            }
            let cached = self.cached_value(&name);
            let real = self.real_value(&name)?;
            if !values_differ(&real, &cached) {
                continue;
            }
            if let Err(err) = self.set_real_value(&name, cached) {
                warn!(
                    "event=record_commit module=record status=error type={} property={} applied={} error_code={}",
                    self.type_key(),
                    name,
                    applied,
                    err.code()
                );
                return Err(err);
            }
            applied += 1;
        }
        self.modified = false;
        info!(
            "event=record_commit module=record status=ok type={} applied={}",
            self.type_key(),
            applied
        );
        self.notify_record_changed();
        Ok(())
    }

    /// Drops cached edits and re-reads every instantiated property.
    ///
    /// No-op while write-through. Fires a change event only for properties
    /// whose cached value differed from the entity.
    pub fn discard(&mut self) -> RecordResult<()> {
        if self.is_write_through() {
            return Ok(());
        }
        let mut changed = 0usize;
        for name in self.instantiated_names() {
            let real = self.real_value(&name)?;
            let differs = values_differ(&real, &self.cached_value(&name));
            if let Some(state) = self.states.get_mut(&name) {
                state.cached = Some(real);
            }
            if differs {
                changed += 1;
                self.fire_value_change(&name);
            }
        }
        self.modified = false;
        info!(
            "event=record_discard module=record status=ok type={} changed={}",
            self.type_key(),
            changed
        );
        Ok(())
    }

    /// Flags the entity as changed outside the record.
    ///
    /// # Errors
    /// - `IllegalState` while write-through is off.
    pub fn mark_dirty(&mut self) -> RecordResult<()> {
        if !self.is_write_through() {
            return Err(RecordError::IllegalState(
                "cannot mark dirty while edits are buffered and not yet applied".to_string(),
            ));
        }
        self.dirty = true;
        self.notify_record_changed();
        Ok(())
    }

    /// Reloads the entity from the entity source.
    ///
    /// A missing entity ends persistence for this record and notifies the
    /// owner; it is not an error.
    pub fn refresh(&mut self) -> RecordResult<RefreshOutcome> {
        // `persistent` is only ever set together with an identity.
        let Some(identity) = self.identity.clone().filter(|_| self.persistent) else {
            return Ok(RefreshOutcome::NotPersistent);
        };
        let Some(source) = self.context.entity_source().cloned() else {
            return Err(RecordError::IllegalState(
                "refresh requires an entity source".to_string(),
            ));
        };
        let type_key = self.type_key();
        let fresh = source
            .get_by_id(&type_key, &identity)
            .map_err(|err| RecordError::Access {
                context: format!("refresh of {type_key}"),
                source: err,
            })?;

        let Some(entity) = fresh else {
            self.persistent = false;
            self.dirty = false;
            info!(
                "event=record_removed module=record status=ok type={} identity={}",
                type_key,
                self.identity_label()
            );
            if let Some(owner) = self.context.owner().cloned() {
                owner.record_removed(self);
            }
            return Ok(RefreshOutcome::Removed);
        };

        self.replace_entity(entity);
        if self.is_dirty() {
            self.discard()?;
        }
        self.dirty = false;
        for name in self.instantiated_names() {
            self.fire_value_change(&name);
        }
        info!(
            "event=record_refresh module=record status=ok type={} identity={}",
            type_key,
            self.identity_label()
        );
        Ok(RefreshOutcome::Refreshed)
    }

    pub(crate) fn instantiate(&mut self, name: &str) -> RecordResult<()> {
        if self.states.contains_key(name) {
            return Ok(());
        }
        if !self.has_property(name) {
            return Err(RecordError::UnknownProperty(name.to_string()));
        }
        self.states.insert(name.to_string(), PropertyState::default());
        if !self.is_write_through() {
            if let Err(err) = self.cache_real_value(name) {
                self.states.remove(name);
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) fn property_value(&mut self, name: &str) -> RecordResult<Value> {
        if self.mode == BufferMode::PassThrough {
            return self.real_value(name);
        }
        Ok(self.cached_value(name))
    }

    pub(crate) fn set_property_value(&mut self, name: &str, value: Value) -> RecordResult<()> {
        if self.is_property_read_only(name)? {
            return Err(RecordError::ReadOnly(name.to_string()));
        }
        let value = self.accessor(name)?.coerce(value)?;
        if self.is_write_through() {
            self.set_real_value(name, value)?;
            if let Some(owner) = self.context.owner().cloned() {
                owner.property_changed(self, name);
            }
        } else {
            if let Some(state) = self.states.get_mut(name) {
                state.cached = Some(value);
            }
            self.modified = true;
        }
        self.fire_value_change(name);
        Ok(())
    }

    pub(crate) fn property_type(&self, name: &str) -> RecordResult<ValueType> {
        Ok(self.with_properties(|list| list.value_type(name))?)
    }

    pub(crate) fn is_property_read_only(&self, name: &str) -> RecordResult<bool> {
        Ok(!self.with_properties(|list| list.is_writable(name))?)
    }

    pub(crate) fn add_property_listener(
        &mut self,
        name: &str,
        listener: ValueChangeListener,
    ) -> ListenerId {
        let id = self.allocate_listener_id();
        self.states
            .entry(name.to_string())
            .or_default()
            .listeners
            .push((id, listener));
        id
    }

    pub(crate) fn remove_property_listener(&mut self, name: &str, id: ListenerId) -> bool {
        let Some(state) = self.states.get_mut(name) else {
            return false;
        };
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    pub(crate) fn fire_value_change(&self, name: &str) {
        let Some(state) = self.states.get(name) else {
            return;
        };
        if state.listeners.is_empty() {
            return;
        }
        let listeners: Vec<ValueChangeListener> = state
            .listeners
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        let event = ValueChangeEvent {
            property: name.to_string(),
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// Reads the live entity value, loading lazy content first.
    fn real_value(&mut self, name: &str) -> RecordResult<Value> {
        self.ensure_loaded(name)?;
        Ok(self.accessor(name)?.get(&self.entity)?)
    }

    fn set_real_value(&mut self, name: &str, value: Value) -> RecordResult<()> {
        self.ensure_loaded(name)?;
        let accessor = self.accessor(name)?;
        accessor.set(&self.entity, value).map_err(|err| match err {
            PropertyError::Access { property, source } => {
                RecordError::Conversion { property, source }
            }
            other => other.into(),
        })?;
        self.dirty = true;
        Ok(())
    }

    /// Loads a lazily fetched property when the probe detects an
    /// uninitialized, detached value on any segment of its path.
    fn ensure_loaded(&mut self, name: &str) -> RecordResult<()> {
        let Some(delegate) = self.context.lazy_loading_delegate().cloned() else {
            return Ok(());
        };
        if !self.with_properties(|list| list.is_lazy_loaded(name))? {
            return Ok(());
        }
        let probe = self.context.lazy_reference_probe().cloned();
        let is_detached = |value: &Value| {
            probe
                .as_ref()
                .is_some_and(|probe| probe.is_uninitialized_detached(value))
        };
        let is_failure = |err: &AccessError| {
            probe
                .as_ref()
                .is_some_and(|probe| probe.is_lazy_initialization_failure(err))
        };

        let accessor = self.accessor(name)?;
        let mut owner = self.entity.clone();
        let mut should_load = false;
        for parent in accessor.parents() {
            match parent.read(&owner) {
                Ok(value) if is_detached(&value) => {
                    should_load = true;
                    break;
                }
                Ok(Value::Object(next)) => owner = next,
                Err(err) if is_failure(&err) => {
                    should_load = true;
                    break;
                }
                // Absent links and other failures surface on the real read.
                Ok(_) | Err(_) => return Ok(()),
            }
        }

        if !should_load {
            should_load = match accessor.terminal().read(&owner) {
                Ok(Value::Null) => false,
                Ok(value) => {
                    let detached = is_detached(&value);
                    let collection = self.with_properties(|list| list.is_collection(name))?;
                    if !collection {
                        detached
                    } else {
                        match value.initialize() {
                            Ok(()) => detached,
                            Err(err) if is_failure(&err) => true,
                            Err(err) => {
                                return Err(RecordError::Access {
                                    context: format!("initializing `{name}`"),
                                    source: err,
                                })
                            }
                        }
                    }
                }
                Err(err) if is_failure(&err) => true,
                Err(err) => {
                    return Err(RecordError::Access {
                        context: format!("accessor `{name}`"),
                        source: err,
                    })
                }
            };
        }
        if !should_load {
            return Ok(());
        }

        let loaded = delegate
            .ensure_loaded(&self.entity, name)
            .map_err(|source| RecordError::Access {
                context: format!("lazy load of `{name}`"),
                source,
            })?;
        let replaced = !loaded.ptr_eq(&self.entity);
        self.replace_entity(loaded);
        info!(
            "event=lazy_load module=record status=ok type={} property={} replaced={}",
            self.type_key(),
            name,
            replaced
        );
        Ok(())
    }

    fn cache_real_value(&mut self, name: &str) -> RecordResult<()> {
        let real = self.real_value(name)?;
        if let Some(state) = self.states.get_mut(name) {
            state.cached = Some(real);
        }
        Ok(())
    }

    fn cached_value(&self, name: &str) -> Value {
        self.states
            .get(name)
            .and_then(|state| state.cached.clone())
            .unwrap_or_default()
    }

    fn accessor(&self, name: &str) -> RecordResult<ValueAccessor> {
        Ok(self.with_properties(|list| list.resolve(name))?)
    }

    fn instantiated_names(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }

    fn with_properties<R>(&self, f: impl FnOnce(&PropertyList) -> R) -> R {
        match &self.local_properties {
            Some(list) => f(list),
            None => f(&self.context.properties()),
        }
    }

    /// Private projection, copied from the shared list on first mutation.
    fn local_properties_mut(&mut self) -> &mut PropertyList {
        let context = &self.context;
        self.local_properties
            .get_or_insert_with(|| context.properties().clone())
    }

    fn allocate_listener_id(&mut self) -> ListenerId {
        self.next_listener_id += 1;
        ListenerId(self.next_listener_id)
    }

    fn transition(&mut self, next: BufferMode) {
        debug!(
            "event=record_mode module=record status=ok type={} from={} to={}",
            self.type_key(),
            self.mode.as_str(),
            next.as_str()
        );
        self.mode = next;
    }

    fn notify_record_changed(&self) {
        if let Some(owner) = self.context.owner().cloned() {
            owner.record_changed(self);
        }
    }

    fn identity_label(&self) -> String {
        self.identity
            .as_ref()
            .map_or_else(|| "<none>".to_string(), Identity::to_string)
    }
}

impl Debug for BufferedRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedRecord")
            .field("entity", &self.entity)
            .field("identity", &self.identity)
            .field("mode", &self.mode)
            .field("persistent", &self.persistent)
            .field("modified", &self.modified)
            .field("dirty", &self.is_dirty())
            .field("deleted", &self.deleted)
            .field("instantiated", &self.states.keys().collect::<Vec<_>>())
            .finish()
    }
}
