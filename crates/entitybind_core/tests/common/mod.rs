#![allow(dead_code)]

use entitybind_core::{
    AccessError, AccessHandle, AccessStyle, BufferedRecord, EntitySource, Identity,
    LazyLoadingDelegate, LazyReferenceProbe, MappedObject, MetadataRegistry, ObjectRef,
    PropertyKind, PropertyList, PropertySource, PropertySpec, RecordContext, RecordOwner,
    TypeInfo, TypeKey, Value, ValueType,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Address {
    pub street: String,
    pub city: String,
}

impl MappedObject for Address {
    fn type_key(&self) -> TypeKey {
        TypeKey::new("Address")
    }
}

#[derive(Debug, Clone)]
pub enum Tasks {
    Detached,
    Loaded(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Person {
    pub id: i64,
    pub version: i64,
    pub name: String,
    pub age: i64,
    pub manager: Option<ObjectRef>,
    pub address: Option<ObjectRef>,
    pub children: Vec<ObjectRef>,
    pub mentor: Option<ObjectRef>,
    pub tasks: Tasks,
}

impl Person {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            version: 1,
            name: name.to_string(),
            age: 30,
            manager: None,
            address: None,
            children: Vec::new(),
            mentor: None,
            tasks: Tasks::Loaded(Vec::new()),
        }
    }
}

impl MappedObject for Person {
    fn type_key(&self) -> TypeKey {
        TypeKey::new("Person")
    }

    fn to_text(&self) -> String {
        self.name.clone()
    }
}

/// Stand-in for an uninitialized proxy left behind by a closed session.
#[derive(Debug)]
pub struct DetachedProxy;

impl MappedObject for DetachedProxy {
    fn type_key(&self) -> TypeKey {
        TypeKey::new("Person")
    }
}

/// Marker cause carried by lazy collection failures.
#[derive(Debug)]
pub struct LazyInitFailure;

impl Display for LazyInitFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("no session to initialize collection")
    }
}

impl std::error::Error for LazyInitFailure {}

/// Lazy collection that fails on first access.
#[derive(Debug)]
pub struct DetachedTasks;

impl MappedObject for DetachedTasks {
    fn type_key(&self) -> TypeKey {
        TypeKey::new("TaskList")
    }

    fn initialize(&self) -> Result<(), AccessError> {
        Err(AccessError::with_source("failed to lazily initialize tasks", LazyInitFailure))
    }
}

pub fn person_ref(id: i64, name: &str) -> ObjectRef {
    ObjectRef::new(Person::new(id, name))
}

pub fn address_ref(street: &str, city: &str) -> ObjectRef {
    ObjectRef::new(Address {
        street: street.to_string(),
        city: city.to_string(),
    })
}

pub fn person_name(entity: &ObjectRef) -> Option<String> {
    entity.read(|p: &Person| p.name.clone())
}

fn text(value: Value) -> Result<String, AccessError> {
    match value {
        Value::Text(text) => Ok(text),
        Value::Null => Ok(String::new()),
        other => Err(AccessError::new(format!("expected text, got `{other}`"))),
    }
}

fn int(value: Value) -> Result<i64, AccessError> {
    value
        .as_int()
        .ok_or_else(|| AccessError::new(format!("expected int, got `{value}`")))
}

fn object(value: Value) -> Result<Option<ObjectRef>, AccessError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(object) => Ok(Some(object)),
        other => Err(AccessError::new(format!("expected object, got `{other}`"))),
    }
}

fn person_info() -> TypeInfo {
    TypeInfo::entity("Person")
        .with_property(
            PropertySpec::new(
                "id",
                ValueType::Int,
                PropertyKind::Simple,
                AccessHandle::read_write(
                    AccessStyle::Field,
                    |p: &Person| Ok(Value::Int(p.id)),
                    |p: &mut Person, v| {
                        p.id = int(v)?;
                        Ok(())
                    },
                ),
            )
            .identifier(),
        )
        .with_property(
            PropertySpec::new(
                "version",
                ValueType::Int,
                PropertyKind::Simple,
                AccessHandle::read_only(AccessStyle::Field, |p: &Person| Ok(Value::Int(p.version))),
            )
            .version(),
        )
        .with_property(PropertySpec::new(
            "name",
            ValueType::Text,
            PropertyKind::Simple,
            AccessHandle::read_write(
                AccessStyle::Method,
                |p: &Person| Ok(Value::text(p.name.clone())),
                |p: &mut Person, v| {
                    let name = text(v)?;
                    if name.is_empty() {
                        return Err(AccessError::new("name cannot be empty"));
                    }
                    p.name = name;
                    Ok(())
                },
            ),
        ))
        .with_property(PropertySpec::new(
            "age",
            ValueType::Int,
            PropertyKind::Simple,
            AccessHandle::read_write(
                AccessStyle::Field,
                |p: &Person| Ok(Value::Int(p.age)),
                |p: &mut Person, v| {
                    p.age = int(v)?;
                    Ok(())
                },
            ),
        ))
        .with_property(PropertySpec::new(
            "manager",
            ValueType::object("Person"),
            PropertyKind::ToOneReference,
            AccessHandle::read_write(
                AccessStyle::Field,
                |p: &Person| Ok(Value::from(p.manager.clone())),
                |p: &mut Person, v| {
                    p.manager = object(v)?;
                    Ok(())
                },
            ),
        ))
        .with_property(PropertySpec::new(
            "address",
            ValueType::object("Address"),
            PropertyKind::Embedded,
            AccessHandle::read_write(
                AccessStyle::Field,
                |p: &Person| Ok(Value::from(p.address.clone())),
                |p: &mut Person, v| {
                    p.address = object(v)?;
                    Ok(())
                },
            ),
        ))
        .with_property(PropertySpec::new(
            "children",
            ValueType::list_of(ValueType::object("Person")),
            PropertyKind::ToManyReference,
            AccessHandle::read_only(AccessStyle::Field, |p: &Person| {
                Ok(Value::List(
                    p.children.iter().cloned().map(Value::Object).collect(),
                ))
            }),
        ))
        .with_property(
            PropertySpec::new(
                "mentor",
                ValueType::object("Person"),
                PropertyKind::ToOneReference,
                AccessHandle::read_write(
                    AccessStyle::Field,
                    |p: &Person| Ok(Value::from(p.mentor.clone())),
                    |p: &mut Person, v| {
                        p.mentor = object(v)?;
                        Ok(())
                    },
                ),
            )
            .lazy(),
        )
        .with_property(
            PropertySpec::new(
                "tasks",
                ValueType::list_of(ValueType::Text),
                PropertyKind::ElementCollection,
                AccessHandle::read_only(AccessStyle::Field, |p: &Person| {
                    Ok(match &p.tasks {
                        Tasks::Detached => Value::Object(ObjectRef::new(DetachedTasks)),
                        Tasks::Loaded(items) => {
                            Value::List(items.iter().map(|t| Value::text(t.clone())).collect())
                        }
                    })
                }),
            )
            .lazy(),
        )
        .with_property(PropertySpec::new(
            "display_name",
            ValueType::Text,
            PropertyKind::NonPersistent,
            AccessHandle::read_only(AccessStyle::Method, |p: &Person| {
                Ok(Value::text(p.name.to_uppercase()))
            }),
        ))
}

fn address_info() -> TypeInfo {
    TypeInfo::embeddable()
        .with_property(PropertySpec::new(
            "street",
            ValueType::Text,
            PropertyKind::Simple,
            AccessHandle::read_write(
                AccessStyle::Field,
                |a: &Address| Ok(Value::text(a.street.clone())),
                |a: &mut Address, v| {
                    a.street = text(v)?;
                    Ok(())
                },
            ),
        ))
        .with_property(PropertySpec::new(
            "city",
            ValueType::Text,
            PropertyKind::Simple,
            AccessHandle::read_write(
                AccessStyle::Field,
                |a: &Address| Ok(Value::text(a.city.clone())),
                |a: &mut Address, v| {
                    a.city = text(v)?;
                    Ok(())
                },
            ),
        ))
}

/// Composite key embedded as the identifier of `Order`.
#[derive(Debug, Clone)]
pub struct OrderKey {
    pub region: Option<String>,
    pub number: i64,
}

impl MappedObject for OrderKey {
    fn type_key(&self) -> TypeKey {
        TypeKey::new("OrderKey")
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub key: ObjectRef,
    pub total: i64,
}

impl MappedObject for Order {
    fn type_key(&self) -> TypeKey {
        TypeKey::new("Order")
    }
}

pub fn order_ref(region: Option<&str>, number: i64) -> ObjectRef {
    ObjectRef::new(Order {
        key: ObjectRef::new(OrderKey {
            region: region.map(str::to_string),
            number,
        }),
        total: 0,
    })
}

fn order_info() -> TypeInfo {
    TypeInfo::entity("Order")
        .with_property(
            PropertySpec::new(
                "key",
                ValueType::object("OrderKey"),
                PropertyKind::Embedded,
                AccessHandle::read_only(AccessStyle::Field, |o: &Order| {
                    Ok(Value::Object(o.key.clone()))
                }),
            )
            .identifier(),
        )
        .with_property(PropertySpec::new(
            "total",
            ValueType::Int,
            PropertyKind::Simple,
            AccessHandle::read_write(
                AccessStyle::Field,
                |o: &Order| Ok(Value::Int(o.total)),
                |o: &mut Order, v| {
                    o.total = int(v)?;
                    Ok(())
                },
            ),
        ))
}

fn order_key_info() -> TypeInfo {
    TypeInfo::embeddable()
        .with_property(PropertySpec::new(
            "region",
            ValueType::Text,
            PropertyKind::Simple,
            AccessHandle::read_only(AccessStyle::Field, |k: &OrderKey| {
                Ok(Value::from(k.region.clone()))
            }),
        ))
        .with_property(PropertySpec::new(
            "number",
            ValueType::Int,
            PropertyKind::Simple,
            AccessHandle::read_only(AccessStyle::Field, |k: &OrderKey| Ok(Value::Int(k.number))),
        ))
}

/// Property source for the `Person`/`Address` and `Order`/`OrderKey` fixture models.
pub struct FixtureSource;

impl PropertySource for FixtureSource {
    fn type_info(&self, type_key: &TypeKey) -> Option<TypeInfo> {
        match type_key.as_str() {
            "Person" => Some(person_info()),
            "Address" => Some(address_info()),
            "Order" => Some(order_info()),
            "OrderKey" => Some(order_key_info()),
            _ => None,
        }
    }
}

pub fn registry() -> Arc<MetadataRegistry> {
    Arc::new(MetadataRegistry::new(Arc::new(FixtureSource)))
}

pub fn person_list() -> PropertyList {
    PropertyList::new(registry(), &TypeKey::new("Person")).expect("describe Person")
}

pub fn order_list() -> PropertyList {
    PropertyList::new(registry(), &TypeKey::new("Order")).expect("describe Order")
}

/// In-memory entity store keyed by identity.
#[derive(Default)]
pub struct MemoryEntitySource {
    entities: RefCell<BTreeMap<Identity, ObjectRef>>,
    pub lookups: Cell<usize>,
}

impl MemoryEntitySource {
    pub fn insert(&self, entity: ObjectRef) {
        if let Ok(Some(identity)) = self.identity_of(&entity) {
            self.entities.borrow_mut().insert(identity, entity);
        }
    }

    pub fn remove(&self, identity: &Identity) {
        self.entities.borrow_mut().remove(identity);
    }
}

impl EntitySource for MemoryEntitySource {
    fn get_by_id(
        &self,
        _type_key: &TypeKey,
        identity: &Identity,
    ) -> Result<Option<ObjectRef>, AccessError> {
        self.lookups.set(self.lookups.get() + 1);
        Ok(self.entities.borrow().get(identity).cloned())
    }

    fn identity_of(&self, entity: &ObjectRef) -> Result<Option<Identity>, AccessError> {
        Ok(entity.read(|p: &Person| Identity::Int(p.id)))
    }
}

/// Returns a loaded copy of the entity and counts invocations.
pub struct CountingDelegate {
    pub calls: Cell<usize>,
    pub properties: RefCell<Vec<String>>,
    mentor: ObjectRef,
    tasks: Vec<String>,
}

impl CountingDelegate {
    pub fn new(mentor: ObjectRef, tasks: &[&str]) -> Self {
        Self {
            calls: Cell::new(0),
            properties: RefCell::new(Vec::new()),
            mentor,
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl LazyLoadingDelegate for CountingDelegate {
    fn ensure_loaded(&self, entity: &ObjectRef, property: &str) -> Result<ObjectRef, AccessError> {
        self.calls.set(self.calls.get() + 1);
        self.properties.borrow_mut().push(property.to_string());
        let mut loaded = entity
            .read(|p: &Person| p.clone())
            .ok_or_else(|| AccessError::new("delegate expects a Person"))?;
        match property.split('.').next().unwrap_or(property) {
            "mentor" => loaded.mentor = Some(self.mentor.clone()),
            "tasks" => loaded.tasks = Tasks::Loaded(self.tasks.clone()),
            _ => {}
        }
        Ok(ObjectRef::new(loaded))
    }
}

/// Delegate that always fails.
pub struct FailingDelegate;

impl LazyLoadingDelegate for FailingDelegate {
    fn ensure_loaded(&self, _entity: &ObjectRef, property: &str) -> Result<ObjectRef, AccessError> {
        Err(AccessError::new(format!("cannot load `{property}`")))
    }
}

/// Recognizes the fixture proxy types.
pub struct FixtureProbe;

impl LazyReferenceProbe for FixtureProbe {
    fn is_uninitialized_detached(&self, value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|object| object.is::<DetachedProxy>())
    }

    fn is_lazy_initialization_failure(&self, error: &AccessError) -> bool {
        error.cause_is::<LazyInitFailure>()
    }
}

/// Records owner notifications as strings.
#[derive(Default)]
pub struct RecordingOwner {
    pub events: RefCell<Vec<String>>,
}

impl RecordingOwner {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl RecordOwner for RecordingOwner {
    fn property_changed(&self, _record: &BufferedRecord, property: &str) {
        self.events.borrow_mut().push(format!("property:{property}"));
    }

    fn record_changed(&self, record: &BufferedRecord) {
        self.events
            .borrow_mut()
            .push(format!("record:modified={}", record.is_modified()));
    }

    fn record_removed(&self, record: &BufferedRecord) {
        self.events
            .borrow_mut()
            .push(format!("removed:persistent={}", record.is_persistent()));
    }
}

pub fn plain_context() -> Rc<RecordContext> {
    Rc::new(RecordContext::new(person_list()))
}

pub fn persistent_record(context: &Rc<RecordContext>, entity: ObjectRef) -> BufferedRecord {
    BufferedRecord::from_persistent(Rc::clone(context), entity).expect("wrap persistent entity")
}

/// Counts value change events per property.
pub fn counter() -> (Rc<RefCell<Vec<String>>>, impl Fn(&entitybind_core::ValueChangeEvent)) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, move |event: &entitybind_core::ValueChangeEvent| {
        sink.borrow_mut().push(event.property.clone())
    })
}
