//! Property descriptors and their accessor capability table.

use crate::metadata::registry::EntityMetadata;
use crate::model::identity::TypeKey;
use crate::model::object::{AccessError, ObjectRef};
use crate::model::value::{Value, ValueType};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

/// Classification of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Nested single-valued structured value without identity.
    Embedded,
    /// Single-valued reference to another managed type.
    ToOneReference,
    /// Multi-valued reference to another managed type.
    ToManyReference,
    /// Collection of embeddables or basic values.
    ElementCollection,
    /// Scalar persisted value.
    Simple,
    /// Plain accessor pair not mapped to storage.
    NonPersistent,
}

impl PropertyKind {
    pub fn is_persistent(self) -> bool {
        !matches!(self, Self::NonPersistent)
    }

    /// Returns whether a property path may continue past this kind.
    pub fn is_nestable(self) -> bool {
        matches!(self, Self::Embedded | Self::ToOneReference)
    }

    pub fn is_collection(self) -> bool {
        matches!(self, Self::ToManyReference | Self::ElementCollection)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::ToOneReference => "to_one_reference",
            Self::ToManyReference => "to_many_reference",
            Self::ElementCollection => "element_collection",
            Self::Simple => "simple",
            Self::NonPersistent => "non_persistent",
        }
    }
}

/// How the property source reaches the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessStyle {
    Field,
    Method,
}

/// Whether the persistence backend fetches the value eagerly or on access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchMode {
    #[default]
    Eager,
    Lazy,
}

/// Reads a property from the owning object.
pub type Getter = Arc<dyn Fn(&dyn Any) -> Result<Value, AccessError> + Send + Sync>;
/// Writes a property on the owning object.
pub type Setter = Arc<dyn Fn(&mut dyn Any, Value) -> Result<(), AccessError> + Send + Sync>;
/// Single-argument string constructor of a declared type.
pub type TextFactory = Arc<dyn Fn(&str) -> Result<Value, AccessError> + Send + Sync>;

/// Opaque getter/setter pair supplied once by the property source.
#[derive(Clone)]
pub struct AccessHandle {
    style: AccessStyle,
    getter: Getter,
    setter: Option<Setter>,
}

impl AccessHandle {
    pub fn new(style: AccessStyle, getter: Getter, setter: Option<Setter>) -> Self {
        Self {
            style,
            getter,
            setter,
        }
    }

    /// Builds a read-only handle for objects of type `T`.
    pub fn read_only<T, G>(style: AccessStyle, get: G) -> Self
    where
        T: 'static,
        G: Fn(&T) -> Result<Value, AccessError> + Send + Sync + 'static,
    {
        Self::new(style, typed_getter(get), None)
    }

    /// Builds a read/write handle for objects of type `T`.
    pub fn read_write<T, G, S>(style: AccessStyle, get: G, set: S) -> Self
    where
        T: 'static,
        G: Fn(&T) -> Result<Value, AccessError> + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<(), AccessError> + Send + Sync + 'static,
    {
        let setter: Setter = Arc::new(move |target: &mut dyn Any, value: Value| {
            let target = target
                .downcast_mut::<T>()
                .ok_or_else(|| owner_mismatch::<T>())?;
            set(target, value)
        });
        Self::new(style, typed_getter(get), Some(setter))
    }

    pub fn style(&self) -> AccessStyle {
        self.style
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// Reads the property from `owner`.
    pub fn get(&self, owner: &ObjectRef) -> Result<Value, AccessError> {
        owner.with_any(|target| (self.getter)(target))?
    }

    /// Writes the property on `owner`.
    pub fn set(&self, owner: &ObjectRef, value: Value) -> Result<(), AccessError> {
        let Some(setter) = &self.setter else {
            return Err(AccessError::new("property has no setter"));
        };
        owner.with_any_mut(|target| setter(target, value))?
    }

    fn same_handles(&self, other: &Self) -> bool {
        let getters = Arc::ptr_eq(&self.getter, &other.getter);
        let setters = match (&self.setter, &other.setter) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.style == other.style && getters && setters
    }
}

impl Debug for AccessHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessHandle")
            .field("style", &self.style)
            .field("writable", &self.is_writable())
            .finish_non_exhaustive()
    }
}

fn typed_getter<T, G>(get: G) -> Getter
where
    T: 'static,
    G: Fn(&T) -> Result<Value, AccessError> + Send + Sync + 'static,
{
    Arc::new(move |target: &dyn Any| {
        let target = target
            .downcast_ref::<T>()
            .ok_or_else(|| owner_mismatch::<T>())?;
        get(target)
    })
}

fn owner_mismatch<T>() -> AccessError {
    AccessError::new(format!(
        "accessor expects an owner of type {}",
        std::any::type_name::<T>()
    ))
}

/// Forward reference to the metadata of a nested type.
///
/// The slot is shared with the registry while the nested type is still being
/// built and is filled once its entry is complete, which lets cyclic type
/// graphs point back at the same entry.
#[derive(Clone)]
pub struct NestedMetadata {
    type_key: TypeKey,
    slot: Arc<OnceCell<Weak<EntityMetadata>>>,
}

impl NestedMetadata {
    pub(crate) fn new(type_key: TypeKey, slot: Arc<OnceCell<Weak<EntityMetadata>>>) -> Self {
        Self { type_key, slot }
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    /// Resolves the nested entry.
    ///
    /// Returns `None` if the owning registry has been dropped.
    pub fn resolve(&self) -> Option<Arc<EntityMetadata>> {
        self.slot.get().and_then(Weak::upgrade)
    }
}

impl Debug for NestedMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedMetadata")
            .field("type_key", &self.type_key)
            .field("resolved", &self.slot.get().is_some())
            .finish()
    }
}

struct DescriptorInner {
    name: String,
    value_type: ValueType,
    kind: PropertyKind,
    access: AccessHandle,
    fetch: FetchMode,
    from_text: Option<TextFactory>,
    nested: Option<NestedMetadata>,
}

/// Immutable description of one property of a mapped type.
#[derive(Clone)]
pub struct PropertyDescriptor {
    inner: Arc<DescriptorInner>,
}

impl PropertyDescriptor {
    pub(crate) fn new(
        name: String,
        value_type: ValueType,
        kind: PropertyKind,
        access: AccessHandle,
        fetch: FetchMode,
        from_text: Option<TextFactory>,
        nested: Option<NestedMetadata>,
    ) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                name,
                value_type,
                kind,
                access,
                fetch,
                from_text,
                nested,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.inner.value_type
    }

    pub fn kind(&self) -> PropertyKind {
        self.inner.kind
    }

    pub fn access_style(&self) -> AccessStyle {
        self.inner.access.style()
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.inner.fetch
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.fetch == FetchMode::Lazy
    }

    /// True iff the property source supplied a setter.
    pub fn is_writable(&self) -> bool {
        self.inner.access.is_writable()
    }

    pub fn nested(&self) -> Option<&NestedMetadata> {
        self.inner.nested.as_ref()
    }

    /// Metadata of the nested type, once resolvable.
    pub fn nested_metadata(&self) -> Option<Arc<EntityMetadata>> {
        self.inner.nested.as_ref().and_then(NestedMetadata::resolve)
    }

    pub fn read(&self, owner: &ObjectRef) -> Result<Value, AccessError> {
        self.inner.access.get(owner)
    }

    pub fn write(&self, owner: &ObjectRef, value: Value) -> Result<(), AccessError> {
        self.inner.access.set(owner, value)
    }

    /// Builds a value of the declared type from a string representation.
    ///
    /// Uses the source-supplied string constructor when present and the
    /// built-in scalar parsers otherwise.
    pub fn value_from_text(&self, text: &str) -> Result<Value, AccessError> {
        if let Some(factory) = &self.inner.from_text {
            return factory(text);
        }
        self.inner.value_type.parse_text(text).ok_or_else(|| {
            AccessError::new(format!(
                "type {} has no string constructor accepting `{text}`",
                self.inner.value_type
            ))
        })
    }
}

impl PartialEq for PropertyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
            && self.inner.value_type == other.inner.value_type
            && self.inner.access.same_handles(&other.inner.access)
    }
}

impl Eq for PropertyDescriptor {}

impl Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.inner.name)
            .field("value_type", &self.inner.value_type)
            .field("kind", &self.inner.kind)
            .field("fetch", &self.inner.fetch)
            .field("writable", &self.is_writable())
            .field("nested", &self.inner.nested)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessHandle, AccessStyle, FetchMode, PropertyDescriptor, PropertyKind};
    use crate::model::identity::TypeKey;
    use crate::model::object::{AccessError, MappedObject, ObjectRef};
    use crate::model::value::{Value, ValueType};

    #[derive(Debug, Default)]
    struct Counter {
        count: i64,
    }

    impl MappedObject for Counter {
        fn type_key(&self) -> TypeKey {
            TypeKey::new("Counter")
        }
    }

    fn count_handle() -> AccessHandle {
        AccessHandle::read_write(
            AccessStyle::Field,
            |c: &Counter| Ok(Value::Int(c.count)),
            |c: &mut Counter, value: Value| {
                c.count = value
                    .as_int()
                    .ok_or_else(|| AccessError::new("count must be an int"))?;
                Ok(())
            },
        )
    }

    fn descriptor(name: &str, access: AccessHandle) -> PropertyDescriptor {
        PropertyDescriptor::new(
            name.to_string(),
            ValueType::Int,
            PropertyKind::Simple,
            access,
            FetchMode::Eager,
            None,
            None,
        )
    }

    #[test]
    fn handle_reads_and_writes_through_object_ref() {
        let counter = ObjectRef::new(Counter::default());
        let prop = descriptor("count", count_handle());

        prop.write(&counter, Value::Int(5)).expect("write count");
        assert_eq!(prop.read(&counter).unwrap().as_int(), Some(5));
        assert!(prop.write(&counter, Value::from("x")).is_err());
        assert!(prop.is_writable());
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let counter = ObjectRef::new(Counter { count: 3 });
        let prop = descriptor(
            "count",
            AccessHandle::read_only(AccessStyle::Method, |c: &Counter| Ok(Value::Int(c.count))),
        );
        assert!(!prop.is_writable());
        assert!(prop.write(&counter, Value::Int(1)).is_err());
        assert_eq!(prop.access_style(), AccessStyle::Method);
    }

    #[test]
    fn equality_requires_same_access_handles() {
        let handle = count_handle();
        let a = descriptor("count", handle.clone());
        let b = descriptor("count", handle);
        let c = descriptor("count", count_handle());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn value_from_text_uses_builtin_parser() {
        let prop = descriptor("count", count_handle());
        assert_eq!(prop.value_from_text("12").unwrap().as_int(), Some(12));
        assert!(prop.value_from_text("twelve").is_err());
    }

    #[test]
    fn kind_classification() {
        assert!(PropertyKind::Embedded.is_nestable());
        assert!(PropertyKind::ToOneReference.is_nestable());
        assert!(!PropertyKind::ToManyReference.is_nestable());
        assert!(!PropertyKind::NonPersistent.is_persistent());
        assert!(PropertyKind::ElementCollection.is_collection());
    }
}
