//! Shared object handles and the opaque accessor failure type.
//!
//! # Responsibility
//! - Let entity and embeddable types participate without reflection.
//! - Share one object between a record and the values that reference it.
//!
//! # Invariants
//! - Borrow conflicts surface as `AccessError`, never as panics.
//! - A failing `equals` override is reported, not swallowed, so callers can
//!   decide how to treat it.

use crate::model::identity::TypeKey;
use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// Failure raised by accessor handles and external collaborators.
///
/// The optional source keeps the collaborator's own error available, so a
/// lazy-reference probe can recognize its backend's failures.
#[derive(Debug)]
pub struct AccessError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl AccessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the wrapped collaborator error, if any.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Returns whether the wrapped collaborator error has type `E`.
    pub fn cause_is<E: Error + 'static>(&self) -> bool {
        self.source.as_deref().is_some_and(|cause| cause.is::<E>())
    }
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

/// Upcast helper implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Contract for entity, embeddable and value objects held in `Value::Object`.
pub trait MappedObject: AsAny + Debug {
    /// Mapped type of this object.
    fn type_key(&self) -> TypeKey;

    /// Domain equality between two objects.
    ///
    /// Only called for distinct handles; identical handles are always equal.
    /// Returning an error marks the comparison as failed.
    fn equals(&self, _other: &dyn MappedObject) -> Result<bool, AccessError> {
        Ok(false)
    }

    /// Forces lazily fetched content to materialize.
    ///
    /// Lazy collections and proxies report initialization failures here.
    fn initialize(&self) -> Result<(), AccessError> {
        Ok(())
    }

    /// String representation used by the string-coercion fallback.
    fn to_text(&self) -> String {
        format!("{self:?}")
    }
}

/// Shared, single-threaded handle to one mapped object.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<dyn MappedObject>>);

impl ObjectRef {
    pub fn new<T: MappedObject>(object: T) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    /// Returns whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }

    pub fn type_key(&self) -> Result<TypeKey, AccessError> {
        let guard = self.0.try_borrow().map_err(borrow_error)?;
        Ok(guard.type_key())
    }

    /// Returns whether the object has concrete type `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.read(|_: &T| ()).is_some()
    }

    /// Reads the object as `T`.
    ///
    /// Returns `None` when the object is not a `T` or is mutably borrowed.
    pub fn read<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.0.try_borrow().ok()?;
        let object: &dyn MappedObject = &*guard;
        object.as_any().downcast_ref::<T>().map(f)
    }

    /// Mutates the object as `T`.
    ///
    /// Returns `None` when the object is not a `T` or is already borrowed.
    pub fn write<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.0.try_borrow_mut().ok()?;
        let object: &mut dyn MappedObject = &mut *guard;
        object.as_any_mut().downcast_mut::<T>().map(f)
    }

    pub(crate) fn with_any<R>(&self, f: impl FnOnce(&dyn Any) -> R) -> Result<R, AccessError> {
        let guard = self.0.try_borrow().map_err(borrow_error)?;
        let object: &dyn MappedObject = &*guard;
        Ok(f(object.as_any()))
    }

    pub(crate) fn with_any_mut<R>(
        &self,
        f: impl FnOnce(&mut dyn Any) -> R,
    ) -> Result<R, AccessError> {
        let mut guard = self.0.try_borrow_mut().map_err(borrow_error)?;
        let object: &mut dyn MappedObject = &mut *guard;
        Ok(f(object.as_any_mut()))
    }

    /// Forces lazily fetched content of the object to materialize.
    pub fn initialize(&self) -> Result<(), AccessError> {
        let guard = self.0.try_borrow().map_err(borrow_error)?;
        guard.initialize()
    }

    pub fn to_text(&self) -> String {
        match self.0.try_borrow() {
            Ok(guard) => guard.to_text(),
            Err(_) => String::from("<borrowed>"),
        }
    }

    /// Null-safe domain equality; identical handles are always equal.
    pub fn try_equals(&self, other: &Self) -> Result<bool, AccessError> {
        if self.ptr_eq(other) {
            return Ok(true);
        }
        let left = self.0.try_borrow().map_err(borrow_error)?;
        let right = other.0.try_borrow().map_err(borrow_error)?;
        left.equals(&*right)
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(guard) => Debug::fmt(&*guard, f),
            Err(_) => f.write_str("ObjectRef(<borrowed>)"),
        }
    }
}

fn borrow_error(err: impl Error + Send + Sync + 'static) -> AccessError {
    AccessError::with_source("object is already borrowed", err)
}

#[cfg(test)]
mod tests {
    use super::{AccessError, MappedObject, ObjectRef};
    use crate::model::identity::TypeKey;
    use std::fmt::{Display, Formatter};

    #[derive(Debug)]
    struct Tag {
        label: String,
    }

    impl MappedObject for Tag {
        fn type_key(&self) -> TypeKey {
            TypeKey::new("Tag")
        }

        fn equals(&self, other: &dyn MappedObject) -> Result<bool, AccessError> {
            match other.as_any().downcast_ref::<Tag>() {
                Some(other) if other.label == "broken" => Err(AccessError::new("cannot compare")),
                Some(other) => Ok(other.label == self.label),
                None => Ok(false),
            }
        }
    }

    #[derive(Debug)]
    struct Marker;

    impl Display for Marker {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str("marker")
        }
    }

    impl std::error::Error for Marker {}

    fn tag(label: &str) -> ObjectRef {
        ObjectRef::new(Tag {
            label: label.to_string(),
        })
    }

    #[test]
    fn read_and_write_downcast_to_concrete_type() {
        let object = tag("a");
        assert!(object.is::<Tag>());
        assert_eq!(object.read(|t: &Tag| t.label.clone()), Some("a".to_string()));

        object.write(|t: &mut Tag| t.label = "b".to_string());
        assert_eq!(object.read(|t: &Tag| t.label.clone()), Some("b".to_string()));
        assert_eq!(object.read(|_: &String| ()), None);
        assert_eq!(object.type_key().unwrap(), TypeKey::new("Tag"));
    }

    #[test]
    fn equality_uses_identity_then_override() {
        let a = tag("x");
        assert!(a.try_equals(&a.clone()).unwrap());
        assert!(a.try_equals(&tag("x")).unwrap());
        assert!(!a.try_equals(&tag("y")).unwrap());
        assert!(a.try_equals(&tag("broken")).is_err());
    }

    #[test]
    fn access_error_exposes_typed_cause() {
        let err = AccessError::with_source("lazy load failed", Marker);
        assert!(err.cause_is::<Marker>());
        assert!(err.to_string().contains("marker"));
        assert!(!AccessError::new("plain").cause_is::<Marker>());
    }
}
