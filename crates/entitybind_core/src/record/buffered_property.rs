//! Property view bound to one buffered record.

use crate::model::value::{Value, ValueType};
use crate::record::buffered_record::{BufferedRecord, ListenerId, ValueChangeEvent};
use crate::record::RecordResult;
use std::rc::Rc;

/// One named property of a [`BufferedRecord`].
///
/// The view is cheap; cache and listeners live in the record, so a second
/// lookup of the same name sees the same state.
pub struct BufferedProperty<'a> {
    record: &'a mut BufferedRecord,
    name: String,
}

impl<'a> BufferedProperty<'a> {
    pub(crate) fn new(record: &'a mut BufferedRecord, name: &str) -> Self {
        Self {
            record,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self) -> &BufferedRecord {
        &*self.record
    }

    /// Live entity value in pass-through mode, the cached value otherwise.
    pub fn get_value(&mut self) -> RecordResult<Value> {
        self.record.property_value(&self.name)
    }

    /// Sets the value, coercing it to the declared type when needed.
    ///
    /// # Errors
    /// - `ReadOnly` when the property is not writable.
    /// - `Conversion` when coercion fails or the setter rejects the value.
    /// - `IllegalState` when a nested path crosses an absent value.
    pub fn set_value(&mut self, value: impl Into<Value>) -> RecordResult<()> {
        self.record.set_property_value(&self.name, value.into())
    }

    pub fn value_type(&self) -> RecordResult<ValueType> {
        self.record.property_type(&self.name)
    }

    pub fn is_read_only(&self) -> RecordResult<bool> {
        self.record.is_property_read_only(&self.name)
    }

    /// Overrides writability for this record only.
    pub fn set_read_only(&mut self, read_only: bool) -> RecordResult<()> {
        self.record.set_property_writable(&self.name, !read_only)
    }

    pub fn add_listener(&mut self, listener: impl Fn(&ValueChangeEvent) + 'static) -> ListenerId {
        self.record.add_property_listener(&self.name, Rc::new(listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.record.remove_property_listener(&self.name, id)
    }

    pub fn fire_value_change(&self) {
        self.record.fire_value_change(&self.name);
    }

    /// String form of the current value, `None` when absent.
    pub fn to_text(&mut self) -> RecordResult<Option<String>> {
        let value = self.get_value()?;
        Ok((!value.is_null()).then(|| value.to_string()))
    }
}
