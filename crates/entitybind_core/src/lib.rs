//! Entity binding core.
//! Describes mapped types once and exposes live entities as buffered,
//! path-addressable records.

pub mod config;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod property;
pub mod record;

pub use config::{ConfigError, RecordOptions};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use metadata::descriptor::{
    AccessHandle, AccessStyle, FetchMode, NestedMetadata, PropertyDescriptor, PropertyKind,
    TextFactory,
};
pub use metadata::registry::{EntityMetadata, MetadataRegistry};
pub use metadata::source::{PropertySource, PropertySpec, TypeClass, TypeInfo};
pub use metadata::{DesignationRole, MetadataError, MetadataResult};
pub use model::identity::{Identity, TypeKey};
pub use model::object::{AccessError, MappedObject, ObjectRef};
pub use model::value::{values_differ, Value, ValueType};
pub use property::list::{PropertyList, ValueAccessor};
pub use property::{PropertyError, PropertyResult};
pub use record::buffered_property::BufferedProperty;
pub use record::buffered_record::{
    BufferMode, BufferedRecord, ListenerId, RefreshOutcome, ValueChangeEvent,
};
pub use record::collaborators::{
    EntitySource, LazyLoadingDelegate, LazyReferenceProbe, RecordContext, RecordOwner,
};
pub use record::{RecordError, RecordResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
