//! Dynamic value model shared by metadata, property lists and records.
//!
//! # Responsibility
//! - Represent property values without knowing concrete entity types.
//! - Provide the shared object handle that accessors read and write through.
//! - Provide one opaque failure type for accessors and collaborators.
//!
//! # Invariants
//! - `Value::Null` is accepted by every declared `ValueType`.
//! - `ObjectRef` equality is pointer identity unless the object overrides it.

pub mod identity;
pub mod object;
pub mod value;
