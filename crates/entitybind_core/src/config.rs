//! Declarative record options.
//!
//! # Responsibility
//! - Parse per-record binding options from JSON.
//! - Apply them to a freshly created record in a fixed order.
//!
//! # Invariants
//! - Unknown JSON fields are rejected.
//! - Application order is nested paths, then read-only overrides, then mode.

use crate::record::buffered_record::BufferedRecord;
use crate::record::RecordError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Options parsing and application errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Apply { option: String, source: RecordError },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid record options: {err}"),
            Self::Apply { option, source } => {
                write!(f, "failed to apply record option `{option}`: {source}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Apply { source, .. } => Some(source),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Binding options for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordOptions {
    /// Start in fully buffered mode.
    pub buffered: bool,
    /// Dotted paths to register on the record.
    pub nested_properties: Vec<String>,
    /// Properties forced read-only on the record.
    pub read_only_properties: Vec<String>,
}

impl RecordOptions {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Applies the options to `record`, stopping at the first failure.
    pub fn apply(&self, record: &mut BufferedRecord) -> Result<(), ConfigError> {
        for path in &self.nested_properties {
            record
                .add_nested_property(path)
                .map_err(|source| ConfigError::Apply {
                    option: format!("nested_properties:{path}"),
                    source,
                })?;
        }
        for name in &self.read_only_properties {
            record
                .set_property_writable(name, false)
                .map_err(|source| ConfigError::Apply {
                    option: format!("read_only_properties:{name}"),
                    source,
                })?;
        }
        record
            .set_buffered(self.buffered)
            .map_err(|source| ConfigError::Apply {
                option: "buffered".to_string(),
                source,
            })?;
        debug!(
            "event=record_options_apply module=config status=ok nested={} read_only={} buffered={}",
            self.nested_properties.len(),
            self.read_only_properties.len(),
            self.buffered
        );
        Ok(())
    }
}
