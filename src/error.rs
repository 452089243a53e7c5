//! Error kinds for request validation and statement assembly.

use crate::template::ParamKind;
use thiserror::Error;

/// Why a trace search request was rejected.
///
/// Each kind is a client-input problem scoped to one request; the validator
/// reports only the first rule that fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("malformed request object")]
    MalformedRequest,

    #[error("service name must be set")]
    ServiceNameNotSet,

    #[error("start and end time must be set")]
    TimeRangeNotSet,

    #[error("start time minimum is above maximum")]
    TimeRangeInverted,

    #[error("duration minimum is above maximum")]
    DurationRangeInverted,
}

/// Problems found while binding values to a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template {template}: missing value for placeholder {name}")]
    MissingParam { template: &'static str, name: String },

    #[error("template {template}: {name} is not a declared placeholder")]
    UnexpectedParam { template: &'static str, name: String },

    #[error("template {template}: placeholder {name} expects {expected}, got {actual}")]
    ParamTypeMismatch {
        template: &'static str,
        name: String,
        expected: ParamKind,
        actual: ParamKind,
    },

    #[error("placeholder {name} bound twice with different values")]
    ConflictingParam { name: String },

    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error("bad placeholder pattern: {0}")]
    Pattern(String),
}
