//! Request layer: the trace search request and its validated form.
//!
//! This module is intentionally separate from template text and statement
//! assembly. It owns:
//! - TraceQueryParameters (caller-supplied, JSON-friendly)
//! - ValidatedQuery (the only input trace search statements accept)
//! - the ordered validation rules

pub mod duration;
pub mod validate;

pub use validate::{MAX_NUM_TRACES, validate_query};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

/// A trace search request as handed over by the transport layer.
///
/// JSON shape:
/// {
///   "serviceName": "checkout",
///   "operationName": "GET /cart",        // optional
///   "tags": { "http.method": "GET" },     // optional
///   "startTimeMin": "2024-05-01T10:00:00Z",
///   "startTimeMax": "2024-05-01T11:00:00Z",
///   "durationMin": "100ms",               // optional, 0 = unset
///   "durationMax": 2000000,               // optional, microseconds
///   "numTraces": 20
/// }
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceQueryParameters {
    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub operation_name: String,

    /// Ordered so generated tag placeholders are numbered deterministically.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub start_time_min: Option<DateTime<Utc>>,

    #[serde(default)]
    pub start_time_max: Option<DateTime<Utc>>,

    #[serde(default, with = "duration")]
    pub duration_min: Duration,

    #[serde(default, with = "duration")]
    pub duration_max: Duration,

    #[serde(default)]
    pub num_traces: u32,
}

impl TraceQueryParameters {
    /// Run the validation rules and produce the normalized request.
    pub fn validate(self) -> Result<ValidatedQuery, crate::QueryError> {
        validate_query(Some(self))
    }
}

/// A request that passed validation, with `num_traces` clamped.
///
/// The time bounds are guaranteed to be set and ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    params: TraceQueryParameters,
    start_time_min: DateTime<Utc>,
    start_time_max: DateTime<Utc>,
}

impl ValidatedQuery {
    pub(crate) fn new(
        params: TraceQueryParameters,
        start_time_min: DateTime<Utc>,
        start_time_max: DateTime<Utc>,
    ) -> Self {
        Self {
            params,
            start_time_min,
            start_time_max,
        }
    }

    pub fn params(&self) -> &TraceQueryParameters {
        &self.params
    }

    pub fn into_inner(self) -> TraceQueryParameters {
        self.params
    }

    pub fn start_time_min(&self) -> DateTime<Utc> {
        self.start_time_min
    }

    pub fn start_time_max(&self) -> DateTime<Utc> {
        self.start_time_max
    }

    pub fn service_name(&self) -> &str {
        &self.params.service_name
    }

    pub fn operation_name(&self) -> &str {
        &self.params.operation_name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.params.tags
    }

    /// Lower duration bound, `None` when unset.
    pub fn duration_min(&self) -> Option<Duration> {
        Some(self.params.duration_min).filter(|d| !d.is_zero())
    }

    /// Upper duration bound, `None` when unset.
    pub fn duration_max(&self) -> Option<Duration> {
        Some(self.params.duration_max).filter(|d| !d.is_zero())
    }

    pub fn num_traces(&self) -> u32 {
        self.params.num_traces
    }
}

impl Serialize for ValidatedQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.params.serialize(serializer)
    }
}
