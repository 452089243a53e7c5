use crate::QueryError;
use crate::request::{TraceQueryParameters, ValidatedQuery};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

/// Upper bound on traces returned by one search; larger requests are clamped.
pub const MAX_NUM_TRACES: u32 = 500;

/// Check a search request and normalize it.
///
/// Rules run in a fixed order and the first failure is returned:
/// 1) request present
/// 2) tag filters need a service name
/// 3) both time bounds set
/// 4) time bounds ordered
/// 5) duration bounds ordered (only when both are set)
///
/// On success `num_traces` is clamped to [`MAX_NUM_TRACES`]; nothing else changes.
pub fn validate_query(params: Option<TraceQueryParameters>) -> Result<ValidatedQuery, QueryError> {
    let Some(mut params) = params else {
        return Err(QueryError::MalformedRequest);
    };

    if params.service_name.is_empty() && !params.tags.is_empty() {
        return Err(QueryError::ServiceNameNotSet);
    }

    let (Some(min), Some(max)) = (
        set_time(params.start_time_min),
        set_time(params.start_time_max),
    ) else {
        return Err(QueryError::TimeRangeNotSet);
    };

    if max < min {
        return Err(QueryError::TimeRangeInverted);
    }

    if !params.duration_min.is_zero()
        && !params.duration_max.is_zero()
        && params.duration_min > params.duration_max
    {
        return Err(QueryError::DurationRangeInverted);
    }

    if params.num_traces > MAX_NUM_TRACES {
        debug!(
            requested = params.num_traces,
            max = MAX_NUM_TRACES,
            "clamping numTraces"
        );
        params.num_traces = MAX_NUM_TRACES;
    }

    Ok(ValidatedQuery::new(params, min, max))
}

/// Transport layers written in Go send their zero time (0001-01-01T00:00:00Z)
/// for an unset timestamp; treat it like a missing one.
fn set_time(ts: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    let zero = NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    ts.filter(|t| Some(*t) != zero)
}
