//! The fixed template set.
//!
//! Span rows carry raw OpenTelemetry columns: TraceID, SpanID, ParentID,
//! SpanName, SpanKind, StartTime, EndTime, TraceAttributes, ResourceAttributes,
//! Events. Service name and duration are not stored; every template that needs
//! them derives them itself so each one stays executable on its own.

use super::{ParamKind, Placeholder, QueryTemplate};
use std::fmt;
use std::str::FromStr;

// All spans of one trace, shaped like Jaeger spans.
pub const TRACE: QueryTemplate = QueryTemplate {
    name: "trace",
    text: "__TABLE__
| where TraceID == ParamTraceID
| extend Duration=datetime_diff('microsecond',EndTime,StartTime), ProcessServiceName=tostring(ResourceAttributes.['service.name'])
| project-rename Tags=TraceAttributes, Logs=Events, ProcessTags=ResourceAttributes
| extend References=iff(isempty(ParentID), todynamic(\"[]\"), pack_array(bag_pack(\"refType\", \"CHILD_OF\", \"traceID\", TraceID, \"spanID\", ParentID)))",
    placeholders: &[Placeholder::new("ParamTraceID", ParamKind::String)],
};

pub const SERVICES: QueryTemplate = QueryTemplate {
    name: "services",
    text: "__TABLE__
| extend ProcessServiceName=tostring(ResourceAttributes.['service.name'])
| where ProcessServiceName != \"\"
| summarize by ProcessServiceName
| sort by ProcessServiceName asc",
    placeholders: &[],
};

pub const OPERATIONS: QueryTemplate = QueryTemplate {
    name: "operations",
    text: "__TABLE__
| summarize count() by SpanName, SpanKind
| sort by count_
| project OperationName=SpanName, SpanKind",
    placeholders: &[],
};

pub const SERVICE_OPERATIONS: QueryTemplate = QueryTemplate {
    name: "service_operations",
    text: "__TABLE__
| extend ProcessServiceName=tostring(ResourceAttributes.['service.name'])
| where ProcessServiceName == ParamProcessServiceName
| summarize count() by SpanName, SpanKind
| sort by count_
| project OperationName=SpanName, SpanKind",
    placeholders: &[Placeholder::new(
        "ParamProcessServiceName",
        ParamKind::String,
    )],
};

// Parent/child service pairs: each span is joined to the span owning its
// ParentID; same-service pairs are dropped.
pub const DEPENDENCIES: QueryTemplate = QueryTemplate {
    name: "dependencies",
    text: "__TABLE__
| extend ProcessServiceName=tostring(ResourceAttributes.['service.name'])
| where StartTime < ParamEndTs and StartTime > (ParamEndTs-ParamLookBack)
| project ProcessServiceName, SpanID, ChildOfSpanId=ParentID
| join (__TABLE__
    | extend ProcessServiceName=tostring(ResourceAttributes.['service.name'])
    | project ChildOfSpanId=SpanID, ParentService=ProcessServiceName) on ChildOfSpanId
| where ProcessServiceName != ParentService
| extend Call=pack('Parent', ParentService, 'Child', ProcessServiceName)
| summarize CallCount=count() by tostring(Call)
| extend Call=parse_json(Call)
| evaluate bag_unpack(Call)",
    placeholders: &[
        Placeholder::new("ParamEndTs", ParamKind::DateTime),
        Placeholder::new("ParamLookBack", ParamKind::Timespan),
    ],
};

// Trace search fragments. They are appended in order, each only when the
// matching request field is set.

pub const TRACES_BASE: QueryTemplate = QueryTemplate {
    name: "traces_base",
    text: "__TABLE__
| extend ProcessServiceName=tostring(ResourceAttributes.['service.name']), Duration=datetime_diff('microsecond',EndTime,StartTime)",
    placeholders: &[],
};

pub const SERVICE_FILTER: QueryTemplate = QueryTemplate {
    name: "service_filter",
    text: "
| where ProcessServiceName == ParamProcessServiceName",
    placeholders: &[Placeholder::new(
        "ParamProcessServiceName",
        ParamKind::String,
    )],
};

pub const OPERATION_FILTER: QueryTemplate = QueryTemplate {
    name: "operation_filter",
    text: "
| where SpanName == ParamOperationName",
    placeholders: &[Placeholder::new("ParamOperationName", ParamKind::String)],
};

// Bound once per tag; placeholders get the tag's index as suffix.
pub const TAG_FILTER: QueryTemplate = QueryTemplate {
    name: "tag_filter",
    text: "
| where tostring(TraceAttributes[ParamTagKey]) == ParamTagValue or tostring(ResourceAttributes[ParamTagKey]) == ParamTagValue",
    placeholders: &[
        Placeholder::new("ParamTagKey", ParamKind::String),
        Placeholder::new("ParamTagValue", ParamKind::String),
    ],
};

pub const START_TIME_FILTER: QueryTemplate = QueryTemplate {
    name: "start_time_filter",
    text: "
| where StartTime >= ParamStartTimeMin and StartTime <= ParamStartTimeMax",
    placeholders: &[
        Placeholder::new("ParamStartTimeMin", ParamKind::DateTime),
        Placeholder::new("ParamStartTimeMax", ParamKind::DateTime),
    ],
};

// Duration is derived in microseconds, so the bounds are longs.
pub const DURATION_MIN_FILTER: QueryTemplate = QueryTemplate {
    name: "duration_min_filter",
    text: "
| where Duration >= ParamDurationMin",
    placeholders: &[Placeholder::new("ParamDurationMin", ParamKind::Long)],
};

pub const DURATION_MAX_FILTER: QueryTemplate = QueryTemplate {
    name: "duration_max_filter",
    text: "
| where Duration <= ParamDurationMax",
    placeholders: &[Placeholder::new("ParamDurationMax", ParamKind::Long)],
};

pub const TRACE_ID_LIMIT: QueryTemplate = QueryTemplate {
    name: "trace_id_limit",
    text: "
| summarize by TraceID
| take ParamNumTraces",
    placeholders: &[Placeholder::new("ParamNumTraces", ParamKind::Int)],
};

// Spans of the trace ids selected by a preceding `let TraceIDs = (...);`.
pub const TRACES_BY_ID: QueryTemplate = QueryTemplate {
    name: "traces_by_id",
    text: "__TABLE__
| where TraceID in (TraceIDs)
| extend Duration=datetime_diff('microsecond',EndTime,StartTime), ProcessServiceName=tostring(ResourceAttributes.['service.name'])
| project-rename Tags=TraceAttributes, Logs=Events, ProcessTags=ResourceAttributes
| extend References=iff(isempty(ParentID), todynamic(\"[]\"), pack_array(bag_pack(\"refType\", \"CHILD_OF\", \"traceID\", TraceID, \"spanID\", ParentID)))",
    placeholders: &[],
};

/// Every template in the set, in declaration order.
pub const ALL_TEMPLATES: &[&QueryTemplate] = &[
    &TRACE,
    &SERVICES,
    &OPERATIONS,
    &SERVICE_OPERATIONS,
    &DEPENDENCIES,
    &TRACES_BASE,
    &SERVICE_FILTER,
    &OPERATION_FILTER,
    &TAG_FILTER,
    &START_TIME_FILTER,
    &DURATION_MIN_FILTER,
    &DURATION_MAX_FILTER,
    &TRACE_ID_LIMIT,
    &TRACES_BY_ID,
];

/// What a caller wants to ask the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    Trace,
    Services,
    Operations,
    ServiceOperations,
    Traces,
    TraceIds,
    Dependencies,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 7] = [
        QueryIntent::Trace,
        QueryIntent::Services,
        QueryIntent::Operations,
        QueryIntent::ServiceOperations,
        QueryIntent::Traces,
        QueryIntent::TraceIds,
        QueryIntent::Dependencies,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryIntent::Trace => "trace",
            QueryIntent::Services => "services",
            QueryIntent::Operations => "operations",
            QueryIntent::ServiceOperations => "service-operations",
            QueryIntent::Traces => "traces",
            QueryIntent::TraceIds => "trace-ids",
            QueryIntent::Dependencies => "dependencies",
        }
    }

    /// Templates a statement for this intent may be assembled from.
    ///
    /// Search intents list every fragment; the planner picks the ones the
    /// request needs.
    pub fn templates(self) -> &'static [&'static QueryTemplate] {
        match self {
            QueryIntent::Trace => &[&TRACE],
            QueryIntent::Services => &[&SERVICES],
            QueryIntent::Operations => &[&OPERATIONS],
            QueryIntent::ServiceOperations => &[&SERVICE_OPERATIONS],
            QueryIntent::TraceIds => &[
                &TRACES_BASE,
                &SERVICE_FILTER,
                &OPERATION_FILTER,
                &TAG_FILTER,
                &START_TIME_FILTER,
                &DURATION_MIN_FILTER,
                &DURATION_MAX_FILTER,
                &TRACE_ID_LIMIT,
            ],
            QueryIntent::Traces => &[
                &TRACES_BASE,
                &SERVICE_FILTER,
                &OPERATION_FILTER,
                &TAG_FILTER,
                &START_TIME_FILTER,
                &DURATION_MIN_FILTER,
                &DURATION_MAX_FILTER,
                &TRACE_ID_LIMIT,
                &TRACES_BY_ID,
            ],
            QueryIntent::Dependencies => &[&DEPENDENCIES],
        }
    }

    /// Service and operation listings change slowly and may be served from
    /// the backend's results cache.
    pub fn cacheable(self) -> bool {
        matches!(
            self,
            QueryIntent::Services | QueryIntent::Operations | QueryIntent::ServiceOperations
        )
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryIntent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        QueryIntent::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<_> = QueryIntent::ALL.iter().map(|i| i.as_str()).collect();
                anyhow::anyhow!("unknown query intent {:?} (expected one of {})", s, known.join(", "))
            })
    }
}
