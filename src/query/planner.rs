//! One statement per query intent.

use super::{Bindings, Statement, StatementBuilder};
use crate::config::QueryConfig;
use crate::error::TemplateError;
use crate::request::ValidatedQuery;
use crate::template::catalog::{
    DEPENDENCIES, DURATION_MAX_FILTER, DURATION_MIN_FILTER, OPERATION_FILTER, OPERATIONS,
    SERVICE_FILTER, SERVICE_OPERATIONS, SERVICES, START_TIME_FILTER, TAG_FILTER, TRACE,
    TRACE_ID_LIMIT, TRACES_BASE, TRACES_BY_ID,
};
use crate::template::{QueryIntent, TableName};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Builds statements against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlanner {
    table: TableName,
    results_cache_max_age: Option<Duration>,
}

impl QueryPlanner {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            results_cache_max_age: None,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Result<Self, TemplateError> {
        Ok(Self::new(config.table_name()?).with_results_cache(config.results_cache_max_age()))
    }

    /// Cache age applied to service and operation listings; `None` disables it.
    pub fn with_results_cache(mut self, max_age: Option<Duration>) -> Self {
        self.results_cache_max_age = max_age.filter(|d| !d.is_zero());
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// All spans of one trace.
    pub fn trace(&self, trace_id: &str) -> Result<Statement, TemplateError> {
        let mut b = self.builder(QueryIntent::Trace);
        b.push(&TRACE, Bindings::new().set("ParamTraceID", trace_id))?;
        Ok(self.finish(QueryIntent::Trace, b))
    }

    pub fn services(&self) -> Result<Statement, TemplateError> {
        let mut b = self.builder(QueryIntent::Services);
        b.push(&SERVICES, Bindings::new())?;
        Ok(self.finish(QueryIntent::Services, b))
    }

    /// Operation names and span kinds, optionally for one service. An empty
    /// service name lists operations of all services.
    pub fn operations(&self, service: Option<&str>) -> Result<Statement, TemplateError> {
        match service.filter(|s| !s.is_empty()) {
            None => {
                let mut b = self.builder(QueryIntent::Operations);
                b.push(&OPERATIONS, Bindings::new())?;
                Ok(self.finish(QueryIntent::Operations, b))
            }
            Some(service) => {
                let mut b = self.builder(QueryIntent::ServiceOperations);
                b.push(
                    &SERVICE_OPERATIONS,
                    Bindings::new().set("ParamProcessServiceName", service),
                )?;
                Ok(self.finish(QueryIntent::ServiceOperations, b))
            }
        }
    }

    /// Distinct ids of traces matching the search, at most `num_traces`.
    pub fn trace_ids(&self, query: &ValidatedQuery) -> Result<Statement, TemplateError> {
        let mut b = self.builder(QueryIntent::TraceIds);
        push_search(&mut b, query)?;
        Ok(self.finish(QueryIntent::TraceIds, b))
    }

    /// Spans of every trace matching the search.
    pub fn traces(&self, query: &ValidatedQuery) -> Result<Statement, TemplateError> {
        let mut b = self.builder(QueryIntent::Traces);
        b.literal("let TraceIDs = (");
        push_search(&mut b, query)?;
        b.literal(");\n");
        b.push(&TRACES_BY_ID, Bindings::new())?;
        Ok(self.finish(QueryIntent::Traces, b))
    }

    /// Service call counts for spans starting in `(end - lookback, end)`.
    pub fn dependencies(
        &self,
        end: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<Statement, TemplateError> {
        let mut b = self.builder(QueryIntent::Dependencies);
        b.push(
            &DEPENDENCIES,
            Bindings::new()
                .set("ParamEndTs", end)
                .set("ParamLookBack", lookback),
        )?;
        Ok(self.finish(QueryIntent::Dependencies, b))
    }

    fn builder(&self, intent: QueryIntent) -> StatementBuilder<'_> {
        let mut b = StatementBuilder::new(&self.table);
        if let Some(age) = self.results_cache_max_age.filter(|_| intent.cacheable()) {
            b.results_cache_max_age(age);
        }
        b
    }

    fn finish(&self, intent: QueryIntent, b: StatementBuilder<'_>) -> Statement {
        let stmt = b.build();
        debug!(
            %intent,
            table = self.table.as_str(),
            params = stmt.parameters().len(),
            "planned statement"
        );
        stmt
    }
}

/// Base projection, then one filter per set field, then the trace id limit.
fn push_search(b: &mut StatementBuilder<'_>, query: &ValidatedQuery) -> Result<(), TemplateError> {
    b.push(&TRACES_BASE, Bindings::new())?;

    if !query.service_name().is_empty() {
        b.push(
            &SERVICE_FILTER,
            Bindings::new().set("ParamProcessServiceName", query.service_name()),
        )?;
    }

    if !query.operation_name().is_empty() {
        b.push(
            &OPERATION_FILTER,
            Bindings::new().set("ParamOperationName", query.operation_name()),
        )?;
    }

    for (i, (key, value)) in query.tags().iter().enumerate() {
        b.push_indexed(
            &TAG_FILTER,
            i,
            Bindings::new()
                .set("ParamTagKey", key.as_str())
                .set("ParamTagValue", value.as_str()),
        )?;
    }

    b.push(
        &START_TIME_FILTER,
        Bindings::new()
            .set("ParamStartTimeMin", query.start_time_min())
            .set("ParamStartTimeMax", query.start_time_max()),
    )?;

    if let Some(min) = query.duration_min() {
        b.push(
            &DURATION_MIN_FILTER,
            Bindings::new().set("ParamDurationMin", micros(min)),
        )?;
    }

    if let Some(max) = query.duration_max() {
        b.push(
            &DURATION_MAX_FILTER,
            Bindings::new().set("ParamDurationMax", micros(max)),
        )?;
    }

    // Clamped by validation, so always fits.
    let limit = i32::try_from(query.num_traces()).unwrap_or(i32::MAX);
    b.push(&TRACE_ID_LIMIT, Bindings::new().set("ParamNumTraces", limit))?;

    Ok(())
}

fn micros(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::TraceQueryParameters;
    use crate::template::ParamValue;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn planner() -> QueryPlanner {
        QueryPlanner::new(TableName::new("OTELTraces").unwrap())
            .with_results_cache(Some(Duration::from_secs(300)))
    }

    fn search() -> TraceQueryParameters {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        TraceQueryParameters {
            service_name: "checkout".to_string(),
            start_time_min: Some(t0),
            start_time_max: Some(t0 + chrono::Duration::hours(1)),
            num_traces: 20,
            ..Default::default()
        }
    }

    fn names(stmt: &Statement) -> Vec<&str> {
        stmt.parameters().iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn minimal_search() {
        let q = search().validate().unwrap();
        let stmt = planner().trace_ids(&q).unwrap();
        assert_eq!(
            names(&stmt),
            vec![
                "ParamProcessServiceName",
                "ParamStartTimeMin",
                "ParamStartTimeMax",
                "ParamNumTraces"
            ]
        );
        assert_eq!(
            stmt.text(),
            "OTELTraces
| extend ProcessServiceName=tostring(ResourceAttributes.['service.name']), Duration=datetime_diff('microsecond',EndTime,StartTime)
| where ProcessServiceName == ParamProcessServiceName
| where StartTime >= ParamStartTimeMin and StartTime <= ParamStartTimeMax
| summarize by TraceID
| take ParamNumTraces"
        );
        assert!(stmt.options().is_empty());
    }

    #[test]
    fn full_search() {
        let q = TraceQueryParameters {
            operation_name: "GET /cart".to_string(),
            tags: BTreeMap::from([
                ("http.status_code".to_string(), "500".to_string()),
                ("error".to_string(), "true".to_string()),
            ]),
            duration_min: Duration::from_millis(100),
            duration_max: Duration::from_secs(2),
            num_traces: 10_000,
            ..search()
        }
        .validate()
        .unwrap();

        let stmt = planner().traces(&q).unwrap();
        assert_eq!(
            names(&stmt),
            vec![
                "ParamProcessServiceName",
                "ParamOperationName",
                "ParamTagKey0",
                "ParamTagValue0",
                "ParamTagKey1",
                "ParamTagValue1",
                "ParamStartTimeMin",
                "ParamStartTimeMax",
                "ParamDurationMin",
                "ParamDurationMax",
                "ParamNumTraces"
            ]
        );

        let literals = stmt.parameter_literals();
        // Tags are numbered in key order.
        assert_eq!(literals["ParamTagKey0"], "\"error\"");
        assert_eq!(literals["ParamTagValue1"], "\"500\"");
        assert_eq!(literals["ParamDurationMin"], "long(100000)");
        assert_eq!(literals["ParamDurationMax"], "long(2000000)");
        assert_eq!(literals["ParamNumTraces"], "int(500)");

        assert!(stmt.text().starts_with("let TraceIDs = (OTELTraces\n"));
        assert!(stmt.text().contains("| take ParamNumTraces);\nOTELTraces\n| where TraceID in (TraceIDs)"));
        assert!(!stmt.text().contains("GET /cart"));
    }

    #[test]
    fn search_without_service() {
        let q = TraceQueryParameters {
            service_name: String::new(),
            ..search()
        }
        .validate()
        .unwrap();
        let stmt = planner().trace_ids(&q).unwrap();
        assert!(!stmt.text().contains("ParamProcessServiceName"));
        assert_eq!(stmt.parameters()[0].0, "ParamStartTimeMin");
    }

    #[test]
    fn operations_by_service() {
        let p = planner();
        let all = p.operations(None).unwrap();
        assert!(all.parameters().is_empty());
        assert_eq!(p.operations(Some("")).unwrap(), all);

        let one = p.operations(Some("cart")).unwrap();
        assert_eq!(
            one.parameters(),
            &[(
                "ParamProcessServiceName".to_string(),
                ParamValue::String("cart".to_string())
            )]
        );
        assert!(one.to_kql().starts_with("set query_results_cache_max_age = time(5m);\n"));
    }

    #[test]
    fn cache_only_for_listings() {
        let p = planner();
        assert_eq!(p.services().unwrap().options().len(), 1);
        assert!(p.trace("abc").unwrap().options().is_empty());
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(
            p.dependencies(end, Duration::from_secs(3600))
                .unwrap()
                .options()
                .is_empty()
        );

        let uncached = planner().with_results_cache(None);
        assert!(uncached.services().unwrap().options().is_empty());
    }

    #[test]
    fn dependencies_reference_table_twice() {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let stmt = planner()
            .dependencies(end, Duration::from_secs(86_400))
            .unwrap();
        assert_eq!(stmt.text().matches("OTELTraces").count(), 2);
        assert_eq!(
            stmt.parameter_literals(),
            BTreeMap::from([
                (
                    "ParamEndTs".to_string(),
                    "datetime(2024-05-01T12:00:00Z)".to_string()
                ),
                ("ParamLookBack".to_string(), "timespan(1d)".to_string()),
            ])
        );
    }
}
