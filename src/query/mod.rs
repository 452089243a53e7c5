//! Statement assembly: templates + typed values -> executable KQL.
//!
//! A statement is the concatenated text of one or more templates plus the
//! values bound to their placeholders. Values travel as Kusto query
//! parameters (`declare query_parameters(...)`) and are never spliced into
//! the query body.

pub mod planner;

pub use planner::QueryPlanner;

use crate::error::TemplateError;
use crate::template::literal::timespan;
use crate::template::{ParamValue, QueryTemplate, TableName};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// Values for one template, keyed by placeholder name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(BTreeMap<String, ParamValue>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Bound KQL ready to hand to the execution layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    options: Vec<String>,
    text: String,
    params: Vec<(String, ParamValue)>,
}

impl Statement {
    /// Query body, referring to values only by placeholder name.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bound values in the order they were first declared.
    pub fn parameters(&self) -> &[(String, ParamValue)] {
        &self.params
    }

    /// Leading `set` statements (request options).
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// `declare query_parameters(...)` line, if anything is bound.
    pub fn declaration(&self) -> Option<String> {
        if self.params.is_empty() {
            return None;
        }
        let decls: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| format!("{}:{}", name, value.kind()))
            .collect();
        Some(format!("declare query_parameters({});", decls.join(", ")))
    }

    /// Full statement text; values must be supplied as request parameters.
    pub fn to_kql(&self) -> String {
        self.assemble(self.declaration())
    }

    /// Full statement text with every value given as the parameter's
    /// default, so it runs as-is (e.g. pasted into a query editor).
    pub fn to_inline_kql(&self) -> String {
        let decl = (!self.params.is_empty()).then(|| {
            let decls: Vec<String> = self
                .params
                .iter()
                .map(|(name, value)| {
                    format!("{}:{} = {}", name, value.kind(), value.to_kql_literal())
                })
                .collect();
            format!("declare query_parameters({});", decls.join(", "))
        });
        self.assemble(decl)
    }

    /// Parameter name -> KQL literal, as Kusto client request properties take them.
    pub fn parameter_literals(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(name, value)| (name.clone(), value.to_kql_literal()))
            .collect()
    }

    fn assemble(&self, declaration: Option<String>) -> String {
        let mut out = String::new();
        for opt in &self.options {
            out.push_str(opt);
            out.push('\n');
        }
        if let Some(decl) = declaration {
            out.push_str(&decl);
            out.push('\n');
        }
        out.push_str(&self.text);
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_kql())
    }
}

/// Appends templates to one statement, checking each binding against the
/// template's declared placeholders.
#[derive(Debug)]
pub struct StatementBuilder<'a> {
    table: &'a TableName,
    options: Vec<String>,
    text: String,
    params: Vec<(String, ParamValue)>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(table: &'a TableName) -> Self {
        Self {
            table,
            options: Vec::new(),
            text: String::new(),
            params: Vec::new(),
        }
    }

    /// Let the backend answer from its results cache if an entry is younger
    /// than `max_age`.
    pub fn results_cache_max_age(&mut self, max_age: Duration) -> &mut Self {
        self.options.push(format!(
            "set query_results_cache_max_age = time({});",
            timespan(max_age)
        ));
        self
    }

    /// Static KQL glue between templates (`let X = (`, `);`). Never pass
    /// request values here.
    pub fn literal(&mut self, text: &'static str) -> &mut Self {
        self.text.push_str(text);
        self
    }

    pub fn push(
        &mut self,
        template: &QueryTemplate,
        bindings: Bindings,
    ) -> Result<&mut Self, TemplateError> {
        self.bind(template, None, bindings)
    }

    /// Bind a template that may appear several times in one statement; its
    /// placeholders are renamed with `index` as suffix (`ParamTagKey0`).
    pub fn push_indexed(
        &mut self,
        template: &QueryTemplate,
        index: usize,
        bindings: Bindings,
    ) -> Result<&mut Self, TemplateError> {
        self.bind(template, Some(index), bindings)
    }

    pub fn build(self) -> Statement {
        Statement {
            options: self.options,
            text: self.text,
            params: self.params,
        }
    }

    fn bind(
        &mut self,
        template: &QueryTemplate,
        index: Option<usize>,
        bindings: Bindings,
    ) -> Result<&mut Self, TemplateError> {
        if let Some(name) = bindings.names().find(|n| template.placeholder(n).is_none()) {
            return Err(TemplateError::UnexpectedParam {
                template: template.name,
                name: name.to_string(),
            });
        }

        // Check everything before touching the statement.
        let mut bound = Vec::with_capacity(template.placeholders.len());
        for p in template.placeholders {
            let value = bindings
                .get(p.name)
                .ok_or_else(|| TemplateError::MissingParam {
                    template: template.name,
                    name: p.name.to_string(),
                })?;
            if value.kind() != p.kind {
                return Err(TemplateError::ParamTypeMismatch {
                    template: template.name,
                    name: p.name.to_string(),
                    expected: p.kind,
                    actual: value.kind(),
                });
            }
            let name = match index {
                Some(i) => format!("{}{}", p.name, i),
                None => p.name.to_string(),
            };
            if let Some((_, prev)) = self.params.iter().find(|(n, _)| *n == name) {
                if prev != value {
                    return Err(TemplateError::ConflictingParam { name });
                }
            }
            bound.push((name, value.clone()));
        }

        let mut text = template.render(self.table);
        if let Some(i) = index {
            text = suffix_placeholders(template, &text, i)?;
        }
        self.text.push_str(&text);

        for (name, value) in bound {
            if !self.params.iter().any(|(n, _)| *n == name) {
                self.params.push((name, value));
            }
        }

        trace!(template = template.name, index, "bound template");
        Ok(self)
    }
}

fn suffix_placeholders(
    template: &QueryTemplate,
    text: &str,
    index: usize,
) -> Result<String, TemplateError> {
    if template.placeholders.is_empty() {
        return Ok(text.to_string());
    }
    let names: Vec<String> = template
        .placeholders
        .iter()
        .map(|p| regex::escape(p.name))
        .collect();
    let re = Regex::new(&format!(r"\b({})\b", names.join("|")))
        .map_err(|e| TemplateError::Pattern(e.to_string()))?;
    Ok(re
        .replace_all(text, |caps: &regex::Captures| format!("{}{}", &caps[1], index))
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ParamKind;
    use crate::template::catalog::{DEPENDENCIES, SERVICES, TAG_FILTER, TRACE, TRACES_BASE};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn table() -> TableName {
        TableName::new("OTELTraces").unwrap()
    }

    #[test]
    fn binds_trace_lookup() {
        let table = table();
        let mut b = StatementBuilder::new(&table);
        b.push(&TRACE, Bindings::new().set("ParamTraceID", "4bf92f3577b34da6"))
            .unwrap();
        let stmt = b.build();

        assert_eq!(
            stmt.declaration().as_deref(),
            Some("declare query_parameters(ParamTraceID:string);")
        );
        assert!(stmt.text().starts_with("OTELTraces\n| where TraceID == ParamTraceID"));
        assert!(!stmt.text().contains("4bf92f3577b34da6"));
        assert_eq!(
            stmt.parameter_literals(),
            BTreeMap::from([(
                "ParamTraceID".to_string(),
                "\"4bf92f3577b34da6\"".to_string()
            )])
        );
    }

    #[test]
    fn missing_placeholder() {
        let table = table();
        let err = StatementBuilder::new(&table)
            .push(&TRACE, Bindings::new())
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingParam {
                template: "trace",
                name: "ParamTraceID".to_string()
            }
        );
    }

    #[test]
    fn unexpected_placeholder() {
        let table = table();
        let err = StatementBuilder::new(&table)
            .push(&SERVICES, Bindings::new().set("ParamTraceID", "x"))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnexpectedParam {
                template: "services",
                name: "ParamTraceID".to_string()
            }
        );
    }

    #[test]
    fn wrong_placeholder_type() {
        let table = table();
        let err = StatementBuilder::new(&table)
            .push(
                &DEPENDENCIES,
                Bindings::new()
                    .set("ParamEndTs", "yesterday")
                    .set("ParamLookBack", Duration::from_secs(3600)),
            )
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::ParamTypeMismatch {
                template: "dependencies",
                name: "ParamEndTs".to_string(),
                expected: ParamKind::DateTime,
                actual: ParamKind::String,
            }
        );
    }

    #[test]
    fn failed_bind_leaves_statement_untouched() {
        let table = table();
        let mut b = StatementBuilder::new(&table);
        b.push(&TRACES_BASE, Bindings::new()).unwrap();
        let before = b.text.clone();
        assert!(b.push(&TRACE, Bindings::new()).is_err());
        assert_eq!(b.text, before);
        assert!(b.params.is_empty());
    }

    #[test]
    fn indexed_placeholders() {
        let table = table();
        let mut b = StatementBuilder::new(&table);
        for (i, (k, v)) in [("http.method", "GET"), ("error", "true")].iter().enumerate() {
            b.push_indexed(
                &TAG_FILTER,
                i,
                Bindings::new().set("ParamTagKey", *k).set("ParamTagValue", *v),
            )
            .unwrap();
        }
        let stmt = b.build();
        assert!(stmt.text().contains("TraceAttributes[ParamTagKey0]) == ParamTagValue0"));
        assert!(stmt.text().contains("ResourceAttributes[ParamTagKey1]) == ParamTagValue1"));
        let names: Vec<_> = stmt.parameters().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["ParamTagKey0", "ParamTagValue0", "ParamTagKey1", "ParamTagValue1"]
        );
    }

    #[test]
    fn shared_placeholders_must_agree() {
        let table = table();
        let mut b = StatementBuilder::new(&table);
        b.push(&TRACE, Bindings::new().set("ParamTraceID", "a")).unwrap();
        b.push(&TRACE, Bindings::new().set("ParamTraceID", "a")).unwrap();
        assert_eq!(b.params.len(), 1);

        let err = b
            .push(&TRACE, Bindings::new().set("ParamTraceID", "b"))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::ConflictingParam {
                name: "ParamTraceID".to_string()
            }
        );
    }

    #[test]
    fn inline_statement_carries_defaults() {
        let table = table();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut b = StatementBuilder::new(&table);
        b.push(
            &DEPENDENCIES,
            Bindings::new()
                .set("ParamEndTs", end)
                .set("ParamLookBack", Duration::from_secs(86_400)),
        )
        .unwrap();
        let stmt = b.build();

        let inline = stmt.to_inline_kql();
        assert!(inline.starts_with(
            "declare query_parameters(ParamEndTs:datetime = datetime(2024-05-01T12:00:00Z), ParamLookBack:timespan = timespan(1d));\nOTELTraces\n"
        ));
        assert!(stmt.to_kql().starts_with(
            "declare query_parameters(ParamEndTs:datetime, ParamLookBack:timespan);\n"
        ));
    }

    #[test]
    fn options_come_first() {
        let table = table();
        let mut b = StatementBuilder::new(&table);
        b.results_cache_max_age(Duration::from_secs(300));
        b.push(&SERVICES, Bindings::new()).unwrap();
        let stmt = b.build();
        assert_eq!(stmt.declaration(), None);
        assert!(stmt
            .to_kql()
            .starts_with("set query_results_cache_max_age = time(5m);\nOTELTraces\n"));
    }
}
