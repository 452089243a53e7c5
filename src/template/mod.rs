//! Template layer: KQL text with declared, typed placeholders.
//!
//! Every template is a `'static` constant. A template names the Kusto table
//! it reads with the `__TABLE__` marker and refers to caller-supplied values
//! only through `Param*` identifiers, which are declared with their KQL type.
//! Values are never spliced into the text; see `crate::query`.

pub mod catalog;
pub mod literal;

pub use catalog::QueryIntent;
pub use literal::ParamValue;

use crate::error::TemplateError;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// Marker replaced with the configured table name when a template is bound.
pub const TABLE_MARKER: &str = "__TABLE__";

/// KQL scalar types a placeholder can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKind {
    String,
    DateTime,
    Timespan,
    Long,
    Int,
}

impl ParamKind {
    /// Type name as written in `declare query_parameters(...)`.
    pub fn kql_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::DateTime => "datetime",
            ParamKind::Timespan => "timespan",
            ParamKind::Long => "long",
            ParamKind::Int => "int",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kql_type())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl Placeholder {
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        Self { name, kind }
    }
}

/// A named KQL fragment and the placeholders it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTemplate {
    pub name: &'static str,
    pub text: &'static str,
    pub placeholders: &'static [Placeholder],
}

impl QueryTemplate {
    pub fn placeholder(&self, name: &str) -> Option<&Placeholder> {
        self.placeholders.iter().find(|p| p.name == name)
    }

    /// Every `Param*` identifier the template text refers to.
    pub fn referenced_placeholders(&self) -> anyhow::Result<BTreeSet<&'static str>> {
        let re = Regex::new(r"\bParam[A-Za-z0-9_]*\b")?;
        Ok(re.find_iter(self.text).map(|m| m.as_str()).collect())
    }

    /// Template text with the table marker resolved.
    pub fn render(&self, table: &TableName) -> String {
        self.text.replace(TABLE_MARKER, table.as_kql())
    }
}

/// A Kusto table reference, checked once and rendered in KQL form.
///
/// Plain identifiers are used as-is; names containing spaces, dots or dashes
/// are written in bracket form (`['my-table']`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    name: String,
    kql: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self, TemplateError> {
        let name = name.into();
        let plain = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|_| TemplateError::InvalidTableName(name.clone()))?;
        let quoted = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_ .\-]*$")
            .map_err(|_| TemplateError::InvalidTableName(name.clone()))?;

        let kql = if plain.is_match(&name) {
            name.clone()
        } else if quoted.is_match(&name) && name.len() <= 1024 && !name.ends_with(' ') {
            format!("['{}']", name)
        } else {
            return Err(TemplateError::InvalidTableName(name));
        };

        Ok(Self { name, kql })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn as_kql(&self) -> &str {
        &self.kql
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_table_names() {
        let t = TableName::new("OTELTraces").unwrap();
        assert_eq!(t.as_kql(), "OTELTraces");
        assert_eq!(t.as_str(), "OTELTraces");
    }

    #[test]
    fn bracketed_table_names() {
        let t = TableName::new("otel-traces.v2").unwrap();
        assert_eq!(t.as_kql(), "['otel-traces.v2']");
    }

    #[test]
    fn rejects_injection_in_table_names() {
        for bad in ["", "Spans | take 1", "a'b", "x;drop", "['x']", "trailing "] {
            assert_eq!(
                TableName::new(bad),
                Err(TemplateError::InvalidTableName(bad.to_string())),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn scans_referenced_placeholders() {
        const T: QueryTemplate = QueryTemplate {
            name: "probe",
            text: "__TABLE__ | where A == ParamA and B > (ParamEnd-ParamLookBack)",
            placeholders: &[],
        };
        let refs: Vec<_> = T.referenced_placeholders().unwrap().into_iter().collect();
        assert_eq!(refs, vec!["ParamA", "ParamEnd", "ParamLookBack"]);

        let table = TableName::new("Spans").unwrap();
        assert!(T.render(&table).starts_with("Spans | where"));
    }
}
