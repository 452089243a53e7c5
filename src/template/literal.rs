//! Typed placeholder values and their KQL literal form.
//!
//! Kusto receives query parameter values as literal text (`"abc"`,
//! `datetime(2024-05-01T10:00:00Z)`, `timespan(5m)`), so rendering here is
//! the only place user input gets escaped.

use super::ParamKind;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    String(String),
    DateTime(DateTime<Utc>),
    Timespan(Duration),
    Long(i64),
    Int(i32),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::String(_) => ParamKind::String,
            ParamValue::DateTime(_) => ParamKind::DateTime,
            ParamValue::Timespan(_) => ParamKind::Timespan,
            ParamValue::Long(_) => ParamKind::Long,
            ParamValue::Int(_) => ParamKind::Int,
        }
    }

    /// Render the value as a KQL literal of its kind.
    pub fn to_kql_literal(&self) -> String {
        match self {
            ParamValue::String(s) => quote_string(s),
            ParamValue::DateTime(ts) => {
                format!("datetime({})", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            ParamValue::Timespan(d) => format!("timespan({})", timespan(*d)),
            ParamValue::Long(n) => format!("long({})", n),
            ParamValue::Int(n) => format!("int({})", n),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(ts: DateTime<Utc>) -> Self {
        ParamValue::DateTime(ts)
    }
}

impl From<Duration> for ParamValue {
    fn from(d: Duration) -> Self {
        ParamValue::Timespan(d)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Long(n)
    }
}

impl From<i32> for ParamValue {
    fn from(n: i32) -> Self {
        ParamValue::Int(n)
    }
}

/// Double-quoted KQL string literal.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// KQL timespan body (`5m`, `1500ms`, `3tick`) using the largest exact unit.
pub fn timespan(d: Duration) -> String {
    // One tick is 100ns; anything finer is truncated.
    const UNITS: &[(&str, u128)] = &[
        ("d", 86_400_000_000_000),
        ("h", 3_600_000_000_000),
        ("m", 60_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("microsecond", 1_000),
        ("tick", 100),
    ];

    let nanos = d.as_nanos() / 100 * 100;
    if nanos == 0 {
        return "0s".to_string();
    }
    for (unit, unit_ns) in UNITS {
        if nanos % unit_ns == 0 {
            return format!("{}{}", nanos / unit_ns, unit);
        }
    }
    format!("{}tick", nanos / 100)
}
