//! Span duration filters as they appear in request JSON.
//!
//! Accepted shapes:
//!   250000        // integer microseconds
//!   "250ms"       // Go-style duration string
//!   "1m30.5s"     // units may be chained, largest first
//!
//! Serialization always writes the string form using the largest exact unit.

use anyhow::{Context, bail};
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use serde::Serializer;
use std::fmt;
use std::time::Duration;

const UNITS: &[(&str, u128)] = &[
    ("h", 3_600_000_000_000),
    ("m", 60_000_000_000),
    ("s", 1_000_000_000),
    ("ms", 1_000_000),
    ("us", 1_000),
    ("µs", 1_000),
    ("ns", 1),
];

/// Parse a Go-style duration string ("1h2m", "1.5s", "300us") into a Duration.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    // Longer unit names come first so "ms" is not read as "m" followed by "s".
    const WHOLE_RE: &str = r"^(?:\d+(?:\.\d*)?(?:ns|us|µs|ms|s|m|h))+$";
    const PART_RE: &str = r"(\d+)(?:\.(\d*))?(ns|us|µs|ms|s|m|h)";
    if !Regex::new(WHOLE_RE)?.is_match(s) {
        bail!("invalid duration {:?}", s);
    }

    let mut total: u128 = 0;
    for caps in Regex::new(PART_RE)?.captures_iter(s) {
        let unit = &caps[3];
        let unit_ns = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, ns)| *ns)
            .with_context(|| format!("unknown duration unit {:?}", unit))?;

        let whole: u128 = caps[1]
            .parse()
            .with_context(|| format!("duration component out of range in {:?}", s))?;
        total = whole
            .checked_mul(unit_ns)
            .and_then(|ns| total.checked_add(ns))
            .with_context(|| format!("duration {:?} overflows", s))?;

        if let Some(frac) = caps.get(2).map(|m| m.as_str()).filter(|f| !f.is_empty()) {
            // Digits past nanosecond precision cannot change the result.
            let frac = &frac[..frac.len().min(18)];
            let digits: u128 = frac.parse()?;
            total = total.saturating_add(digits * unit_ns / 10u128.pow(frac.len() as u32));
        }
    }

    let nanos = u64::try_from(total).with_context(|| format!("duration {:?} overflows", s))?;
    Ok(Duration::from_nanos(nanos))
}

/// Render a Duration with the largest unit that represents it exactly.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    for (name, unit_ns) in UNITS {
        // "us" is the canonical spelling; skip the alias.
        if *name == "µs" {
            continue;
        }
        if nanos % unit_ns == 0 {
            return format!("{}{}", nanos / unit_ns, name);
        }
    }
    format!("{}ns", nanos)
}

pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("microseconds as an integer or a duration string such as \"250ms\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_micros(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_micros)
                .map_err(|_| E::custom(format!("negative duration: {}", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse_duration(v).map_err(|e| E::custom(format!("{:#}", e)))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Duration, E> {
            Ok(Duration::ZERO)
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
