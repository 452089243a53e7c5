//! Backend settings (config.json).
//!
//! JSON shape (every field optional):
//! {
//!   "table": "OTELTraces",          // span table
//!   "resultsCacheMaxAge": "5m"      // listings cache age, "0s" disables
//! }

use crate::error::TemplateError;
use crate::request::duration;
use crate::template::TableName;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

pub const DEFAULT_TABLE: &str = "OTELTraces";
pub const DEFAULT_RESULTS_CACHE_MAX_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfig {
    pub table: String,

    #[serde(with = "duration")]
    pub results_cache_max_age: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            results_cache_max_age: DEFAULT_RESULTS_CACHE_MAX_AGE,
        }
    }
}

impl QueryConfig {
    /// Read and check a JSON config file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
        let config: QueryConfig =
            serde_json::from_str(&text).with_context(|| format!("parse config file {}", path))?;
        config
            .table_name()
            .with_context(|| format!("bad table in config file {}", path))?;
        Ok(config)
    }

    pub fn table_name(&self) -> Result<TableName, TemplateError> {
        TableName::new(self.table.clone())
    }

    /// `None` when caching is disabled.
    pub fn results_cache_max_age(&self) -> Option<Duration> {
        Some(self.results_cache_max_age).filter(|d| !d.is_zero())
    }
}
