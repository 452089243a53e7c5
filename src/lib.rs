//! Validation and KQL templating for trace searches against a Kusto span table.
//!
//! Flow: a [`TraceQueryParameters`] comes in from the transport layer, goes
//! through [`validate_query`], and the resulting [`ValidatedQuery`] is turned
//! into a [`Statement`] by a [`QueryPlanner`]. Executing the statement is left
//! to the caller.

pub mod config;
pub mod error;
pub mod query;
pub mod request;
pub mod template;

pub use config::QueryConfig;
pub use error::{QueryError, TemplateError};
pub use query::{Bindings, QueryPlanner, Statement, StatementBuilder};
pub use request::{MAX_NUM_TRACES, TraceQueryParameters, ValidatedQuery, validate_query};
pub use template::{ParamKind, ParamValue, Placeholder, QueryIntent, QueryTemplate, TableName};

pub type Result<T> = anyhow::Result<T>;
