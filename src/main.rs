use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use tracing_subscriber::EnvFilter;

use trace_kql::request::duration::parse_duration;
use trace_kql::{
    QueryConfig, QueryIntent, QueryPlanner, Result, Statement, TraceQueryParameters,
    ValidatedQuery, validate_query,
};

#[derive(Parser)]
#[command(name = "trace-kql")]
#[command(about = "Validate trace searches and print the KQL they run", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a search request (JSON) and print it normalized.
    Validate {
        #[arg(long)]
        request: String,
    },

    /// Print the statement for one query intent.
    Render {
        /// trace | services | operations | service-operations | traces | trace-ids | dependencies
        intent: QueryIntent,

        /// Search request JSON, for traces and trace-ids.
        #[arg(long)]
        request: Option<String>,

        #[arg(long)]
        trace_id: Option<String>,

        #[arg(long)]
        service: Option<String>,

        /// End of the dependency window (RFC 3339). Defaults to now.
        #[arg(long)]
        end: Option<String>,

        #[arg(long, default_value = "24h")]
        lookback: String,

        #[arg(short = 'c', long)]
        config: Option<String>,

        /// Overrides the table from the config file.
        #[arg(long)]
        table: Option<String>,

        /// Put the values into the declaration so the text runs as-is.
        #[arg(long)]
        inline: bool,

        /// Print the parameter values (JSON) instead of the query text.
        #[arg(long)]
        params: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Validate { request } => {
            let validated = read_request(&request)?;
            println!("{}", serde_json::to_string_pretty(&validated)?);
        }
        Commands::Render {
            intent,
            request,
            trace_id,
            service,
            end,
            lookback,
            config,
            table,
            inline,
            params,
        } => {
            // 1) Config, with command-line overrides.
            let mut config = match &config {
                Some(path) => QueryConfig::load(path)?,
                None => QueryConfig::default(),
            };
            if let Some(table) = table {
                config.table = table;
            }
            let planner = QueryPlanner::from_config(&config)?;

            // 2) Inputs for the intent.
            let stmt: Statement = match intent {
                QueryIntent::Trace => {
                    let id = trace_id.context("render trace needs --trace-id")?;
                    planner.trace(&id)?
                }
                QueryIntent::Services => planner.services()?,
                QueryIntent::Operations => planner.operations(service.as_deref())?,
                QueryIntent::ServiceOperations => {
                    let service = service.context("render service-operations needs --service")?;
                    planner.operations(Some(&service))?
                }
                QueryIntent::Traces | QueryIntent::TraceIds => {
                    let path = request.context("render traces needs --request")?;
                    let validated = read_request(&path)?;
                    if intent == QueryIntent::Traces {
                        planner.traces(&validated)?
                    } else {
                        planner.trace_ids(&validated)?
                    }
                }
                QueryIntent::Dependencies => {
                    let end = match end {
                        Some(s) => DateTime::parse_from_rfc3339(&s)
                            .with_context(|| format!("bad --end timestamp {}", s))?
                            .with_timezone(&Utc),
                        None => Utc::now(),
                    };
                    let lookback = parse_duration(&lookback)
                        .with_context(|| format!("bad --lookback {}", lookback))?;
                    planner.dependencies(end, lookback)?
                }
            };

            // 3) Output.
            if params {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stmt.parameter_literals())?
                );
            } else if inline {
                println!("{}", stmt.to_inline_kql());
            } else {
                println!("{}", stmt.to_kql());
            }
        }
    }

    Ok(())
}

/// Read a request file and validate it. A JSON `null` is an absent request.
fn read_request(path: &str) -> Result<ValidatedQuery> {
    let text = fs::read_to_string(path).with_context(|| format!("read request file {}", path))?;
    let request: Option<TraceQueryParameters> =
        serde_json::from_str(&text).with_context(|| format!("parse request file {}", path))?;
    let validated =
        validate_query(request).with_context(|| format!("invalid request in {}", path))?;
    Ok(validated)
}
