//! CLI argument definitions.
//!
//! Uses clap derive macros for type-safe argument parsing.

use clap::{Parser, Subcommand};

/// Datastore Hub - connection orchestration for PostgreSQL, Redis, Elasticsearch and MongoDB
#[derive(Parser, Debug)]
#[command(name = "datastore-hub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve health endpoints and collect pool metrics
    Serve(ServeArgs),

    /// Probe every store once and print the report
    Health(HealthArgs),

    /// Collect pool metrics until interrupted
    Monitor(MonitorArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(short = 'H', long, env = "SERVER_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    /// Run without the background metrics collector
    #[arg(long)]
    pub no_metrics: bool,
}

/// Arguments for the health command
#[derive(Parser, Debug)]
pub struct HealthArgs {
    /// Probe a single store (primary, cache, search_index, document)
    #[arg(short, long)]
    pub store: Option<String>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
}

/// Arguments for the monitor command
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Sampling interval in seconds (overrides METRICS_INTERVAL_SECS)
    #[arg(short, long)]
    pub interval: Option<u64>,
}
