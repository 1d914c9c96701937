//! Health command - One-shot health report.

use crate::cli::args::HealthArgs;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::infra::{StoreKind, StoreRegistry};
use crate::services::HealthAggregator;

use super::teardown;

/// Execute the health command
///
/// Prints the report as JSON on stdout. Fails when the primary store (or
/// the single requested store) is down.
pub async fn execute(args: HealthArgs, config: Config) -> AppResult<()> {
    let only = args
        .store
        .as_deref()
        .map(str::parse::<StoreKind>)
        .transpose()
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    let registry = StoreRegistry::connect(&config).await?;
    let aggregator = HealthAggregator::new(config.probe_timeout);

    let outcome = match only {
        Some(kind) => {
            let status = aggregator.check(&registry, kind).await;
            print_json(&status, args.pretty).map(|()| status.is_up().then_some(()).ok_or(kind))
        }
        None => {
            let report = aggregator.check_all(&registry).await;
            print_json(&report, args.pretty)
                .map(|()| report.primary_up().then_some(()).ok_or(StoreKind::Primary))
        }
    };

    let closed = teardown(&registry).await;

    match outcome? {
        Ok(()) => closed,
        Err(kind) => Err(AppError::unhealthy(format!("{} is down", kind.label()))),
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> AppResult<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| AppError::internal(format!("Failed to render report: {}", e)))?;

    println!("{}", rendered);
    Ok(())
}
