//! Bootstrap utilities for the controller binary.

use std::future::Future;
use std::time::Duration;

use backon::Retryable;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};
use crate::utils::retry::connection_backoff;

/// Initialize tracing with the DATACHANNEL_LOG environment variable.
///
/// Defaults to "info" level if DATACHANNEL_LOG is not set. Set
/// DATACHANNEL_LOG_FORMAT=json for JSON lines output.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV_VAR).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Parse `--config <path>` from the command line.
pub fn parse_config_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Connect to a service with exponential backoff retry.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "kubernetes API")
/// * `connect` - Async function that attempts to establish a connection
///
/// # Returns
/// The connected client on success, or the last error after max retries.
pub async fn connect_with_retry<T, E, F, Fut>(service_name: &str, connect: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let client = connect
        .retry(connection_backoff())
        .notify(|err: &E, dur: Duration| {
            warn!(service = %service_name, error = %err, delay = ?dur, "Connection failed, retrying");
        })
        .await?;
    info!(service = %service_name, "Connected");
    Ok(client)
}
