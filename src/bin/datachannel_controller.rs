//! datachannel-controller: channel topology reconciler
//!
//! Watches `ChannelTopology` resources and builds the worker clusters that
//! move data between the clusters each topology declares.
//!
//! ## Architecture
//! ```text
//! [ChannelTopology] --watch--> [datachannel-controller] --create--> [worker Cluster]
//!        ^                              |
//!        +------ status subresource ----+--patch--> [source/sink Cluster labels]
//! ```
//!
//! ## Configuration
//! - `--config <path>`: YAML configuration file (optional)
//! - DATACHANNEL_CONFIG: configuration file path (optional)
//! - DATACHANNEL__CONTROLLER__NAMESPACE: namespace to watch (default: all)
//! - DATACHANNEL_LOG: tracing filter (default: info)
//! - DATACHANNEL_LOG_FORMAT: `json` for JSON lines output

use kube::Client;
use tracing::info;

use datachannel::config::Config;
use datachannel::controller;
use datachannel::utils::bootstrap::{connect_with_retry, init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref())?;

    let client = connect_with_retry("kubernetes API", Client::try_default).await?;

    info!("datachannel-controller started");
    controller::run(client, &config).await;

    Ok(())
}
