// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use bridge_node::config::BridgeNodeConfig;
use bridge_node::node::run_bridge_node;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BridgeNodeConfig::load(&args.config_path)?;

    // Serving and pushing the registry is the operator's concern; the node
    // only populates it.
    let prometheus_registry = prometheus::Registry::new();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    run_bridge_node(config, prometheus_registry, cancel).await
}
