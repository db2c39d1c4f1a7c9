// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use coachstream::config;
use coachstream::server;

use std::net::{IpAddr, SocketAddr};

#[derive(Parser)]
#[command(name = "coachstream", about = "Streaming coaching assistant gateway")]
struct Cli {
    /// Path to the coachstream.yaml config file
    #[arg(long, default_value = "coachstream.yaml", env = "COACHSTREAM_CONFIG")]
    config: String,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "COACHSTREAM_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 9800, env = "COACHSTREAM_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::new(cli.host, cli.port);
    tracing::info!(%addr, "coachstream starting");

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        locale = %config.parser.locale,
        block_policy = ?config.parser.block_policy,
        augmentation_rules = config.augmentation_rules.len(),
        enrichment = config.enrichment.enabled,
        model = %config.upstream.model,
        config_hash = %config.config_hash,
        "config loaded"
    );

    let app = server::build_router(server::build_state(&config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "coachstream listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
