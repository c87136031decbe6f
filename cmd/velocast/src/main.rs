//! velocast - device telemetry ingestion service.
//!
//! Subscribes to device frames on an MQTT broker, merges them into per-device
//! state and serves that state over HTTP, with live updates over SSE.

mod api;
mod config;
mod ingest;
mod roster;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use velocast_devicestate::{Pipeline, Registry};

use crate::api::ApiState;
use crate::config::Config;
use crate::roster::{FileRoster, RosterSource};

/// Device telemetry ingestion service.
#[derive(Parser, Debug)]
#[command(name = "velocast")]
#[command(about = "Ingest device telemetry from MQTT and serve merged state")]
#[command(version)]
struct Args {
    /// Config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MQTT broker URL (overrides config)
    #[arg(long)]
    mqtt_url: Option<String>,

    /// HTTP listen address, e.g. :9090 (overrides config)
    #[arg(long)]
    listen: Option<String>,

    /// Device roster file (overrides config)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(url) = &self.mqtt_url {
            config.mqtt.url = url.clone();
        }
        if let Some(listen) = &self.listen {
            config.http.listen = listen.clone();
        }
        if let Some(roster) = &self.roster {
            config.roster.path = roster.clone();
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        Ok(config)
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_tracing(&config.log_level);

    let devices = FileRoster::new(&config.roster.path)
        .load()
        .context("loading device roster")?;
    let registry = Registry::from_identities(devices);
    if registry.is_empty() {
        warn!("device roster is empty; every frame will be dropped");
    }
    info!("loaded {} devices", registry.len());

    let pipeline = Pipeline::with_json_decoder(registry);
    let conn = ingest::connect(&config.mqtt, pipeline.router.clone()).await?;

    let auth = api::authorizer(&config.http.api_token);
    let app = api::router(ApiState::new(&pipeline, auth), &config.http.cors_origin)
        .context("building http router")?;

    let addr = api::parse_addr(&config.http.listen)
        .with_context(|| format!("invalid listen address {}", config.http.listen))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("serving on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    conn.close().await?;
    Ok(())
}
