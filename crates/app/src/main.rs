use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

mod config;
mod daemon;

use config::{Cli, Commands};

fn init_tracing() {
    let env = std::env::var("RAY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: Option<SocketAddr>) -> Result<()> {
    let Some(addr) = addr else { return Ok(()) };
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing Prometheus exporter on {}", addr))?;
    tracing::info!(addr = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command() {
        Commands::Crd => match ray_crd::to_yaml(&ray_crd::definition()) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => {
                error!(error = %e, "cannot render CustomResourceDefinition");
                std::process::exit(1);
            }
        },
        Commands::Run => {
            let run = async {
                init_metrics(cli.metrics_addr)?;
                daemon::run(cli.settings()).await
            };
            if let Err(e) = run.await {
                error!(error = ?e, "ray-controller failed");
                std::process::exit(1);
            }
        }
    }
}
