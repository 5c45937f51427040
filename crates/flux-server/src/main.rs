use clap::Parser;
use flux_server::{logging, metrics, AppConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    logging::init_logging(&config.logging)?;
    tracing::info!("Starting FLUX IOT telemetry server with config: {}", args.config);

    if config.metrics.enabled {
        metrics::init_metrics(config.metrics_addr()?)?;
    }

    flux_server::run(config).await
}
