use clap::Parser;
use leak_limit::CancellationToken;
use leak_server::cli::Cli;
use tower::BoxError;
use tracing::info;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    leak_server::telemetry::init_tracing(cli.log_filter.as_deref(), cli.json_logs)?;
    let config = cli.service_config()?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    leak_server::run(config, shutdown).await?;
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("shutdown requested");
            shutdown.cancel();
        }
        Err(err) => warn!(%err, "unable to listen for shutdown signal"),
    }
}
