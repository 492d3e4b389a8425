use anyhow::Context;
use session_client::config::load_client_config;
use session_client::SessionClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_client_config()?;
    let client = SessionClient::from_config(config)?;

    let status = client.verify_stored_sessions().await;
    info!(
        admin = status.admin,
        lawyer = status.lawyer,
        user_type = %status.user_type,
        "session status"
    );

    let sweeper = client.start_sweeper();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    let report = sweeper.shutdown().await;
    info!(expired = ?report.expired, "teardown sweep finished");

    if let Some(metrics) = client.metrics() {
        let rendered = metrics.render().context("Failed to render metrics")?;
        println!("{rendered}");
    }
    Ok(())
}
