use anyhow::Context;
use bridge::{Config, OfflineMsk, ServiceDefinition};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;

    let definition_path = std::env::var("OFFLINE_MSK_SERVICE_DEFINITION")
        .unwrap_or("serverless.json".to_string());
    let service = ServiceDefinition::load(&definition_path)
        .with_context(|| format!("loading service definition {}", definition_path))?;

    tracing::info!(
        brokers = %config.client.brokers.join(","),
        endpoint = %config.invoker.endpoint(),
        functions = service.functions.len(),
        "Starting offline MSK"
    );

    let plugin = OfflineMsk::from_config(&config, service).await;
    plugin.on_service_start();

    wait_for_signal().await?;

    plugin.on_service_stop().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => tracing::info!("Received SIGTERM"),
        _ = int.recv() => tracing::info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(windows)]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received SIGINT");
    Ok(())
}
