use color_eyre::{eyre::eyre, Result};
use feeder_session::backends::memory::MemoryBackend;
use feeder_session::mqtt::MqttTransport;
use feeder_session::config::ConfigSource;
use feeder_session::{AppConfig, Backends, ConnectionSupervisor, MessageRouter, TaskSupervisor};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let (config, source) = AppConfig::load().await?;
    setup_logging(config.logging.max_level()?)?;
    match &source {
        ConfigSource::File(_) => info!("Using {}", source),
        ConfigSource::Defaults { .. } => warn!("Using {}", source),
    }

    info!(
        "Starting feeder session against {}:{}",
        config.broker.host, config.broker.port
    );

    let (transport, publisher) = MqttTransport::new(&config.broker);
    let backends = Backends::shared(Arc::new(MemoryBackend::new()));
    let router = Arc::new(MessageRouter::new(
        config.topics.clone(),
        Arc::new(publisher),
        backends,
    ));
    let tasks = TaskSupervisor::new();

    let supervisor = ConnectionSupervisor::new(
        Box::new(transport),
        config.session.clone(),
        config.topics.subscription.clone(),
        router,
        tasks.clone(),
    );

    tokio::select! {
        _ = supervisor.run() => {
            warn!("Connection supervisor returned unexpectedly");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| eyre!("Failed to listen for shutdown signal: {}", e))?;
            info!("Shutdown requested");
        }
    }

    if !tasks.shutdown(config.session.drain_grace()).await {
        warn!("Exiting with {} message units still running", tasks.in_flight());
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;
    Ok(())
}
