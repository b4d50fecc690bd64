use anyhow::Result;
use log::{error, info, LevelFilter};
use std::time::Duration;

use flow_poller::cli::{self, commands, DEFAULT_CONFIG_PATH};
use flow_poller::config::Config;
use flow_poller::services::DeviceStatusRegistry;
#[cfg(feature = "api")]
use flow_poller::services::{ApiService, ApiServiceState};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config = Config::load_or_default(config_path)?;
    config.apply_matches(&matches)?;

    if commands::handle_subcommands(&matches, &config).await? {
        return Ok(());
    }

    run(config).await
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp_millis().init();
}

async fn run(config: Config) -> Result<()> {
    info!("🚀 Flow poller v{} starting", flow_poller::VERSION);
    info!(
        "⚙️  Serial {} @ {} baud, devices {:?}, every {}s",
        config.serial.port,
        config.serial.baud_rate,
        config.device_ids(),
        config.polling.interval_seconds
    );

    let registry = DeviceStatusRegistry::new();
    let mut scheduler = commands::build_scheduler(&config, registry.clone());

    #[cfg(feature = "sqlite")]
    let database = commands::open_database(&config).await?;
    #[cfg(feature = "sqlite")]
    if let Some(db) = &database {
        scheduler.add_sink(Box::new(db.clone()));
    }

    #[cfg(feature = "api")]
    let mut api_service = if config.api.enabled {
        let mut service = ApiService::new(ApiServiceState::new(registry.clone(), database.clone()));
        service.start(&config.api.bind_address, config.api.port).await?;
        Some(service)
    } else {
        None
    };

    let period = Duration::from_secs(config.polling.interval_seconds);
    scheduler.run(period, shutdown_signal()).await;

    #[cfg(feature = "api")]
    if let Some(service) = api_service.as_mut() {
        service.stop().await?;
    }

    #[cfg(feature = "sqlite")]
    if let Some(db) = &database {
        db.close().await;
    }

    info!("👋 Flow poller stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => {
            error!("❌ Cannot listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
