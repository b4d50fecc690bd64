use anyhow::{anyhow, Result};
use clap::ArgMatches;
use log::info;

use crate::config::Config;
use crate::devices::flowmeter::dump_fields;
use crate::modbus::{available_ports, SerialTransport};
use crate::output::{ConsoleSink, FileSink};
use crate::services::{DeviceStatusRegistry, PollScheduler, RetryingPoller};
#[cfg(feature = "sqlite")]
use crate::storage::SqliteManager;

/// Scheduler over the configured serial line with the console and file sinks
/// attached. The database sink is attached separately, see [`open_database`].
pub fn build_scheduler(config: &Config, registry: DeviceStatusRegistry) -> PollScheduler<SerialTransport> {
    let transport = SerialTransport::new(config.serial.clone());
    let poller = RetryingPoller::from_config(transport, config);
    let mut scheduler = PollScheduler::new(poller, registry, config.device_ids());

    if config.output.console {
        scheduler.add_sink(Box::new(ConsoleSink));
    }
    if let Some(path) = config.file_output_path() {
        scheduler.add_sink(Box::new(FileSink::new(path)));
    }

    scheduler
}

#[cfg(feature = "sqlite")]
pub async fn open_database(config: &Config) -> Result<Option<SqliteManager>> {
    match config.database_output() {
        Some(db_config) => Ok(Some(SqliteManager::new(db_config).await?)),
        None => Ok(None),
    }
}

/// Returns `Ok(true)` when a one-shot subcommand ran and the process should exit.
pub async fn handle_subcommands(matches: &ArgMatches, config: &Config) -> Result<bool> {
    match matches.subcommand() {
        Some(("once", _)) => {
            run_once(config).await?;
            Ok(true)
        }
        Some(("probe", sub)) => {
            let device_id = *sub
                .get_one::<u8>("device")
                .ok_or_else(|| anyhow!("--device is required"))?;
            probe(config, device_id).await?;
            Ok(true)
        }
        Some(("ports", _)) => {
            list_ports()?;
            Ok(true)
        }
        Some(("init-config", sub)) => {
            let path = sub
                .get_one::<String>("path")
                .ok_or_else(|| anyhow!("a path is required"))?;
            Config::default().save_to_file(path)?;
            println!("✅ Default configuration written to {}", path);
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn run_once(config: &Config) -> Result<()> {
    info!("🔍 Executing single poll cycle...");
    let registry = DeviceStatusRegistry::new();
    let mut scheduler = build_scheduler(config, registry.clone());

    #[cfg(feature = "sqlite")]
    let database = open_database(config).await?;
    #[cfg(feature = "sqlite")]
    if let Some(db) = &database {
        scheduler.add_sink(Box::new(db.clone()));
    }

    let summary = scheduler.run_cycle().await;

    println!("📊 Poll summary ({} devices)", summary.polled());
    for status in registry.snapshot() {
        println!(
            "   Device {:>3}: {}",
            status.meter_id,
            if status.online { "🟢 online" } else { "🔴 offline" }
        );
    }

    #[cfg(feature = "sqlite")]
    if let Some(db) = &database {
        db.close().await;
    }
    Ok(())
}

async fn probe(config: &Config, device_id: u8) -> Result<()> {
    info!("🔍 Probing device {}...", device_id);
    let transport = SerialTransport::new(config.serial.clone());
    let mut poller = RetryingPoller::from_config(transport, config);

    let frame = poller.read_raw(device_id).await.map_err(|failure| {
        anyhow!("{} (last error: {})", failure.as_error(), failure.cause)
    })?;

    println!("📥 Device {} answered with {} bytes", device_id, frame.len());
    println!("   {}", hex::encode_upper(&frame));
    println!();
    println!("   {:<14} {:>6}  {:<10} {:>16}  {:?}", "field", "offset", "raw", "value", "order");
    for field in dump_fields(&frame) {
        println!(
            "   {:<14} {:>6}  {:<10} {:>16.4}  {:?}",
            field.name, field.offset, field.raw_hex, field.value, field.order
        );
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = available_ports()?;
    println!("📡 Available Serial Ports:");
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
        return Ok(());
    }

    for (index, (name, description)) in ports.iter().enumerate() {
        match description {
            Some(description) => println!("   {}. {} ({})", index + 1, name, description),
            None => println!("   {}. {}", index + 1, name),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_cli;

    #[tokio::test]
    async fn test_init_config_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.toml");
        let path_str = path.to_string_lossy().to_string();

        let matches = build_cli()
            .try_get_matches_from(["flow_poller", "init-config", path_str.as_str()])
            .unwrap();
        let handled = handle_subcommands(&matches, &Config::default()).await.unwrap();

        assert!(handled);
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.polling.device_ids, Config::default().polling.device_ids);
    }

    #[tokio::test]
    async fn test_run_is_not_a_one_shot_command() {
        let matches = build_cli().try_get_matches_from(["flow_poller"]).unwrap();
        assert!(!handle_subcommands(&matches, &Config::default()).await.unwrap());

        let matches = build_cli().try_get_matches_from(["flow_poller", "run"]).unwrap();
        assert!(!handle_subcommands(&matches, &Config::default()).await.unwrap());
    }

    #[test]
    fn test_build_scheduler_uses_configured_devices() {
        let mut config = Config::default();
        config.polling.device_ids = vec![4, 2, 4];
        let scheduler = build_scheduler(&config, DeviceStatusRegistry::new());
        assert_eq!(scheduler.device_ids(), &[2, 4]);
    }
}
