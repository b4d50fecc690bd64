//! Modbus RTU flowmeter poller.
//!
//! Polls a set of flowmeters over one RS-485 line with function 0x04, decodes
//! the six float fields of each answer, and keeps a registry of which devices
//! answered in the latest cycle. Readings go to pluggable sinks (console, JSON
//! lines file, SQLite) and the registry is served over a small HTTP API.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
#[cfg(feature = "sqlite")]
pub mod storage;
pub mod utils;

pub use config::Config;
pub use devices::Reading;
pub use modbus::{RequestFrame, SerialTransport, Transport};
pub use output::ReadingSink;
pub use services::{DeviceStatusRegistry, PollScheduler, RetryingPoller, StatusQuery};
pub use utils::error::ModbusError;
#[cfg(feature = "sqlite")]
pub use storage::SqliteManager;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
