use async_trait::async_trait;
use log::{error, info};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::devices::Reading;
use crate::utils::error::ModbusError;

/// Destination for decoded readings.
///
/// The scheduler hands each successful reading to every sink and only logs a
/// failure; delivery guarantees belong to the sink.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn accept(&self, reading: &Reading) -> Result<(), ModbusError>;
    fn sink_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSink;

#[async_trait]
impl ReadingSink for ConsoleSink {
    async fn accept(&self, reading: &Reading) -> Result<(), ModbusError> {
        info!("📊 {}", reading);
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "log"
    }
}

/// Appends one JSON document per line.
pub struct FileSink {
    path: PathBuf,
    display: String,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let display = path.to_string_lossy().to_string();
        Self { path, display }
    }
}

#[async_trait]
impl ReadingSink for FileSink {
    async fn accept(&self, reading: &Reading) -> Result<(), ModbusError> {
        let mut line = serde_json::to_string(reading)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                error!("❌ Failed to open file {}: {}", self.display, e);
                ModbusError::Sink(format!("file open error: {}", e))
            })?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ModbusError::Sink(format!("file write error: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ModbusError::Sink(format!("file flush error: {}", e)))?;
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.display
    }
}
