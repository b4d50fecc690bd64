use async_trait::async_trait;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::settings::DatabaseOutputConfig;
use crate::devices::Reading;
use crate::output::ReadingSink;
use crate::storage::models::{finite_or_null, FlowDataRow};
use crate::utils::error::ModbusError;

const IN_MEMORY: &str = ":memory:";

/// Durable store for readings; also the source of "latest reading" lookups.
#[derive(Clone)]
pub struct SqliteManager {
    pool: SqlitePool,
    database_path: String,
}

impl SqliteManager {
    pub async fn new(config: &DatabaseOutputConfig) -> Result<Self, ModbusError> {
        info!("🗄️  Initializing SQLite database: {}", config.database_path);

        let pool = if config.database_path == IN_MEMORY {
            // one connection, kept forever: every new connection would see an empty database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            if let Some(parent) = Path::new(&config.database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        ModbusError::Database(format!("failed to create database directory: {}", e))
                    })?;
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true)
                .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
                .journal_mode(if config.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                });

            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options)
                .await?
        };

        let manager = Self {
            pool,
            database_path: config.database_path.clone(),
        };
        manager.initialize_schema().await?;

        info!("✅ SQLite database initialized successfully");
        Ok(manager)
    }

    async fn initialize_schema(&self) -> Result<(), ModbusError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flow_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                meter_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                mass_flow REAL,
                mass_total REAL,
                volume_flow REAL,
                volume_total REAL,
                density REAL,
                temperature REAL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_flow_data_meter_time ON flow_data(meter_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_reading(&self, reading: &Reading) -> Result<i64, ModbusError> {
        let result = sqlx::query(
            r#"
            INSERT INTO flow_data (
                meter_id, timestamp, mass_flow, mass_total,
                volume_flow, volume_total, density, temperature
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(reading.meter_id as i64)
        .bind(reading.timestamp)
        .bind(finite_or_null(reading.mass_flow))
        .bind(finite_or_null(reading.mass_total))
        .bind(finite_or_null(reading.volume_flow))
        .bind(finite_or_null(reading.volume_total))
        .bind(finite_or_null(reading.density))
        .bind(finite_or_null(reading.temperature))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn latest_reading(&self, meter_id: u8) -> Result<Option<Reading>, ModbusError> {
        let row = sqlx::query_as::<_, FlowDataRow>(
            r#"
            SELECT * FROM flow_data
            WHERE meter_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
        "#,
        )
        .bind(meter_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FlowDataRow::into_reading))
    }

    pub async fn count_readings(&self, meter_id: u8) -> Result<i64, ModbusError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flow_data WHERE meter_id = ?")
            .bind(meter_id as i64)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        info!("🔒 Closing SQLite database connections");
        self.pool.close().await;
    }
}

#[async_trait]
impl ReadingSink for SqliteManager {
    async fn accept(&self, reading: &Reading) -> Result<(), ModbusError> {
        self.insert_reading(reading).await?;
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "sqlite"
    }

    fn destination(&self) -> &str {
        &self.database_path
    }
}
