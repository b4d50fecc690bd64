use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer, Result as ActixResult};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use crate::services::status::DeviceStatusRegistry;
use crate::storage::SqliteManager;
use crate::utils::error::ModbusError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct ApiServiceState {
    pub registry: DeviceStatusRegistry,
    /// Absent when database output is disabled; `/current` then has nothing to serve.
    pub sqlite_manager: Option<SqliteManager>,
}

impl ApiServiceState {
    pub fn new(registry: DeviceStatusRegistry, sqlite_manager: Option<SqliteManager>) -> Self {
        Self {
            registry,
            sqlite_manager,
        }
    }
}

pub struct ApiService {
    state: ApiServiceState,
    server_handle: Option<actix_web::dev::ServerHandle>,
}

impl ApiService {
    pub fn new(state: ApiServiceState) -> Self {
        Self {
            state,
            server_handle: None,
        }
    }

    pub async fn start(&mut self, bind_address: &str, port: u16) -> Result<(), ModbusError> {
        info!("🌐 Starting HTTP API server on {}:{}", bind_address, port);

        let state_data = web::Data::new(self.state.clone());

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state_data.clone())
                .wrap(Logger::default())
                .configure(configure_routes)
        })
        .bind((bind_address, port))?
        .run();

        self.server_handle = Some(server.handle());

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("❌ HTTP API server error: {}", e);
            }
        });

        info!("✅ HTTP API server started on {}:{}", bind_address, port);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), ModbusError> {
        info!("🛑 Stopping HTTP API server...");

        if let Some(handle) = self.server_handle.take() {
            tokio::select! {
                _ = handle.stop(true) => {
                    info!("✅ HTTP API server stopped gracefully");
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(10)) => {
                    warn!("⚠️  HTTP API server shutdown timeout, forcing stop");
                    handle.stop(false).await;
                }
            }
        }

        Ok(())
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/flow/status", web::get().to(list_status))
            .route("/flow/{meter_id}/status", web::get().to(device_status))
            .route("/flow/{meter_id}/current", web::get().to(current_reading)),
    );
}

// GET /api/health
async fn health_check() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Flow Poller API",
        "timestamp": Utc::now(),
        "version": crate::VERSION
    })))
}

// GET /api/flow/status
async fn list_status(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let devices = state.registry.snapshot();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": devices.len(),
        "devices": devices,
        "timestamp": Utc::now()
    })))
}

// GET /api/flow/{meter_id}/status
async fn device_status(
    path: web::Path<u8>,
    state: web::Data<ApiServiceState>,
) -> ActixResult<HttpResponse> {
    let meter_id = path.into_inner();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "meter_id": meter_id,
        "online": state.registry.is_online(meter_id)
    })))
}

// GET /api/flow/{meter_id}/current
async fn current_reading(
    path: web::Path<u8>,
    state: web::Data<ApiServiceState>,
) -> ActixResult<HttpResponse> {
    let meter_id = path.into_inner();

    let Some(manager) = &state.sqlite_manager else {
        return Ok(HttpResponse::ServiceUnavailable().json(ErrorResponse::new(
            "Database output is disabled",
            "DATABASE_DISABLED",
        )));
    };

    match manager.latest_reading(meter_id).await {
        Ok(Some(reading)) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "online": state.registry.is_online(meter_id),
            "reading": reading,
            "timestamp": Utc::now()
        }))),
        Ok(None) => Ok(HttpResponse::NotFound().json(ErrorResponse::new(
            format!("No reading stored for meter {}", meter_id),
            "READING_NOT_FOUND",
        ))),
        Err(e) => {
            error!("❌ Failed to fetch latest reading for meter {}: {}", meter_id, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(
                "Failed to fetch reading",
                "DATABASE_ERROR",
            )))
        }
    }
}
