use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::devices::Reading;

/// Row of the `flow_data` table. Fields the decoder could not resolve to a
/// finite value are stored as NULL.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FlowDataRow {
    pub id: i64,
    pub meter_id: i64,
    pub timestamp: DateTime<Utc>,
    pub mass_flow: Option<f64>,
    pub mass_total: Option<f64>,
    pub volume_flow: Option<f64>,
    pub volume_total: Option<f64>,
    pub density: Option<f64>,
    pub temperature: Option<f64>,
}

pub fn finite_or_null(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl FlowDataRow {
    pub fn into_reading(self) -> Reading {
        let or_nan = |v: Option<f64>| v.unwrap_or(f64::NAN);
        Reading {
            meter_id: self.meter_id as u8,
            timestamp: self.timestamp,
            mass_flow: or_nan(self.mass_flow),
            mass_total: or_nan(self.mass_total),
            volume_flow: or_nan(self.volume_flow),
            volume_total: or_nan(self.volume_total),
            density: or_nan(self.density),
            temperature: or_nan(self.temperature),
        }
    }
}
