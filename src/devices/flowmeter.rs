use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::decoder::{decode_float32, decode_float32_with_order, WordOrder};
use crate::modbus::protocol::expected_response_len;
use crate::utils::error::ModbusError;

/// First input register of the measurement block (register 40168 in the device manual).
pub const FLOWMETER_START_REGISTER: u16 = 0x00A7;

/// Six 32-bit floats, two registers each.
pub const FLOWMETER_REGISTER_COUNT: u16 = 12;

const PAYLOAD_OFFSET: usize = 3;

/// Byte offsets of each quantity inside the response frame.
pub const MASS_FLOW_OFFSET: usize = PAYLOAD_OFFSET;
pub const DENSITY_OFFSET: usize = PAYLOAD_OFFSET + 4;
pub const TEMPERATURE_OFFSET: usize = PAYLOAD_OFFSET + 8;
pub const VOLUME_FLOW_OFFSET: usize = PAYLOAD_OFFSET + 12;
pub const MASS_TOTAL_OFFSET: usize = PAYLOAD_OFFSET + 16;
pub const VOLUME_TOTAL_OFFSET: usize = PAYLOAD_OFFSET + 20;

pub const FIELD_LAYOUT: [(&str, usize); 6] = [
    ("MassFlow", MASS_FLOW_OFFSET),
    ("Density", DENSITY_OFFSET),
    ("Temperature", TEMPERATURE_OFFSET),
    ("VolumeFlow", VOLUME_FLOW_OFFSET),
    ("MassTotal", MASS_TOTAL_OFFSET),
    ("VolumeTotal", VOLUME_TOTAL_OFFSET),
];

/// JSON has no NaN. A field the decoder could not make sense of travels as
/// `null` and comes back as NaN.
mod float_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// One decoded measurement from a flowmeter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub meter_id: u8,
    pub timestamp: DateTime<Utc>,
    /// t/h
    #[serde(with = "float_or_null")]
    pub mass_flow: f64,
    /// t
    #[serde(with = "float_or_null")]
    pub mass_total: f64,
    /// m³/h
    #[serde(with = "float_or_null")]
    pub volume_flow: f64,
    /// m³
    #[serde(with = "float_or_null")]
    pub volume_total: f64,
    #[serde(with = "float_or_null")]
    pub density: f64,
    /// °C
    #[serde(with = "float_or_null")]
    pub temperature: f64,
}

impl Reading {
    /// Decodes a complete response frame. Every field comes from `frame`, so a
    /// reading never mixes bytes from two exchanges.
    pub fn from_frame(
        meter_id: u8,
        frame: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ModbusError> {
        let expected = expected_response_len(FLOWMETER_REGISTER_COUNT);
        if frame.len() != expected {
            return Err(ModbusError::ShortResponse {
                expected,
                received: frame.len(),
            });
        }

        Ok(Self {
            meter_id,
            timestamp,
            mass_flow: decode_float32(frame, MASS_FLOW_OFFSET),
            density: decode_float32(frame, DENSITY_OFFSET),
            temperature: decode_float32(frame, TEMPERATURE_OFFSET),
            volume_flow: decode_float32(frame, VOLUME_FLOW_OFFSET),
            mass_total: decode_float32(frame, MASS_TOTAL_OFFSET),
            volume_total: decode_float32(frame, VOLUME_TOTAL_OFFSET),
        })
    }

    pub fn parameters(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("MassFlow", self.mass_flow),
            ("Density", self.density),
            ("Temperature", self.temperature),
            ("VolumeFlow", self.volume_flow),
            ("MassTotal", self.mass_total),
            ("VolumeTotal", self.volume_total),
        ]
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Meter {} @ {}: MassFlow={:.3} t/h, Density={:.4}, Temp={:.2}°C, VolumeFlow={:.3} m³/h, MassTotal={:.3} t, VolumeTotal={:.3} m³",
            self.meter_id,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.mass_flow,
            self.density,
            self.temperature,
            self.volume_flow,
            self.mass_total,
            self.volume_total
        )
    }
}

/// Per-field breakdown of a raw frame, for diagnosing word-order problems.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDump {
    pub name: &'static str,
    pub offset: usize,
    pub raw_hex: String,
    pub value: f64,
    pub order: WordOrder,
}

pub fn dump_fields(frame: &[u8]) -> Vec<FieldDump> {
    FIELD_LAYOUT
        .iter()
        .map(|&(name, offset)| {
            let raw = frame.get(offset..offset + 4).unwrap_or(&[]);
            let (value, order) = decode_float32_with_order(frame, offset);
            FieldDump {
                name,
                offset,
                raw_hex: hex::encode_upper(raw),
                value,
                order,
            }
        })
        .collect()
}
