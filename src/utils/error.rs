use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModbusError {
    /// The serial port could not be opened, or an operation hit a port that is not open.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A write or read failed in the middle of an exchange.
    #[error("I/O error: {0}")]
    Io(String),

    /// The response length differed from the expected one, in either direction.
    #[error("Response length mismatch: expected {expected} bytes, received {received}")]
    ShortResponse { expected: usize, received: usize },

    #[error("Device {device_id}: all {attempts} attempts failed")]
    RetryExhausted { device_id: u8, attempts: u32 },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sink error: {0}")]
    Sink(String),
}

impl ModbusError {
    /// Errors worth a transport reset and another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModbusError::Io(_) | ModbusError::ShortResponse { .. })
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for ModbusError {
    fn from(err: sqlx::Error) -> Self {
        ModbusError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        ModbusError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::Io(err.to_string())
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ModbusError::Io("broken pipe".into()).is_retryable());
        assert!(ModbusError::ShortResponse { expected: 29, received: 10 }.is_retryable());
        assert!(!ModbusError::Transport("no such port".into()).is_retryable());
        assert!(!ModbusError::InvalidFrame("count".into()).is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ModbusError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, ModbusError::Io(_)));
    }
}
