use log::{debug, error, info, warn};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

/// Byte-level access to the half-duplex line the devices share.
///
/// Every operation on a transport that is not open fails fast with
/// [`ModbusError::Transport`] instead of blocking.
pub trait Transport: Send {
    /// Opens the line. A no-op when it is already open.
    fn open(&mut self) -> Result<(), ModbusError>;

    fn is_open(&self) -> bool;

    fn write(&mut self, bytes: &[u8]) -> Result<(), ModbusError>;

    /// Reads at most `buf.len()` bytes, waiting no longer than `timeout`.
    /// `Ok(0)` means nothing arrived in time.
    fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ModbusError>;

    /// Drops whatever is sitting in the receive buffer.
    fn clear_input(&mut self) -> Result<(), ModbusError> {
        Ok(())
    }

    fn close(&mut self);

    fn reset(&mut self) -> Result<(), ModbusError> {
        self.close();
        self.open()
    }
}

pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
    read_timeout: Duration,
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
        let read_timeout = Duration::from_millis(config.read_timeout_ms);
        Self {
            config,
            port: None,
            read_timeout,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.config.port
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, ModbusError> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(ModbusError::Transport(format!(
                "serial port {} is not open",
                self.config.port
            ))),
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), ModbusError> {
        if self.port.is_some() {
            return Ok(());
        }

        info!("🔌 Opening serial port: {}", self.config.port);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, 1 stop bit, parity {:?}",
            self.config.baud_rate, self.config.parity
        );

        let serial_parity = match self.config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(Duration::from_millis(self.config.read_timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", self.config.port, e);
                ModbusError::Transport(format!("failed to open {}: {}", self.config.port, e))
            })?;

        self.read_timeout = Duration::from_millis(self.config.read_timeout_ms);
        self.port = Some(port);
        info!("✅ Serial port {} opened", self.config.port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ModbusError> {
        let port = self.port_mut()?;
        port.write_all(bytes)
            .map_err(|e| ModbusError::Io(format!("write failed: {}", e)))?;
        port.flush()
            .map_err(|e| ModbusError::Io(format!("flush failed: {}", e)))?;
        debug!("📤 Sent {} bytes: {}", bytes.len(), hex::encode_upper(bytes));
        Ok(())
    }

    fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ModbusError> {
        let needs_timeout_update = self.read_timeout != timeout;
        let port = self.port_mut()?;

        if needs_timeout_update {
            port.set_timeout(timeout)?;
        }
        self.read_timeout = timeout;

        let port = self.port_mut()?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(0)
            }
            Err(e) => Err(ModbusError::Io(format!("read failed: {}", e))),
        }
    }

    fn clear_input(&mut self) -> Result<(), ModbusError> {
        let port = self.port_mut()?;
        port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("🔒 Serial port {} closed", self.config.port);
        }
    }

    fn reset(&mut self) -> Result<(), ModbusError> {
        warn!("🔄 Resetting serial port {}", self.config.port);
        self.close();
        self.open()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serial ports visible on this host, with USB details when available.
pub fn available_ports() -> Result<Vec<(String, Option<String>)>, ModbusError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let detail = match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => usb.manufacturer.or(usb.product),
                _ => None,
            };
            (port.port_name, detail)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_port() -> SerialConfig {
        SerialConfig {
            port: "/dev/flow-poller-missing-port".to_string(),
            ..SerialConfig::default()
        }
    }

    #[test]
    fn test_not_open_fails_fast() {
        let mut transport = SerialTransport::new(missing_port());
        assert!(!transport.is_open());

        let mut buf = [0u8; 8];
        assert!(matches!(
            transport.read_up_to(&mut buf, Duration::from_millis(10)),
            Err(ModbusError::Transport(_))
        ));
        assert!(matches!(transport.write(&[0x01]), Err(ModbusError::Transport(_))));
        assert!(matches!(transport.clear_input(), Err(ModbusError::Transport(_))));
    }

    #[test]
    fn test_open_failure_leaves_transport_not_ready() {
        let mut transport = SerialTransport::new(missing_port());
        assert!(matches!(transport.open(), Err(ModbusError::Transport(_))));
        assert!(!transport.is_open());
        assert!(transport.reset().is_err());
        assert!(!transport.is_open());
    }
}
