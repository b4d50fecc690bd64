use std::fmt;

use super::crc::crc_bytes;
use crate::utils::error::ModbusError;

pub const READ_INPUT_REGISTERS: u8 = 0x04;

/// Largest register count whose response still fits the 256-byte receive buffer.
pub const MAX_REGISTER_COUNT: u16 = 125;

pub const REQUEST_FRAME_LEN: usize = 8;

/// Address + function code + byte count + checksum.
const RESPONSE_OVERHEAD: usize = 5;

/// An 8-byte "read input registers" request, checksum included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    bytes: [u8; REQUEST_FRAME_LEN],
    register_count: u16,
}

impl RequestFrame {
    pub fn read_input_registers(
        device_id: u8,
        start_register: u16,
        register_count: u16,
    ) -> Result<Self, ModbusError> {
        if device_id == 0 {
            return Err(ModbusError::InvalidFrame(
                "device address 0 is the broadcast address".to_string(),
            ));
        }
        if register_count == 0 || register_count > MAX_REGISTER_COUNT {
            return Err(ModbusError::InvalidFrame(format!(
                "register count {} outside 1..={}",
                register_count, MAX_REGISTER_COUNT
            )));
        }

        let start = start_register.to_be_bytes();
        let count = register_count.to_be_bytes();
        let mut bytes = [
            device_id,
            READ_INPUT_REGISTERS,
            start[0],
            start[1],
            count[0],
            count[1],
            0,
            0,
        ];
        let crc = crc_bytes(&bytes[..6]);
        bytes[6] = crc[0];
        bytes[7] = crc[1];

        Ok(Self { bytes, register_count })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn device_id(&self) -> u8 {
        self.bytes[0]
    }

    pub fn register_count(&self) -> u16 {
        self.register_count
    }

    pub fn expected_response_len(&self) -> usize {
        expected_response_len(self.register_count)
    }
}

impl fmt::Display for RequestFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.bytes))
    }
}

pub fn expected_response_len(register_count: u16) -> usize {
    RESPONSE_OVERHEAD + 2 * register_count as usize
}
