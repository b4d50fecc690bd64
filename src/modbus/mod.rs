pub mod crc;
pub mod protocol;
pub mod reader;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use crc::{crc16_modbus, crc_bytes};
pub use protocol::{expected_response_len, RequestFrame, READ_INPUT_REGISTERS};
pub use reader::{inter_frame_silence, FrameReader, ReadOutcome};
pub use transport::{available_ports, SerialTransport, Transport};
