//! Scripted transport for exercising the poller without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::transport::Transport;
use crate::utils::error::ModbusError;

/// What the simulated device does in reply to one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Bytes delivered in the given chunks, then silence.
    Chunks(Vec<Vec<u8>>),
    /// The write itself fails.
    WriteError,
    /// The first read fails with an I/O error.
    ReadError,
}

impl Reply {
    pub fn frame(bytes: Vec<u8>) -> Self {
        Reply::Chunks(vec![bytes])
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub replies: VecDeque<Reply>,
    pub pending: VecDeque<Vec<u8>>,
    pub pending_read_error: bool,
    pub fail_open: bool,
    pub open: bool,
    pub open_calls: u32,
    pub close_calls: u32,
    pub writes: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn with_replies(replies: Vec<Reply>) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().replies = replies.into();
        transport
    }

    pub fn failing_open() -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().fail_open = true;
        transport
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn open_calls(&self) -> u32 {
        self.state.lock().unwrap().open_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.state.lock().unwrap().close_calls
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), ModbusError> {
        let mut state = self.state.lock().unwrap();
        if state.open {
            return Ok(());
        }
        state.open_calls += 1;
        if state.fail_open {
            return Err(ModbusError::Transport("mock port unavailable".to_string()));
        }
        state.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ModbusError> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(ModbusError::Transport("mock port not open".to_string()));
        }
        state.writes.push(bytes.to_vec());
        state.pending.clear();
        state.pending_read_error = false;

        match state.replies.pop_front() {
            Some(Reply::Chunks(chunks)) => {
                state.pending = chunks.into();
                Ok(())
            }
            Some(Reply::WriteError) => Err(ModbusError::Io("mock write failure".to_string())),
            Some(Reply::ReadError) => {
                state.pending_read_error = true;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn read_up_to(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, ModbusError> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(ModbusError::Transport("mock port not open".to_string()));
        }
        if state.pending_read_error {
            state.pending_read_error = false;
            return Err(ModbusError::Io("mock read failure".to_string()));
        }

        let Some(mut chunk) = state.pending.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            state.pending.push_front(chunk);
        }
        Ok(n)
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.open {
            state.open = false;
            state.close_calls += 1;
        }
    }
}

/// A well-formed 12-register response carrying the six given values in natural order.
pub fn response_frame(device_id: u8, values: [f32; 6]) -> Vec<u8> {
    let mut frame = vec![device_id, 0x04, 24];
    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }
    let crc = super::crc::crc_bytes(&frame);
    frame.extend_from_slice(&crc);
    frame
}
