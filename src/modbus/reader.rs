use bytes::BytesMut;
use log::debug;
use std::time::{Duration, Instant};

use super::transport::Transport;
use crate::utils::error::ModbusError;

/// Serial data rarely arrives as one chunk; the reader keeps asking until the
/// frame is whole, the line goes quiet, or the overall deadline passes.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Complete(Vec<u8>),
    Short(Vec<u8>),
    /// The expected length arrived but the device kept talking. Carries every
    /// byte read, trailing ones included.
    Overlong(Vec<u8>),
}

impl ReadOutcome {
    pub fn len(&self) -> usize {
        match self {
            ReadOutcome::Complete(bytes) | ReadOutcome::Short(bytes) | ReadOutcome::Overlong(bytes) => {
                bytes.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Modbus RTU frames end with 3.5 character times of silence; 11 bits per
/// character. Above 19200 baud the gap is fixed at 1.75 ms.
pub fn inter_frame_silence(baud_rate: u32) -> Duration {
    const MIN_GAP: Duration = Duration::from_micros(1750);
    if baud_rate == 0 {
        return MIN_GAP;
    }
    Duration::from_micros(38_500_000 / baud_rate as u64).max(MIN_GAP)
}

#[derive(Debug, Clone, Copy)]
pub struct FrameReader {
    per_call_timeout: Duration,
    overall_timeout: Duration,
    trailing_silence: Duration,
}

impl FrameReader {
    pub fn new(per_call_timeout: Duration, overall_timeout: Duration) -> Self {
        Self {
            per_call_timeout,
            overall_timeout,
            trailing_silence: inter_frame_silence(9600),
        }
    }

    /// How long the line must stay quiet after the last expected byte for the
    /// frame to count as complete.
    pub fn with_trailing_silence(mut self, silence: Duration) -> Self {
        self.trailing_silence = silence;
        self
    }

    pub fn read_exact<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        expected_len: usize,
    ) -> Result<ReadOutcome, ModbusError> {
        let deadline = Instant::now() + self.overall_timeout;
        let mut response = BytesMut::with_capacity(expected_len);
        let mut chunk = [0u8; 256];

        while response.len() < expected_len {
            let now = Instant::now();
            if now >= deadline {
                debug!("⏰ Response deadline passed after {} bytes", response.len());
                break;
            }

            let remaining = (expected_len - response.len()).min(chunk.len());
            let timeout = self.per_call_timeout.min(deadline - now);
            let n = transport.read_up_to(&mut chunk[..remaining], timeout)?;
            if n == 0 {
                debug!("⏰ Line went quiet after {} of {} bytes", response.len(), expected_len);
                break;
            }

            response.extend_from_slice(&chunk[..n]);
            debug!("📥 Received {} bytes ({}/{})", n, response.len(), expected_len);
        }

        if response.len() < expected_len {
            return Ok(ReadOutcome::Short(response.to_vec()));
        }

        // a frame only counts when nothing follows it
        let extra = transport.read_up_to(&mut chunk, self.trailing_silence)?;
        if extra > 0 {
            response.extend_from_slice(&chunk[..extra]);
            debug!(
                "📥 {} unexpected trailing bytes after a {}-byte frame",
                extra, expected_len
            );
            return Ok(ReadOutcome::Overlong(response.to_vec()));
        }

        Ok(ReadOutcome::Complete(response.to_vec()))
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(3000))
    }
}
