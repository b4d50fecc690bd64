use chrono::Utc;
use log::{debug, error, info, warn};
use std::time::Duration;

use crate::config::Config;
use crate::devices::flowmeter::{Reading, FLOWMETER_REGISTER_COUNT};
use crate::modbus::{inter_frame_silence, FrameReader, ReadOutcome, RequestFrame, Transport};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per poll, the first one included.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Result of a single request/response exchange.
#[derive(Debug)]
pub enum AttemptOutcome {
    Complete(Vec<u8>),
    ShortResponse { expected: usize, received: usize },
    IoError(ModbusError),
}

/// Where a poll stands between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Attempting(u32),
    RetryPending(u32),
    Success,
    Exhausted,
}

#[derive(Debug)]
pub struct PollFailure {
    pub device_id: u8,
    pub attempts: u32,
    pub cause: ModbusError,
}

impl PollFailure {
    pub fn is_transport_error(&self) -> bool {
        matches!(self.cause, ModbusError::Transport(_))
    }

    pub fn as_error(&self) -> ModbusError {
        ModbusError::RetryExhausted {
            device_id: self.device_id,
            attempts: self.attempts,
        }
    }
}

#[derive(Debug)]
pub enum PollOutcome {
    Success(Reading),
    Exhausted(PollFailure),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success(_))
    }
}

/// Runs one device's request/response exchange with bounded retries.
///
/// The poller owns the transport outright; nothing else touches the line while
/// a poll is in flight.
pub struct RetryingPoller<T: Transport> {
    transport: T,
    reader: FrameReader,
    policy: RetryPolicy,
    start_register: u16,
    register_count: u16,
}

impl<T: Transport> RetryingPoller<T> {
    pub fn new(transport: T, reader: FrameReader, policy: RetryPolicy, start_register: u16) -> Self {
        Self {
            transport,
            reader,
            policy,
            start_register,
            register_count: FLOWMETER_REGISTER_COUNT,
        }
    }

    pub fn from_config(transport: T, config: &Config) -> Self {
        let reader = FrameReader::new(
            Duration::from_millis(config.serial.read_timeout_ms),
            Duration::from_millis(config.polling.response_timeout_ms),
        )
        .with_trailing_silence(inter_frame_silence(config.serial.baud_rate));
        let policy = RetryPolicy {
            max_attempts: config.polling.max_attempts,
            backoff: Duration::from_millis(config.polling.retry_delay_ms),
        };
        Self::new(transport, reader, policy, config.polling.start_register)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Polls one device. Never returns an error: every failure ends up in
    /// [`PollOutcome::Exhausted`] so the caller can carry on with the next device.
    pub async fn poll_once(&mut self, device_id: u8) -> PollOutcome {
        match self.read_raw(device_id).await {
            Ok(frame) => match Reading::from_frame(device_id, &frame, Utc::now()) {
                Ok(reading) => PollOutcome::Success(reading),
                Err(cause) => PollOutcome::Exhausted(PollFailure {
                    device_id,
                    attempts: 1,
                    cause,
                }),
            },
            Err(failure) => PollOutcome::Exhausted(failure),
        }
    }

    /// Same retrying exchange as [`poll_once`](Self::poll_once), but hands back
    /// the raw response frame.
    pub async fn read_raw(&mut self, device_id: u8) -> Result<Vec<u8>, PollFailure> {
        let request = RequestFrame::read_input_registers(
            device_id,
            self.start_register,
            self.register_count,
        )
        .map_err(|cause| PollFailure {
            device_id,
            attempts: 0,
            cause,
        })?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = PollState::Idle;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Device {}: {:?} -> {:?}", device_id, state, PollState::Attempting(attempt));
            state = PollState::Attempting(attempt);

            if let Err(cause) = self.transport.open() {
                error!("❌ Device {}: transport unavailable: {}", device_id, cause);
                debug!("Device {}: {:?} -> {:?}", device_id, state, PollState::Exhausted);
                return Err(PollFailure {
                    device_id,
                    attempts: attempt,
                    cause,
                });
            }

            let cause = match self.exchange(&request) {
                AttemptOutcome::Complete(frame) => {
                    debug!("Device {}: {:?} -> {:?}", device_id, state, PollState::Success);
                    if attempt > 1 {
                        info!("✅ Device {} answered on attempt {}", device_id, attempt);
                    }
                    return Ok(frame);
                }
                AttemptOutcome::ShortResponse { expected, received } => {
                    ModbusError::ShortResponse { expected, received }
                }
                AttemptOutcome::IoError(err) => err,
            };

            if attempt >= max_attempts {
                error!(
                    "❌ Device {}: giving up after {} attempts, last error: {}",
                    device_id, attempt, cause
                );
                debug!("Device {}: {:?} -> {:?}", device_id, state, PollState::Exhausted);
                return Err(PollFailure {
                    device_id,
                    attempts: attempt,
                    cause,
                });
            }

            warn!(
                "⚠️  Device {}: attempt {}/{} failed: {}",
                device_id, attempt, max_attempts, cause
            );
            state = PollState::RetryPending(attempt);

            if let Err(e) = self.transport.reset() {
                warn!("⚠️  Device {}: transport reset failed: {}", device_id, e);
            }
            tokio::time::sleep(self.policy.backoff).await;
        }
    }

    fn exchange(&mut self, request: &RequestFrame) -> AttemptOutcome {
        let expected = request.expected_response_len();

        if let Err(e) = self.transport.clear_input() {
            return AttemptOutcome::IoError(e);
        }
        debug!("📤 Request to device {}: {}", request.device_id(), request);
        if let Err(e) = self.transport.write(request.as_bytes()) {
            return AttemptOutcome::IoError(e);
        }

        match self.reader.read_exact(&mut self.transport, expected) {
            Ok(ReadOutcome::Complete(frame)) => {
                debug!("📥 Response from device {}: {}", request.device_id(), hex::encode_upper(&frame));
                AttemptOutcome::Complete(frame)
            }
            Ok(ReadOutcome::Short(bytes)) => {
                warn!(
                    "⚠️  Device {} returned {} of {} bytes",
                    request.device_id(),
                    bytes.len(),
                    expected
                );
                AttemptOutcome::ShortResponse {
                    expected,
                    received: bytes.len(),
                }
            }
            Ok(ReadOutcome::Overlong(bytes)) => {
                warn!(
                    "⚠️  Device {} returned {} bytes, expected exactly {}",
                    request.device_id(),
                    bytes.len(),
                    expected
                );
                AttemptOutcome::ShortResponse {
                    expected,
                    received: bytes.len(),
                }
            }
            Err(e) => AttemptOutcome::IoError(e),
        }
    }
}
