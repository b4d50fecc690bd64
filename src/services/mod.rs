pub mod poller;
pub mod scheduler;
pub mod status;
#[cfg(feature = "api")]
pub mod api_service;

pub use poller::{AttemptOutcome, PollFailure, PollOutcome, PollState, RetryPolicy, RetryingPoller};
pub use scheduler::{CycleSummary, PollScheduler};
pub use status::{DeviceStatus, DeviceStatusRegistry, StatusQuery};
#[cfg(feature = "api")]
pub use api_service::{ApiService, ApiServiceState};
