use log::{error, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use super::poller::{PollOutcome, RetryingPoller};
use super::status::DeviceStatusRegistry;
use crate::devices::Reading;
use crate::modbus::Transport;
use crate::output::ReadingSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub online: Vec<u8>,
    pub offline: Vec<u8>,
}

impl CycleSummary {
    pub fn polled(&self) -> usize {
        self.online.len() + self.offline.len()
    }
}

/// Drives poll cycles over the configured devices.
///
/// Devices share one serial line, so they are polled one after another in
/// ascending id order. How often a cycle runs is up to the caller: either call
/// [`run_cycle`](Self::run_cycle) from an external timer or use [`run`](Self::run).
pub struct PollScheduler<T: Transport> {
    poller: RetryingPoller<T>,
    registry: DeviceStatusRegistry,
    sinks: Vec<Box<dyn ReadingSink>>,
    device_ids: Vec<u8>,
}

impl<T: Transport> PollScheduler<T> {
    pub fn new(poller: RetryingPoller<T>, registry: DeviceStatusRegistry, device_ids: Vec<u8>) -> Self {
        let mut device_ids = device_ids;
        device_ids.sort_unstable();
        device_ids.dedup();
        Self {
            poller,
            registry,
            sinks: Vec::new(),
            device_ids,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn ReadingSink>) {
        info!("📤 Added {} sink to {}", sink.sink_type(), sink.destination());
        self.sinks.push(sink);
    }

    pub fn registry(&self) -> &DeviceStatusRegistry {
        &self.registry
    }

    pub fn device_ids(&self) -> &[u8] {
        &self.device_ids
    }

    pub fn poller_mut(&mut self) -> &mut RetryingPoller<T> {
        &mut self.poller
    }

    pub async fn run_cycle(&mut self) -> CycleSummary {
        info!("🔄 Polling {} devices", self.device_ids.len());
        let mut summary = CycleSummary::default();

        for i in 0..self.device_ids.len() {
            let device_id = self.device_ids[i];
            match self.poller.poll_once(device_id).await {
                PollOutcome::Success(reading) => {
                    self.registry.set_status(device_id, true);
                    info!("✅ Device {} online", device_id);
                    forward(&self.sinks, &reading).await;
                    summary.online.push(device_id);
                }
                PollOutcome::Exhausted(failure) => {
                    self.registry.set_status(device_id, false);
                    warn!(
                        "📵 Device {} offline after {} attempt(s): {}",
                        device_id, failure.attempts, failure.cause
                    );
                    summary.offline.push(device_id);
                }
            }
        }

        info!(
            "📊 Cycle finished: {} online, {} offline",
            summary.online.len(),
            summary.offline.len()
        );
        summary
    }

    /// Runs a cycle on every tick until `shutdown` resolves. A cycle in
    /// progress always completes before the loop checks for shutdown again.
    pub async fn run<F>(&mut self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("🚀 Polling every {:?}", period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Stopping poll scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }
}

async fn forward(sinks: &[Box<dyn ReadingSink>], reading: &Reading) {
    for sink in sinks {
        if let Err(e) = sink.accept(reading).await {
            error!(
                "❌ Failed to deliver reading from device {} via {} to {}: {}",
                reading.meter_id,
                sink.sink_type(),
                sink.destination(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::mock::{response_frame, MockTransport, Reply};
    use crate::modbus::FrameReader;
    use crate::services::poller::RetryPolicy;
    use crate::utils::error::ModbusError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const VALUES: [f32; 6] = [12.5, 850.25, 21.75, 3.5, 1234.5, 0.8125];

    #[derive(Clone, Default)]
    struct CollectingSink {
        readings: Arc<Mutex<Vec<Reading>>>,
    }

    #[async_trait]
    impl ReadingSink for CollectingSink {
        async fn accept(&self, reading: &Reading) -> Result<(), ModbusError> {
            self.readings.lock().unwrap().push(reading.clone());
            Ok(())
        }

        fn sink_type(&self) -> &str {
            "memory"
        }

        fn destination(&self) -> &str {
            "vec"
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ReadingSink for FailingSink {
        async fn accept(&self, _reading: &Reading) -> Result<(), ModbusError> {
            Err(ModbusError::Sink("disk full".to_string()))
        }

        fn sink_type(&self) -> &str {
            "failing"
        }

        fn destination(&self) -> &str {
            "nowhere"
        }
    }

    fn build_scheduler(transport: MockTransport, device_ids: Vec<u8>) -> (PollScheduler<MockTransport>, CollectingSink) {
        let poller = RetryingPoller::new(transport, FrameReader::default(), RetryPolicy::default(), 0x00A7);
        let mut scheduler = PollScheduler::new(poller, DeviceStatusRegistry::new(), device_ids);
        let sink = CollectingSink::default();
        scheduler.add_sink(Box::new(sink.clone()));
        (scheduler, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_polls_in_ascending_order() {
        let transport = MockTransport::with_replies(vec![
            Reply::frame(response_frame(1, VALUES)),
            Reply::frame(response_frame(2, VALUES)),
        ]);
        let (mut scheduler, sink) = build_scheduler(transport.clone(), vec![2, 1]);

        let summary = scheduler.run_cycle().await;

        assert_eq!(summary.online, vec![1, 2]);
        let addressed: Vec<u8> = transport.writes().iter().map(|w| w[0]).collect();
        assert_eq!(addressed, vec![1, 2]);
        assert!(scheduler.registry().is_online(1));
        assert!(scheduler.registry().is_online(2));

        let readings = sink.readings.lock().unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].mass_flow, 12.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_response_marks_device_offline() {
        let mut replies = vec![Reply::frame(vec![0x01; 10]); 3];
        replies.push(Reply::frame(response_frame(2, VALUES)));
        let transport = MockTransport::with_replies(replies);
        let (mut scheduler, sink) = build_scheduler(transport.clone(), vec![1, 2]);

        let started = tokio::time::Instant::now();
        let summary = scheduler.run_cycle().await;

        assert_eq!(summary.offline, vec![1]);
        assert_eq!(summary.online, vec![2]);
        assert!(!scheduler.registry().is_online(1));
        assert!(scheduler.registry().is_online(2));
        assert!(started.elapsed() >= Duration::from_millis(1000));

        let readings = sink.readings.lock().unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].meter_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlong_reply_marks_device_offline() {
        let mut overlong = response_frame(1, VALUES);
        overlong.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        let transport = MockTransport::with_replies(vec![Reply::frame(overlong); 3]);
        let (mut scheduler, sink) = build_scheduler(transport, vec![1]);

        let summary = scheduler.run_cycle().await;

        assert_eq!(summary.offline, vec![1]);
        assert!(!scheduler.registry().is_online(1));
        assert!(sink.readings.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_still_polls_every_device() {
        let transport = MockTransport::failing_open();
        let (mut scheduler, sink) = build_scheduler(transport.clone(), vec![1, 2, 3]);

        let summary = scheduler.run_cycle().await;

        assert_eq!(summary.offline, vec![1, 2, 3]);
        assert_eq!(summary.polled(), 3);
        assert_eq!(transport.open_calls(), 3);
        for id in [1, 2, 3] {
            assert!(!scheduler.registry().is_online(id));
            assert!(scheduler.registry().get(id).is_some());
        }
        assert!(sink.readings.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_overwritten_each_cycle() {
        let transport = MockTransport::with_replies(vec![
            Reply::frame(response_frame(1, VALUES)),
            Reply::frame(vec![]),
            Reply::frame(vec![]),
            Reply::frame(vec![]),
        ]);
        let (mut scheduler, _sink) = build_scheduler(transport, vec![1]);

        scheduler.run_cycle().await;
        assert!(scheduler.registry().is_online(1));

        scheduler.run_cycle().await;
        assert!(!scheduler.registry().is_online(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_does_not_affect_status() {
        let transport = MockTransport::with_replies(vec![Reply::frame(response_frame(1, VALUES))]);
        let (mut scheduler, sink) = build_scheduler(transport, vec![1]);
        scheduler.add_sink(Box::new(FailingSink));

        let summary = scheduler.run_cycle().await;
        assert_eq!(summary.online, vec![1]);
        assert!(scheduler.registry().is_online(1));
        assert_eq!(sink.readings.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let transport = MockTransport::with_replies(vec![Reply::frame(response_frame(1, VALUES))]);
        let (mut scheduler, sink) = build_scheduler(transport, vec![1]);

        scheduler
            .run(Duration::from_secs(60), tokio::time::sleep(Duration::from_secs(30)))
            .await;

        // first tick fires immediately, the next one is after shutdown
        assert_eq!(sink.readings.lock().unwrap().len(), 1);
    }
}
