use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read side of the registry, for whatever serves status to callers.
pub trait StatusQuery: Send + Sync {
    fn is_online(&self, device_id: u8) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub meter_id: u8,
    pub online: bool,
    pub updated_at: DateTime<Utc>,
}

/// Last known reachability per device.
///
/// Written once per device per poll cycle and read concurrently by the API.
/// Each write swaps the whole entry under the lock, so readers see either the
/// previous status or the new one. Entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct DeviceStatusRegistry {
    inner: Arc<RwLock<HashMap<u8, DeviceStatus>>>,
}

impl DeviceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, device_id: u8, online: bool) {
        let status = DeviceStatus {
            meter_id: device_id,
            online,
            updated_at: Utc::now(),
        };
        let mut map = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(device_id, status);
    }

    pub fn is_online(&self, device_id: u8) -> bool {
        self.get(device_id).map(|s| s.online).unwrap_or(false)
    }

    pub fn get(&self, device_id: u8) -> Option<DeviceStatus> {
        let map = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(&device_id).copied()
    }

    /// All known statuses, ordered by device id.
    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        let map = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut statuses: Vec<DeviceStatus> = map.values().copied().collect();
        statuses.sort_by_key(|s| s.meter_id);
        statuses
    }
}

impl StatusQuery for DeviceStatusRegistry {
    fn is_online(&self, device_id: u8) -> bool {
        DeviceStatusRegistry::is_online(self, device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_unknown_device_is_offline() {
        let registry = DeviceStatusRegistry::new();
        assert!(!registry.is_online(7));
        assert!(registry.get(7).is_none());
    }

    #[test]
    fn test_writes_replace_previous_value() {
        let registry = DeviceStatusRegistry::new();
        registry.set_status(1, true);
        assert!(registry.is_online(1));

        registry.set_status(1, false);
        assert!(!registry.is_online(1));

        registry.set_status(2, true);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].meter_id, 1);
        assert!(!snapshot[0].online);
        assert!(snapshot[1].online);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = DeviceStatusRegistry::new();
        let reader = registry.clone();
        registry.set_status(3, true);
        assert!(reader.is_online(3));
        assert!(StatusQuery::is_online(&reader, 3));
    }

    #[test]
    fn test_concurrent_readers_see_completed_writes() {
        let registry = DeviceStatusRegistry::new();
        registry.set_status(1, false);
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let done = done.clone();
                thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let status = registry.get(1).expect("device 1 was written first");
                        assert_eq!(status.meter_id, 1);
                    }
                })
            })
            .collect();

        for i in 0..10_000 {
            registry.set_status(1, i % 2 == 0);
        }
        registry.set_status(1, true);
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().unwrap();
        }
        assert!(registry.is_online(1));
    }
}
