use crate::api::{ApiCommand, DeviceClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::task::AbortOnDropHandle;

/// The most recent successful poll result for one command.
#[derive(Clone)]
struct CachedPayload {
    value: Arc<serde_json::Value>,
    fetched_at: jiff::Timestamp,
}

type Payloads = Arc<RwLock<HashMap<ApiCommand, CachedPayload>>>;

/// Read-only snapshot view over the cached payloads.
///
/// Every sensor descriptor holds one of these; all writes stay with the poll
/// tasks owned by [`PayloadCache`].
#[derive(Clone)]
pub struct CacheHandle {
    payloads: Payloads,
}

impl CacheHandle {
    /// A handle with no poller behind it. Nothing is ever cached; useful for
    /// describing the sensor set without talking to a device.
    pub fn detached() -> Self {
        Self { payloads: Default::default() }
    }

    pub fn get_cached(&self, command: ApiCommand) -> Option<Arc<serde_json::Value>> {
        let guard = self.payloads.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&command).map(|entry| Arc::clone(&entry.value))
    }

    /// When the cached payload for this command was last fetched.
    pub fn fetched_at(&self, command: ApiCommand) -> Option<jiff::Timestamp> {
        let guard = self.payloads.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&command).map(|entry| entry.fetched_at)
    }
}

struct Schedule {
    interval: Duration,
    #[allow(unused)] // exists for its drop handler
    task: AbortOnDropHandle<()>,
}

/// Periodically fetches status payloads and caches the latest successful one
/// per command.
///
/// Poll tasks are aborted when the cache is dropped.
pub struct PayloadCache {
    client: Arc<DeviceClient>,
    payloads: Payloads,
    schedules: Mutex<HashMap<ApiCommand, Schedule>>,
}

impl PayloadCache {
    pub fn new(client: DeviceClient) -> Self {
        Self {
            client: Arc::new(client),
            payloads: Default::default(),
            schedules: Mutex::new(HashMap::new()),
        }
    }

    pub fn handle(&self) -> CacheHandle {
        CacheHandle { payloads: Arc::clone(&self.payloads) }
    }

    pub fn get_cached(&self, command: ApiCommand) -> Option<Arc<serde_json::Value>> {
        self.handle().get_cached(command)
    }

    pub fn active_schedules(&self) -> usize {
        let guard = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }

    /// Begins (or continues) periodic fetching of the named payload.
    ///
    /// Idempotent: a command already scheduled at the same interval is left
    /// alone. Requesting a different interval replaces the existing task, so
    /// there is exactly one active schedule per command at all times. The
    /// first fetch completes before this returns, so dependent sensors have
    /// data to read as soon as they exist.
    pub async fn ensure_scheduled(&self, command: ApiCommand, interval: Duration) {
        {
            let guard = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = guard.get(&command) {
                if existing.interval == interval {
                    return;
                }
                tracing::debug!(%command, ?interval, "replacing poll schedule with a new interval");
            }
        }
        Self::poll_once(&self.client, &self.payloads, command).await;
        let client = Arc::clone(&self.client);
        let payloads = Arc::clone(&self.payloads);
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The scheduling fetch above already ran; skip the immediate
            // first tick.
            timer.tick().await;
            loop {
                timer.tick().await;
                Self::poll_once(&client, &payloads, command).await;
            }
        });
        let mut guard = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(command, Schedule { interval, task: AbortOnDropHandle::new(task) });
    }

    async fn poll_once(client: &DeviceClient, payloads: &Payloads, command: ApiCommand) {
        match client.get_status(command).await {
            Ok(value) => {
                tracing::trace!(%command, "status poll succeeded");
                let entry = CachedPayload {
                    value: Arc::new(value),
                    fetched_at: jiff::Timestamp::now(),
                };
                let mut guard = payloads.write().unwrap_or_else(|e| e.into_inner());
                guard.insert(command, entry);
            }
            Err(error) => {
                // The previous successful payload, if any, stays cached.
                tracing::warn!(
                    %command,
                    error = &error as &dyn std::error::Error,
                    "status poll failed"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self, command: ApiCommand, value: serde_json::Value) {
        let entry = CachedPayload {
            value: Arc::new(value),
            fetched_at: jiff::Timestamp::now(),
        };
        let mut guard = self.payloads.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(command, entry);
    }
}

#[cfg(test)]
pub(crate) fn test_handle(entries: &[(ApiCommand, serde_json::Value)]) -> CacheHandle {
    let handle = CacheHandle::detached();
    {
        let mut guard = handle.payloads.write().unwrap_or_else(|e| e.into_inner());
        for (command, value) in entries {
            guard.insert(
                *command,
                CachedPayload {
                    value: Arc::new(value.clone()),
                    fetched_at: jiff::Timestamp::now(),
                },
            );
        }
    }
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> DeviceClient {
        // Nothing listens on port 9 (discard); polls fail fast and loudly.
        DeviceClient::new("http://127.0.0.1:9", None, Duration::from_millis(250)).unwrap()
    }

    #[tokio::test]
    async fn ensure_scheduled_is_idempotent() {
        let cache = PayloadCache::new(unreachable_client());
        let interval = Duration::from_secs(30);
        cache.ensure_scheduled(ApiCommand::NetworkStatus, interval).await;
        cache.ensure_scheduled(ApiCommand::NetworkStatus, interval).await;
        assert_eq!(cache.active_schedules(), 1);
    }

    #[tokio::test]
    async fn interval_change_replaces_the_schedule() {
        let cache = PayloadCache::new(unreachable_client());
        cache
            .ensure_scheduled(ApiCommand::PowerStatus, Duration::from_secs(30))
            .await;
        cache
            .ensure_scheduled(ApiCommand::PowerStatus, Duration::from_secs(5))
            .await;
        assert_eq!(cache.active_schedules(), 1);
    }

    #[tokio::test]
    async fn distinct_commands_get_distinct_schedules() {
        let cache = PayloadCache::new(unreachable_client());
        let interval = Duration::from_secs(30);
        cache.ensure_scheduled(ApiCommand::NetworkStatus, interval).await;
        cache.ensure_scheduled(ApiCommand::PowerStatus, interval).await;
        assert_eq!(cache.active_schedules(), 2);
    }

    #[test]
    fn absent_payload_reads_as_none() {
        let handle = CacheHandle::detached();
        assert!(handle.get_cached(ApiCommand::P1Status).is_none());
        assert!(handle.fetched_at(ApiCommand::P1Status).is_none());
    }

    #[tokio::test]
    async fn failed_poll_keeps_previous_payload() {
        let cache = PayloadCache::new(unreachable_client());
        cache.store(ApiCommand::NetworkStatus, serde_json::json!({"wifi_sta": {"rssi": -61}}));
        PayloadCache::poll_once(&cache.client, &cache.payloads, ApiCommand::NetworkStatus).await;
        assert!(cache.get_cached(ApiCommand::NetworkStatus).is_some());
    }
}
