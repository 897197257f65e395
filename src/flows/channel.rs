//! Per-run broadcast channels.
//!
//! Each flow run gets its own channel, lazily created on first access and
//! addressed by the stringified run id. A channel carries no state besides
//! its current observer set: events posted with nobody attached are dropped,
//! and a newly attached observer sees nothing that was posted before.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::flows::events::ProgressEvent;

/// Fan-out endpoint for a single flow run.
pub struct RunChannel {
    observers: Mutex<Vec<UnboundedSender<String>>>,
}

impl RunChannel {
    fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Attach an observer. No replay of past events; delivery starts with the
    /// next `post`. Dropping the receiver detaches the observer (it is pruned
    /// on the next delivery attempt).
    pub fn attach(&self) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        self.observers.lock().unwrap().push(tx);
        rx
    }

    /// Stamp, serialize, and deliver an event to every attached observer.
    ///
    /// Delivery is best-effort and in posting order: a failed send means the
    /// observer's connection is gone, so it is removed without aborting
    /// delivery to the rest. Never blocks and never reports an error to the
    /// poster.
    pub fn post(&self, mut event: ProgressEvent) {
        event.timestamp = Some(Utc::now());
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize progress event");
                return;
            }
        };

        let mut observers = self.observers.lock().unwrap();
        let before = observers.len();
        observers.retain(|tx| tx.send(payload.clone()).is_ok());
        let dropped = before - observers.len();
        if dropped > 0 {
            tracing::debug!(dropped, "pruned dead flow observers");
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }
}

/// Registry of live run channels, keyed by stringified run id.
///
/// The resolver is deterministic: repeated lookups for the same id return the
/// same channel instance. Channels interact with the rest of the system only
/// through attach/post, matching the per-id isolation the run lifecycle needs.
pub struct FlowMonitor {
    channels: Mutex<HashMap<String, std::sync::Arc<RunChannel>>>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the channel for a run id, creating it on first access.
    pub fn channel(&self, flow_id: &str) -> std::sync::Arc<RunChannel> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(flow_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(RunChannel::new()))
            .clone()
    }

    /// Post an event to the channel addressed by the event's run id.
    ///
    /// A channel holds no state besides its observer set, so an entry with
    /// no observers left after delivery is dropped from the registry; the
    /// lazy resolver recreates it if anyone looks it up again.
    pub fn publish(&self, event: ProgressEvent) {
        let key = event.flow_run_id.to_string();
        let channel = self.channel(&key);
        channel.post(event);

        let mut channels = self.channels.lock().unwrap();
        let idle = channels.get(&key).is_some_and(|entry| {
            std::sync::Arc::ptr_eq(entry, &channel) && entry.observer_count() == 0
        });
        if idle {
            channels.remove(&key);
        }
    }

    #[cfg(test)]
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }
}

impl Default for FlowMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn event(run_id: i64, tag: &str) -> ProgressEvent {
        ProgressEvent::new(run_id, tag, json!({ "seq": tag }))
    }

    #[tokio::test]
    async fn test_two_observers_see_identical_ordered_events() {
        let channel = RunChannel::new();
        let mut rx1 = channel.attach();
        let mut rx2 = channel.attach();

        channel.post(event(1, "flow_started"));
        channel.post(event(1, "page_created"));
        channel.post(event(1, "flow_completed"));

        for rx in [&mut rx1, &mut rx2] {
            let mut seen = Vec::new();
            while let Ok(payload) = rx.try_recv() {
                let value: Value = serde_json::from_str(&payload).unwrap();
                seen.push(value["type"].as_str().unwrap().to_string());
            }
            assert_eq!(seen, ["flow_started", "page_created", "flow_completed"]);
        }

        // Identical content, including the channel-assigned timestamp.
        let mut rx3 = channel.attach();
        channel.post(event(1, "extra"));
        let a = rx3.try_recv().unwrap();
        drop(rx3);
        assert!(a.contains("\"timestamp\""));
    }

    #[tokio::test]
    async fn test_late_attachment_sees_only_later_events() {
        let channel = RunChannel::new();
        channel.post(event(1, "flow_started"));
        channel.post(event(1, "page_created"));

        let mut rx = channel.attach();
        channel.post(event(1, "flow_completed"));

        let payload = rx.try_recv().unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "flow_completed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_observer_is_pruned_without_affecting_others() {
        let channel = RunChannel::new();
        let rx_dead = channel.attach();
        let mut rx_live = channel.attach();
        assert_eq!(channel.observer_count(), 2);

        drop(rx_dead);
        channel.post(event(1, "page_created"));

        assert_eq!(channel.observer_count(), 1);
        let payload = rx_live.try_recv().unwrap();
        assert!(payload.contains("page_created"));
    }

    #[tokio::test]
    async fn test_post_with_no_observers_is_a_noop() {
        let channel = RunChannel::new();
        channel.post(event(1, "flow_started"));
        assert_eq!(channel.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_monitor_resolves_same_channel_per_id() {
        let monitor = FlowMonitor::new();
        let a = monitor.channel("42");
        let b = monitor.channel("42");
        assert!(std::sync::Arc::ptr_eq(&a, &b));

        let other = monitor.channel("43");
        assert!(!std::sync::Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn test_registry_drops_entries_for_unobserved_runs() {
        let monitor = FlowMonitor::new();
        for run_id in 0..1000 {
            monitor.publish(event(run_id, "flow_started"));
            monitor.publish(event(run_id, "flow_completed"));
        }
        assert_eq!(monitor.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_keeps_entries_with_live_observers() {
        let monitor = FlowMonitor::new();
        let mut rx = monitor.channel("5").attach();

        monitor.publish(event(5, "flow_started"));
        monitor.publish(event(6, "flow_started"));

        assert_eq!(monitor.channel_count(), 1);
        assert!(rx.try_recv().is_ok());

        // Once the last observer hangs up, the next publish prunes both the
        // dead sender and the registry entry.
        drop(rx);
        monitor.publish(event(5, "flow_completed"));
        assert_eq!(monitor.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_routes_by_run_id() {
        let monitor = FlowMonitor::new();
        let mut rx = monitor.channel("7").attach();
        let mut rx_other = monitor.channel("8").attach();

        monitor.publish(event(7, "flow_started"));

        assert!(rx.try_recv().is_ok());
        assert!(rx_other.try_recv().is_err());
    }
}
