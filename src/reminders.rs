//! One-shot delayed medication reminders.
//!
//! Every scheduled reminder gets its own tokio task that sleeps for the
//! requested delay and then delivers a single [`ReminderFired`] to the sink.
//! A small state machine (pending → fired | cancelled) decides the race
//! between the timer and a cancel: whichever transitions first wins, so a
//! reminder is delivered at most once and never after a successful cancel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::models::{ReminderFired, ReminderRequest};

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Too many pending reminders (limit {limit})")]
    CapacityExceeded { limit: usize },

    #[error("Reminder delay of {requested}s exceeds the {max}s maximum")]
    DelayTooLong { requested: u64, max: u64 },

    #[error("Reminder scheduler registry unavailable")]
    RegistryUnavailable,
}

/// Where a reminder currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Pending,
    Fired,
    Cancelled,
}

struct ReminderSlot {
    state: AtomicU8,
    cancelled: Notify,
}

impl ReminderSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            cancelled: Notify::new(),
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn state(&self) -> ReminderState {
        match self.state.load(Ordering::Acquire) {
            PENDING => ReminderState::Pending,
            FIRED => ReminderState::Fired,
            _ => ReminderState::Cancelled,
        }
    }
}

type Registry = Arc<Mutex<HashMap<Uuid, Arc<ReminderSlot>>>>;

/// Handle to one scheduled reminder.
#[derive(Clone)]
pub struct ReminderHandle {
    id: Uuid,
    slot: Arc<ReminderSlot>,
    registry: Registry,
}

impl ReminderHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ReminderState {
        self.slot.state()
    }

    /// Cancel the reminder if it has not fired yet.
    ///
    /// Returns false when the reminder already fired or was already
    /// cancelled; both are no-ops.
    pub fn cancel(&self) -> bool {
        cancel_slot(&self.registry, self.id, &self.slot)
    }
}

impl std::fmt::Debug for ReminderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

fn cancel_slot(registry: &Registry, id: Uuid, slot: &ReminderSlot) -> bool {
    if !slot.transition(CANCELLED) {
        return false;
    }
    slot.cancelled.notify_one();
    if let Ok(mut pending) = registry.lock() {
        pending.remove(&id);
    }
    tracing::debug!(reminder_id = %id, "Reminder cancelled");
    true
}

/// Schedules reminders and delivers fire events to a channel sink.
///
/// Cheap to clone; clones share the pending registry and the sink.
#[derive(Clone)]
pub struct ReminderScheduler {
    sink: mpsc::Sender<ReminderFired>,
    registry: Registry,
    max_pending: usize,
    max_delay: Duration,
}

impl ReminderScheduler {
    pub fn new(sink: mpsc::Sender<ReminderFired>, max_pending: usize, max_delay: Duration) -> Self {
        Self {
            sink,
            registry: Arc::new(Mutex::new(HashMap::new())),
            max_pending,
            max_delay,
        }
    }

    /// Schedule a reminder. Returns at once; the fire event arrives on the
    /// sink after `delay_seconds` of wall-clock time.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, request: ReminderRequest) -> Result<ReminderHandle, SchedulerError> {
        let max_delay = self.max_delay.as_secs();
        if request.delay_seconds > max_delay {
            return Err(SchedulerError::DelayTooLong {
                requested: request.delay_seconds,
                max: max_delay,
            });
        }

        let id = Uuid::new_v4();
        let slot = Arc::new(ReminderSlot::new());
        {
            let mut pending = self
                .registry
                .lock()
                .map_err(|_| SchedulerError::RegistryUnavailable)?;
            if pending.len() >= self.max_pending {
                tracing::warn!(limit = self.max_pending, "Reminder rejected: scheduler at capacity");
                return Err(SchedulerError::CapacityExceeded {
                    limit: self.max_pending,
                });
            }
            pending.insert(id, slot.clone());
        }

        let delay = Duration::from_secs(request.delay_seconds);
        tokio::spawn(run_timer(
            id,
            slot.clone(),
            self.registry.clone(),
            self.sink.clone(),
            request,
            delay,
        ));

        tracing::info!(reminder_id = %id, delay_secs = delay.as_secs(), "Reminder scheduled");

        Ok(ReminderHandle {
            id,
            slot,
            registry: self.registry.clone(),
        })
    }

    /// Cancel a pending reminder by id. Unknown, fired, and already
    /// cancelled ids return false.
    pub fn cancel(&self, id: Uuid) -> bool {
        let slot = match self.registry.lock() {
            Ok(pending) => pending.get(&id).cloned(),
            Err(_) => None,
        };
        match slot {
            Some(slot) => cancel_slot(&self.registry, id, &slot),
            None => false,
        }
    }

    /// Number of reminders still waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.registry.lock().map(|p| p.len()).unwrap_or(0)
    }
}

async fn run_timer(
    id: Uuid,
    slot: Arc<ReminderSlot>,
    registry: Registry,
    sink: mpsc::Sender<ReminderFired>,
    request: ReminderRequest,
    delay: Duration,
) {
    tokio::select! {
        () = tokio::time::sleep(delay) => {}
        () = slot.cancelled.notified() => return,
    }

    if !slot.transition(FIRED) {
        return;
    }
    if let Ok(mut pending) = registry.lock() {
        pending.remove(&id);
    }

    let event = ReminderFired {
        reminder_id: id,
        patient_id: request.patient_id,
        medication_name: request.medication_name,
        fired_at: Utc::now(),
    };
    if sink.send(event).await.is_err() {
        tracing::warn!(reminder_id = %id, "Reminder fired but the sink is closed");
    } else {
        tracing::info!(reminder_id = %id, "Reminder fired");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn request(medication: &str, delay_seconds: u64) -> ReminderRequest {
        ReminderRequest {
            patient_id: Some("42".into()),
            medication_name: medication.into(),
            delay_seconds,
        }
    }

    fn scheduler(max_pending: usize) -> (ReminderScheduler, mpsc::Receiver<ReminderFired>) {
        let (tx, rx) = mpsc::channel(64);
        (ReminderScheduler::new(tx, max_pending, DAY), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (scheduler, mut rx) = scheduler(16);
        let start = tokio::time::Instant::now();

        let handle = scheduler.schedule(request("aspirin", 2)).unwrap();
        assert_eq!(handle.state(), ReminderState::Pending);
        assert_eq!(scheduler.pending_count(), 1);

        let event = rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(event.medication_name, "aspirin");
        assert_eq!(event.patient_id.as_deref(), Some("42"));
        assert_eq!(event.reminder_id, handle.id());
        assert_eq!(handle.state(), ReminderState::Fired);
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err(), "reminder delivered more than once");
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_fire_early() {
        let (scheduler, mut rx) = scheduler(16);
        scheduler.schedule(request("aspirin", 2)).unwrap();

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_returns_immediately() {
        let (scheduler, _rx) = scheduler(16);
        let start = tokio::time::Instant::now();
        scheduler.schedule(request("aspirin", 3600)).unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_suppresses_event() {
        let (scheduler, mut rx) = scheduler(16);
        let handle = scheduler.schedule(request("aspirin", 2)).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.cancel());
        assert_eq!(handle.state(), ReminderState::Cancelled);
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(!handle.cancel(), "second cancel is a no-op");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_noop() {
        let (scheduler, mut rx) = scheduler(16);
        let handle = scheduler.schedule(request("aspirin", 1)).unwrap();

        rx.recv().await.unwrap();
        assert!(!handle.cancel());
        assert!(!scheduler.cancel(handle.id()));
        assert_eq!(handle.state(), ReminderState::Fired);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_by_id() {
        let (scheduler, mut rx) = scheduler(16);
        let handle = scheduler.schedule(request("aspirin", 2)).unwrap();

        assert!(scheduler.cancel(handle.id()));
        assert!(!scheduler.cancel(Uuid::new_v4()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn many_timers_fire_independently_in_delay_order() {
        let (scheduler, mut rx) = scheduler(64);
        for (name, delay) in [("c", 30), ("a", 10), ("b", 20)] {
            scheduler.schedule(request(name, delay)).unwrap();
        }
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(rx.recv().await.unwrap().medication_name);
        }
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_fires_promptly() {
        let (scheduler, mut rx) = scheduler(16);
        scheduler.schedule(request("aspirin", 0)).unwrap();
        assert_eq!(rx.recv().await.unwrap().medication_name, "aspirin");
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_limit_is_reported_synchronously() {
        let (scheduler, mut rx) = scheduler(2);
        scheduler.schedule(request("a", 5)).unwrap();
        scheduler.schedule(request("b", 5)).unwrap();
        assert_eq!(
            scheduler.schedule(request("c", 5)).unwrap_err(),
            SchedulerError::CapacityExceeded { limit: 2 }
        );

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(scheduler.schedule(request("d", 5)).is_ok(), "slots freed after firing");
    }

    #[tokio::test]
    async fn delay_above_maximum_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let scheduler = ReminderScheduler::new(tx, 4, Duration::from_secs(60));
        assert_eq!(
            scheduler.schedule(request("aspirin", 61)).unwrap_err(),
            SchedulerError::DelayTooLong { requested: 61, max: 60 }
        );
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_sink_does_not_panic() {
        let (scheduler, rx) = scheduler(4);
        drop(rx);
        let handle = scheduler.schedule(request("aspirin", 1)).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.state(), ReminderState::Fired);
    }
}
