use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to remind a caregiver about a medication after a delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub patient_id: Option<String>,
    pub medication_name: String,
    pub delay_seconds: u64,
}

/// Delivered to the reminder sink exactly once when a reminder's delay elapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderFired {
    pub reminder_id: Uuid,
    pub patient_id: Option<String>,
    pub medication_name: String,
    pub fired_at: DateTime<Utc>,
}

/// Summary of a scheduled reminder, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub reminder_id: Uuid,
    pub medication_name: String,
    pub delay_seconds: u64,
}
