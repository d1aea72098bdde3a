//! Message processing orchestrator.
//!
//! Single entry point that drives one caregiver message through:
//! session → extract → triage → record append → reminder → audit.
//!
//! Steps after extraction are independent: a failed record write or a
//! rejected reminder is reported in the result and the response text, and
//! the remaining steps still run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audit::EncryptedAuditLog;
use crate::config::AppConfig;
use crate::crypto::StoreKey;
use crate::models::{
    RecordEntry, ReminderFired, ReminderRequest, ScheduledReminder, Session, SessionStatus,
    TriageResult, VitalSigns, VitalType,
};
use crate::pipeline::extract::{extract_medication_directive, extract_patient_id, extract_vitals};
use crate::pipeline::triage::classify;
use crate::reminders::ReminderScheduler;
use crate::session::{InMemorySessions, SessionProvider};
use crate::store::{EncryptedRecordStore, StoreError};

pub const NO_VITALS_DETECTED: &str = "No vitals detected.";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Pipeline step that can fail without aborting the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    RecordUpdate,
    ReminderScheduling,
    Audit,
}

/// A step that did not succeed, with a caller-safe description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineIssue {
    pub step: PipelineStep,
    pub detail: String,
}

/// Everything the transport needs to answer the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub response_text: String,
    pub session_id: String,
    pub triage_result: Option<TriageResult>,
    pub stored_patient_id: Option<String>,
    pub scheduled_reminder: Option<ScheduledReminder>,
    #[serde(default)]
    pub issues: Vec<PipelineIssue>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns every piece of shared state the pipeline touches. Create one per
/// process (or per test) and share it behind an `Arc`.
pub struct MessagePipeline {
    sessions: Box<dyn SessionProvider>,
    store: Arc<EncryptedRecordStore>,
    scheduler: ReminderScheduler,
    audit: Option<EncryptedAuditLog>,
}

impl MessagePipeline {
    pub fn new(
        sessions: Box<dyn SessionProvider>,
        store: Arc<EncryptedRecordStore>,
        scheduler: ReminderScheduler,
        audit: Option<EncryptedAuditLog>,
    ) -> Self {
        Self {
            sessions,
            store,
            scheduler,
            audit,
        }
    }

    /// Wire up the default components from configuration.
    ///
    /// Derives the store key once, which takes PBKDF2 time; call this at
    /// startup, not per request.
    pub fn from_config(
        config: &AppConfig,
        reminder_sink: mpsc::Sender<ReminderFired>,
    ) -> Result<Self, StoreError> {
        let key = Arc::new(StoreKey::derive_with_iterations(
            &config.passphrase,
            config.kdf_iterations,
        ));
        let store = Arc::new(EncryptedRecordStore::open(config.records_dir(), key.clone())?);
        let audit = EncryptedAuditLog::new(config.audit_log_path(), key);
        let ttl = chrono::Duration::from_std(config.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let sessions = InMemorySessions::new(ttl);
        let scheduler = ReminderScheduler::new(
            reminder_sink,
            config.max_pending_reminders,
            config.max_reminder_delay,
        );

        Ok(Self::new(Box::new(sessions), store, scheduler, Some(audit)))
    }

    /// Process one message.
    pub async fn handle(
        &self,
        caller_id: &str,
        text: &str,
        session_token: Option<&str>,
    ) -> PipelineResult {
        let request_id = Uuid::new_v4();

        // Step 1: Session
        let session = self.resolve_session(caller_id, session_token);

        // Step 2: Extract
        let vitals = extract_vitals(text);
        let patient_id = extract_patient_id(text);

        let mut lines = Vec::new();
        let mut issues = Vec::new();
        let mut triage_result = None;
        let mut stored_patient_id = None;
        let mut scheduled_reminder = None;

        // Step 3: Classify + persist
        if vitals.is_empty() {
            lines.push(NO_VITALS_DETECTED.to_string());
        } else {
            let triage = classify(&vitals);
            lines.extend(analysis_lines(&triage));

            if let Some(pid) = &patient_id {
                match self.store.append(pid, RecordEntry::now(triage.clone())).await {
                    Ok(_) => {
                        lines.push(format!("Record updated for patient {pid}."));
                        stored_patient_id = Some(pid.clone());
                    }
                    Err(e) => {
                        tracing::warn!(request_id = %request_id, error = %e, "Record update failed");
                        lines.push(format!("Vitals analyzed; record update failed for patient {pid}."));
                        issues.push(PipelineIssue {
                            step: PipelineStep::RecordUpdate,
                            detail: e.to_string(),
                        });
                    }
                }
            }
            triage_result = Some(triage);
        }

        // Step 4: Reminder
        if let Some(directive) = extract_medication_directive(text) {
            let request = ReminderRequest {
                patient_id: patient_id.clone(),
                medication_name: directive.medication_name.clone(),
                delay_seconds: directive.delay_seconds,
            };
            match self.scheduler.schedule(request) {
                Ok(handle) => {
                    lines.push(format!(
                        "Reminder scheduled: {} in {} seconds.",
                        directive.medication_name, directive.delay_seconds
                    ));
                    scheduled_reminder = Some(ScheduledReminder {
                        reminder_id: handle.id(),
                        medication_name: directive.medication_name,
                        delay_seconds: directive.delay_seconds,
                    });
                }
                Err(e) => {
                    tracing::warn!(request_id = %request_id, error = %e, "Reminder not scheduled");
                    lines.push(format!(
                        "Reminder for {} could not be scheduled: {e}.",
                        directive.medication_name
                    ));
                    issues.push(PipelineIssue {
                        step: PipelineStep::ReminderScheduling,
                        detail: e.to_string(),
                    });
                }
            }
        }

        // Step 5: Audit
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(caller_id, &session.session_id, text).await {
                tracing::warn!(request_id = %request_id, error = %e, "Audit write failed");
                lines.push("Message audit failed.".to_string());
                issues.push(PipelineIssue {
                    step: PipelineStep::Audit,
                    detail: e.to_string(),
                });
            }
        }

        let critical = triage_result.as_ref().is_some_and(|t| t.critical);
        let stored = stored_patient_id.is_some();
        tracing::info!(
            request_id = %request_id,
            critical,
            stored,
            reminder = scheduled_reminder.is_some(),
            issues = issues.len(),
            "Message handled"
        );

        PipelineResult {
            response_text: lines.join("\n"),
            session_id: session.session_id,
            triage_result,
            stored_patient_id,
            scheduled_reminder,
            issues,
        }
    }

    /// Full stored history for a patient, oldest first.
    pub async fn read_records(&self, patient_id: &str) -> Result<Vec<RecordEntry>, StoreError> {
        self.store.read(patient_id).await
    }

    /// Cancel a reminder reported in an earlier result.
    pub fn cancel_reminder(&self, reminder_id: Uuid) -> bool {
        self.scheduler.cancel(reminder_id)
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    fn resolve_session(&self, caller_id: &str, token: Option<&str>) -> Session {
        match self.sessions.validate(token) {
            SessionStatus::Valid(session) if session.caller_id == caller_id => session,
            SessionStatus::Valid(_) => {
                tracing::debug!("Session token presented by a different caller, minting new");
                self.sessions.mint(caller_id)
            }
            SessionStatus::Expired => {
                tracing::debug!("Session expired, minting new");
                self.sessions.mint(caller_id)
            }
            SessionStatus::Absent => self.sessions.mint(caller_id),
        }
    }
}

/// "Vitals analysis: <severity>", the readings, then one line per recommendation.
fn analysis_lines(triage: &TriageResult) -> Vec<String> {
    let mut lines = Vec::with_capacity(triage.recommendations.len() + 2);
    lines.push(format!("Vitals analysis: {}", triage.severity_label()));
    lines.push(format!("Readings: {}", describe_vitals(&triage.source)));
    lines.extend(triage.recommendations.iter().map(|r| format!("- {r}")));
    lines
}

fn describe_vitals(vitals: &VitalSigns) -> String {
    fn reading(value: Option<f64>) -> String {
        value.map_or_else(|| "?".to_string(), |v| v.to_string())
    }

    vitals
        .present_types()
        .into_iter()
        .map(|t| {
            let value = match t {
                VitalType::BloodPressure => {
                    format!("{}/{}", reading(vitals.systolic), reading(vitals.diastolic))
                }
                VitalType::Temperature => reading(vitals.temperature),
                VitalType::HeartRate => reading(vitals.heart_rate),
            };
            format!("{} {} {}", t.as_str(), value, t.default_unit())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
