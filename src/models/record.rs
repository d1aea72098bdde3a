use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::triage::TriageResult;
use super::vital_sign::VitalSigns;

/// One timestamped observation in a patient's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub timestamp: DateTime<Utc>,
    pub vitals: VitalSigns,
    pub triage: TriageResult,
}

impl RecordEntry {
    /// New entry stamped with the current time.
    pub fn now(triage: TriageResult) -> Self {
        Self {
            timestamp: Utc::now(),
            vitals: triage.source,
            triage,
        }
    }
}
