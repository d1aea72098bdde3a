use serde::{Deserialize, Serialize};

use super::vital_sign::VitalSigns;

/// Outcome of classifying one set of vitals against clinical thresholds.
///
/// `recommendations` keeps rule order (pressure, temperature, heart rate);
/// the order is part of what callers see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub critical: bool,
    pub recommendations: Vec<String>,
    pub source: VitalSigns,
}

impl TriageResult {
    /// Severity label used in response text.
    pub fn severity_label(&self) -> &'static str {
        if self.critical {
            "CRITICAL"
        } else {
            "stable"
        }
    }
}
