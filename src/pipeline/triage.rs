//! Threshold-based triage of extracted vitals.
//!
//! Rules run in a fixed order (pressure, temperature, heart rate) and each
//! one only looks at the fields it needs. A field that was not reported never
//! triggers a rule.

use crate::models::{TriageResult, VitalSigns};

pub const SEVERE_SYSTOLIC: f64 = 180.0;
pub const SEVERE_DIASTOLIC: f64 = 120.0;
pub const ELEVATED_SYSTOLIC: f64 = 140.0;
pub const ELEVATED_DIASTOLIC: f64 = 90.0;
pub const FEVER_CELSIUS: f64 = 39.0;
pub const HEART_RATE_HIGH: f64 = 120.0;
pub const HEART_RATE_LOW: f64 = 50.0;

pub const SEVERE_HYPERTENSION: &str = "severe hypertension, escalate immediately.";
pub const ELEVATED_PRESSURE: &str = "elevated pressure, monitor and advise stress reduction.";
pub const HIGH_FEVER: &str = "high fever, consider intervention.";
pub const ABNORMAL_HEART_RATE: &str = "abnormal heart rate, verify patient status.";
pub const WITHIN_NORMAL_RANGE: &str = "vitals within normal range.";

/// Classify vitals. Never fails; empty input yields the normal-range result.
pub fn classify(vitals: &VitalSigns) -> TriageResult {
    let mut critical = false;
    let mut recommendations = Vec::new();

    if above(vitals.systolic, SEVERE_SYSTOLIC) || above(vitals.diastolic, SEVERE_DIASTOLIC) {
        critical = true;
        recommendations.push(SEVERE_HYPERTENSION.to_string());
    } else if above(vitals.systolic, ELEVATED_SYSTOLIC)
        || above(vitals.diastolic, ELEVATED_DIASTOLIC)
    {
        recommendations.push(ELEVATED_PRESSURE.to_string());
    }

    if above(vitals.temperature, FEVER_CELSIUS) {
        critical = true;
        recommendations.push(HIGH_FEVER.to_string());
    }

    if above(vitals.heart_rate, HEART_RATE_HIGH) || below(vitals.heart_rate, HEART_RATE_LOW) {
        critical = true;
        recommendations.push(ABNORMAL_HEART_RATE.to_string());
    }

    if recommendations.is_empty() {
        recommendations.push(WITHIN_NORMAL_RANGE.to_string());
    }

    TriageResult {
        critical,
        recommendations,
        source: *vitals,
    }
}

fn above(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v > threshold)
}

fn below(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v < threshold)
}
