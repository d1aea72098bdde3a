//! Deterministic field extraction from caregiver messages.
//!
//! Vocabulary is fixed: `bp:`, `temp:`/`temperature:`, `hr:`/`heart rate:`,
//! `patient:`/`patientid:` and the `med:`/`delay:` reminder directive.
//! Text is lower-cased before matching. When a field appears more than once,
//! the last occurrence wins.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::VitalSigns;

/// `bp: 120/80`: two 2-3 digit numbers. No range validation.
static BLOOD_PRESSURE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\bbp:\s*(\d{2,3})\s*/\s*(\d{2,3})\b"));

/// `temp: 37.2` / `temperature: 39`
static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:temp|temperature):\s*(\d+(?:\.\d+)?)"));

/// `hr: 72` / `heart rate: 72`
static HEART_RATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:hr|heart rate):\s*(\d{2,3})\b"));

/// `patient: 42` / `patientid: ab12`
static PATIENT_ID: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:patient|patientid):\s*([a-z0-9]+)"));

/// `med: aspirin, delay: 2` with an optional unit on the delay.
static MEDICATION_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"\b(?:med|medication):\s*([a-z0-9][a-z0-9\-]*)\s*,?\s*delay:\s*(\d{1,9})\s*(seconds|second|secs|sec|s|minutes|minute|mins|min|m|hours|hour|h)?\b",
    )
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("Invalid extraction regex pattern")
}

/// A reminder directive found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationDirective {
    pub medication_name: String,
    pub delay_seconds: u64,
}

/// Extract whichever vitals the message reports.
pub fn extract_vitals(text: &str) -> VitalSigns {
    let normalized = text.to_lowercase();
    let mut vitals = VitalSigns::default();

    if let Some(caps) = last_match(&BLOOD_PRESSURE, &normalized) {
        vitals.systolic = number(&caps, 1);
        vitals.diastolic = number(&caps, 2);
    }
    if let Some(caps) = last_match(&TEMPERATURE, &normalized) {
        vitals.temperature = number(&caps, 1);
    }
    if let Some(caps) = last_match(&HEART_RATE, &normalized) {
        vitals.heart_rate = number(&caps, 1);
    }

    vitals
}

/// Extract the patient identifier, lower-cased.
pub fn extract_patient_id(text: &str) -> Option<String> {
    let normalized = text.to_lowercase();
    last_match(&PATIENT_ID, &normalized).map(|caps| caps[1].to_string())
}

/// Extract a `med: <name>, delay: <n>[unit]` reminder directive.
pub fn extract_medication_directive(text: &str) -> Option<MedicationDirective> {
    let normalized = text.to_lowercase();
    let caps = last_match(&MEDICATION_DIRECTIVE, &normalized)?;

    let amount: u64 = caps[2].parse().ok()?;
    let multiplier = match caps.get(3).map(|m| m.as_str()) {
        None | Some("seconds" | "second" | "secs" | "sec" | "s") => 1,
        Some("minutes" | "minute" | "mins" | "min" | "m") => 60,
        Some(_) => 3600,
    };

    Some(MedicationDirective {
        medication_name: caps[1].to_string(),
        delay_seconds: amount * multiplier,
    })
}

fn last_match<'t>(regex: &Regex, text: &'t str) -> Option<Captures<'t>> {
    regex.captures_iter(text).last()
}

fn number(caps: &Captures<'_>, group: usize) -> Option<f64> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}
