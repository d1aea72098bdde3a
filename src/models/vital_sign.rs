use serde::{Deserialize, Serialize};

/// Kind of vital sign a caregiver message can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalType {
    BloodPressure,
    Temperature,
    HeartRate,
}

impl VitalType {
    pub fn as_str(self) -> &'static str {
        match self {
            VitalType::BloodPressure => "blood_pressure",
            VitalType::Temperature => "temperature",
            VitalType::HeartRate => "heart_rate",
        }
    }

    /// Default unit for this vital type.
    pub fn default_unit(self) -> &'static str {
        match self {
            VitalType::BloodPressure => "mmHg",
            VitalType::Temperature => "°C",
            VitalType::HeartRate => "bpm",
        }
    }
}

/// Vital signs extracted from one message.
///
/// Every field is independent: a message may report any subset, and an
/// absent field means "not reported", never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systolic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diastolic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
}

impl VitalSigns {
    /// True when no vital was reported at all.
    pub fn is_empty(&self) -> bool {
        self.systolic.is_none()
            && self.diastolic.is_none()
            && self.temperature.is_none()
            && self.heart_rate.is_none()
    }

    /// Which vital types carry at least one value, in rule order.
    pub fn present_types(&self) -> Vec<VitalType> {
        let mut types = Vec::with_capacity(3);
        if self.systolic.is_some() || self.diastolic.is_some() {
            types.push(VitalType::BloodPressure);
        }
        if self.temperature.is_some() {
            types.push(VitalType::Temperature);
        }
        if self.heart_rate.is_some() {
            types.push(VitalType::HeartRate);
        }
        types
    }
}
