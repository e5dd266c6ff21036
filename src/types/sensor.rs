//! Instantaneous sensor readings

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A snapshot reading from a board or channel sensor.
///
/// Values are carried as strings, exactly as the device reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorValue {
    name: String,
    value: String,
    unit: String,
}

impl SensorValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: unit.into(),
        }
    }

    /// A boolean reading; the unit describes the state (e.g. "locked"/"unlocked").
    pub fn boolean(name: impl Into<String>, value: bool, true_unit: &str, false_unit: &str) -> Self {
        let unit = if value { true_unit } else { false_unit };
        Self::new(name, value.to_string(), unit)
    }

    pub fn real(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self::new(name, format!("{value:.6}"), unit)
    }

    pub fn integer(name: impl Into<String>, value: i64, unit: impl Into<String>) -> Self {
        Self::new(name, value.to_string(), unit)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn to_bool(&self) -> bool {
        self.value.eq_ignore_ascii_case("true")
    }

    pub fn to_real(&self) -> Result<f64> {
        self.value.trim().parse().map_err(|_| {
            Error::InvalidParameter(format!(
                "sensor {} value {:?} is not numeric",
                self.name, self.value
            ))
        })
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.value, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_sensor() {
        let locked = SensorValue::boolean("lo_locked", true, "locked", "unlocked");
        assert!(locked.to_bool());
        assert_eq!(locked.unit(), "locked");
        assert_eq!(locked.to_string(), "lo_locked: true locked");

        let unlocked = SensorValue::boolean("lo_locked", false, "locked", "unlocked");
        assert!(!unlocked.to_bool());
    }

    #[test]
    fn test_real_sensor() {
        let rssi = SensorValue::real("rssi", -42.5, "dB");
        assert!((rssi.to_real().unwrap() + 42.5).abs() < 1e-9);
        assert!(SensorValue::new("gps_gpgga", "$GPGGA,", "").to_real().is_err());
    }
}
