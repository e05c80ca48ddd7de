//! Persisted record shapes for the logical collections.
//!
//! Numeric readings are kept as the decimal text they were stored with, so
//! nothing is lost to binary floating point until a value is actually used.
//! Conversion goes through [`decimal_field`], which separates a missing field
//! from a malformed one.

use crate::error::FieldError;
use serde::{Deserialize, Serialize};

/// Outcome of reading an optional numeric field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<T> {
    /// The field was present and parsed.
    Present(T),
    /// The field was absent and the default was applied.
    Defaulted(T),
}

impl<T: Copy> Field<T> {
    pub fn value(&self) -> T {
        match self {
            Field::Present(v) | Field::Defaulted(v) => *v,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Field::Defaulted(_))
    }
}

/// Parse one decimal field.
///
/// * absent → `Ok(Field::Defaulted(default))`
/// * present and numeric → `Ok(Field::Present(v))`
/// * present but not a finite number → `Err(FieldError::Malformed)`
pub fn decimal_field(
    name: &'static str,
    raw: Option<&str>,
    default: f64,
) -> Result<Field<f64>, FieldError> {
    match raw {
        None => Ok(Field::Defaulted(default)),
        Some(text) => parse_decimal(name, text).map(Field::Present),
    }
}

/// Parse a required decimal field.
pub fn required_decimal(name: &'static str, raw: Option<&str>) -> Result<f64, FieldError> {
    match raw {
        None => Err(FieldError::Missing(name)),
        Some(text) => parse_decimal(name, text),
    }
}

fn parse_decimal(name: &'static str, text: &str) -> Result<f64, FieldError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FieldError::Malformed {
            field: name,
            value: text.to_string(),
        })
}

/// One power-meter reading as persisted in `sensor_data`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Partition key
    pub device_id: String,
    /// Sort key, `YYYY-MM-DDTHH:MM:SS.ffffff` (UTC)
    pub timestamp: String,
    /// Clock reported by the device itself
    pub device_time: Option<String>,
    /// Active power in watts
    pub current_power: Option<String>,
    /// Meter total in kWh
    pub total_energy: Option<String>,
    pub today_energy: Option<String>,
    pub apparent_power: Option<String>,
    pub reactive_power: Option<String>,
    pub power_factor: Option<String>,
    pub voltage: Option<String>,
    pub current: Option<String>,
    /// Analog channel A0, only on devices that report one
    pub analog_a0: Option<String>,
}

impl SampleRecord {
    /// Active power in watts. Missing or malformed means the record is unusable.
    pub fn power_watts(&self) -> Result<f64, FieldError> {
        required_decimal("current_power", self.current_power.as_deref())
    }
}

/// One spot-price quote as persisted in `spot_prices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Partition key
    pub tariff: String,
    /// Sort key, epoch milliseconds (UTC)
    pub timestamp_ms: i64,
    /// Price in cents/kWh
    pub price: Option<String>,
    pub unit: String,
    pub interval_minutes: u32,
}

impl QuoteRecord {
    pub fn price_cents(&self) -> Result<f64, FieldError> {
        required_decimal("price", self.price.as_deref())
    }
}

/// OBIS measurands reported by the energyLIVE smart-meter interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObisCode {
    /// Active power drawn from the grid (P+)
    ActivePowerPlus,
    /// Active energy drawn from the grid (E+)
    ActiveEnergyPlus,
    /// Active power fed into the grid (P-)
    ActivePowerMinus,
    /// Active energy fed into the grid (E-)
    ActiveEnergyMinus,
}

impl ObisCode {
    pub const ALL: [ObisCode; 4] = [
        ObisCode::ActivePowerPlus,
        ObisCode::ActiveEnergyPlus,
        ObisCode::ActivePowerMinus,
        ObisCode::ActiveEnergyMinus,
    ];

    /// Code as the interface reports it
    pub fn code(self) -> &'static str {
        match self {
            ObisCode::ActivePowerPlus => "0100010700",
            ObisCode::ActiveEnergyPlus => "0100010800",
            ObisCode::ActivePowerMinus => "0100020700",
            ObisCode::ActiveEnergyMinus => "0100020800",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|obis| obis.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ObisCode::ActivePowerPlus => "active_power_plus",
            ObisCode::ActiveEnergyPlus => "active_energy_plus",
            ObisCode::ActivePowerMinus => "active_power_minus",
            ObisCode::ActiveEnergyMinus => "active_energy_minus",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ObisCode::ActivePowerPlus => "Active power (P+)",
            ObisCode::ActiveEnergyPlus => "Active energy (E+)",
            ObisCode::ActivePowerMinus => "Active power (P-)",
            ObisCode::ActiveEnergyMinus => "Active energy (E-)",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            ObisCode::ActivePowerPlus | ObisCode::ActivePowerMinus => "W",
            ObisCode::ActiveEnergyPlus | ObisCode::ActiveEnergyMinus => "Wh",
        }
    }
}

/// Unit stored for codes outside the OBIS table
pub const UNKNOWN_UNIT: &str = "unknown";

/// One smart-meter reading as persisted in `meter_readings`.
///
/// Codes outside [`ObisCode`] are kept with the raw code as their name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Partition key, the interface UID
    pub device_id: String,
    /// Sort key, epoch milliseconds (UTC)
    pub timestamp_ms: i64,
    pub obis_code: String,
    pub measurement_name: String,
    pub unit: String,
    pub value: String,
}

impl MeasurementRecord {
    pub fn obis(&self) -> Option<ObisCode> {
        ObisCode::from_code(&self.obis_code)
    }

    pub fn value(&self) -> Result<f64, FieldError> {
        required_decimal("value", Some(&self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_field_applies_default() {
        let field = decimal_field("voltage", None, 0.0).unwrap();
        assert!(field.is_defaulted());
        assert_eq!(field.value(), 0.0);
    }

    #[test]
    fn test_malformed_field_is_an_error() {
        let err = decimal_field("voltage", Some("n/a"), 0.0).unwrap_err();
        assert!(matches!(err, FieldError::Malformed { field: "voltage", .. }));
        assert!(decimal_field("voltage", Some("NaN"), 0.0).is_err());
    }

    #[test]
    fn test_power_missing_vs_malformed() {
        let mut record = SampleRecord {
            device_id: "meter".to_string(),
            timestamp: "2025-06-29T14:45:00.000000".to_string(),
            ..Default::default()
        };
        assert_eq!(record.power_watts(), Err(FieldError::Missing("current_power")));

        record.current_power = Some("12,5".to_string());
        assert!(matches!(record.power_watts(), Err(FieldError::Malformed { .. })));

        record.current_power = Some(" 42.50 ".to_string());
        assert_eq!(record.power_watts(), Ok(42.5));
    }

    #[test]
    fn test_obis_table_lookup() {
        let obis = ObisCode::from_code("0100010700").unwrap();
        assert_eq!(obis, ObisCode::ActivePowerPlus);
        assert_eq!(obis.name(), "active_power_plus");
        assert_eq!(obis.unit(), "W");
        assert_eq!(ObisCode::from_code("0100020800").map(ObisCode::unit), Some("Wh"));
        assert_eq!(ObisCode::from_code("0100990700"), None);
    }
}
