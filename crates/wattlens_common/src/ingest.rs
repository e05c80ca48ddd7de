//! Ingestion: turn device telemetry, smart-meter readings and price feeds
//! into store records.
//!
//! Sample timestamps are normalized to the canonical microsecond form on the
//! way in. An unparseable timestamp rejects the message.

use crate::error::{FieldError, IngestError};
use crate::record::{
    decimal_field, Field, MeasurementRecord, ObisCode, QuoteRecord, SampleRecord, UNKNOWN_UNIT,
};
use crate::timestamp;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const UNKNOWN_DEVICE: &str = "unknown_device";

/// `tele/<device>/SENSOR` → `<device>`
pub fn parse_device_name(topic: &str) -> String {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next()) {
        (Some(_), Some(device)) if !device.is_empty() => device.to_string(),
        _ => UNKNOWN_DEVICE.to_string(),
    }
}

/// Epoch milliseconds or ISO-8601 text → `YYYY-MM-DDTHH:MM:SS.ffffff` (UTC).
///
/// ISO input with an offset or `Z` is converted to UTC; input without one is
/// taken as UTC already.
pub fn normalize_timestamp(input: &str) -> Result<String, IngestError> {
    let trimmed = input.trim();
    let invalid = || IngestError::InvalidTimestamp(input.to_string());

    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let ms: i64 = trimmed.parse().map_err(|_| invalid())?;
        let dt = DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(invalid)?;
        return Ok(timestamp::format_sample(&dt.naive_utc()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp::format_sample(&dt.naive_utc()));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| timestamp::format_sample(&dt))
        .ok_or_else(invalid)
}

/// JSON number or numeric string as stored text. `None` for absent or null.
fn json_text(value: Option<&Value>, field: &'static str) -> Result<Option<String>, FieldError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(FieldError::Malformed {
            field,
            value: other.to_string(),
        }),
    }
}

/// Read one reading; absent readings default to zero.
fn reading(
    block: &Value,
    key: &str,
    field: &'static str,
    defaulted: &mut Vec<&'static str>,
) -> Result<String, FieldError> {
    let raw = json_text(block.get(key), field)?;
    match decimal_field(field, raw.as_deref(), 0.0)? {
        Field::Present(_) => Ok(raw.unwrap_or_default()),
        Field::Defaulted(v) => {
            defaulted.push(field);
            Ok(v.to_string())
        }
    }
}

/// Build a sample from a Tasmota `SENSOR` message.
///
/// `received_at` is the ingestion time; when absent the message's
/// `aws_timestamp` is used, then the current time.
pub fn sample_from_message(
    topic: &str,
    payload: &str,
    received_at: Option<&str>,
) -> Result<SampleRecord, IngestError> {
    let message: Value = serde_json::from_str(payload)?;

    let energy = match message.get("ENERGY") {
        Some(block @ Value::Object(map)) if !map.is_empty() => block,
        _ => return Err(IngestError::NoEnergyData),
    };

    let embedded = message.get("aws_timestamp").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let timestamp = match received_at.map(str::to_string).or(embedded) {
        Some(raw) => normalize_timestamp(&raw)?,
        None => timestamp::format_sample(&Utc::now().naive_utc()),
    };

    let mut defaulted = Vec::new();
    let mut record = SampleRecord {
        device_id: parse_device_name(topic),
        timestamp,
        device_time: message
            .get("Time")
            .and_then(Value::as_str)
            .map(str::to_string),
        current_power: Some(reading(energy, "Power", "current_power", &mut defaulted)?),
        total_energy: Some(reading(energy, "Total", "total_energy", &mut defaulted)?),
        today_energy: Some(reading(energy, "Today", "today_energy", &mut defaulted)?),
        apparent_power: Some(reading(energy, "ApparentPower", "apparent_power", &mut defaulted)?),
        reactive_power: Some(reading(energy, "ReactivePower", "reactive_power", &mut defaulted)?),
        power_factor: Some(reading(energy, "Factor", "power_factor", &mut defaulted)?),
        voltage: Some(reading(energy, "Voltage", "voltage", &mut defaulted)?),
        current: Some(reading(energy, "Current", "current", &mut defaulted)?),
        analog_a0: None,
    };

    if let Some(analog @ Value::Object(map)) = message.get("ANALOG") {
        if !map.is_empty() {
            record.analog_a0 = Some(reading(analog, "A0", "analog_a0", &mut defaulted)?);
        }
    }

    if !defaulted.is_empty() {
        debug!("{}: defaulted {:?}", record.device_id, defaulted);
    }
    Ok(record)
}

#[derive(Debug, Deserialize)]
struct PriceFeed {
    #[serde(default)]
    tariff: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    interval: Option<u32>,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

/// Quotes decoded from one feed document
#[derive(Debug, Clone, PartialEq)]
pub struct FeedImport {
    pub tariff: String,
    pub unit: String,
    pub interval_minutes: u32,
    pub quotes: Vec<QuoteRecord>,
    /// Entries dropped for a missing or unparseable date or value
    pub skipped: usize,
}

/// Decode a spot-price feed: `{tariff, unit, interval, data: [{date, value}]}`.
pub fn quotes_from_feed(json: &str) -> Result<FeedImport, IngestError> {
    let feed: PriceFeed = serde_json::from_str(json)?;
    let entries = feed.data.ok_or(IngestError::EmptyFeed)?;

    let tariff = feed.tariff.unwrap_or_else(|| crate::config::DEFAULT_TARIFF.to_string());
    let unit = feed.unit.unwrap_or_else(|| "ct/kWh".to_string());
    let interval_minutes = feed.interval.unwrap_or(15);

    let mut quotes = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in &entries {
        match quote_from_entry(entry, &tariff, &unit, interval_minutes) {
            Some(quote) => quotes.push(quote),
            None => {
                debug!("Skipping incomplete price entry: {}", entry);
                skipped += 1;
            }
        }
    }

    Ok(FeedImport {
        tariff,
        unit,
        interval_minutes,
        quotes,
        skipped,
    })
}

fn quote_from_entry(entry: &Value, tariff: &str, unit: &str, interval: u32) -> Option<QuoteRecord> {
    let date = entry.get("date")?.as_str()?;
    let timestamp_ms = DateTime::parse_from_rfc3339(date)
        .or_else(|_| DateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()?
        .timestamp_millis();
    let price = json_text(entry.get("value"), "price").ok()??;
    decimal_field("price", Some(&price), 0.0).ok()?;
    Some(QuoteRecord {
        tariff: tariff.to_string(),
        timestamp_ms,
        price: Some(price),
        unit: unit.to_string(),
        interval_minutes: interval,
    })
}

/// Readings decoded from one energyLIVE response
#[derive(Debug, Clone, PartialEq)]
pub struct MeterImport {
    pub device_id: String,
    pub readings: Vec<MeasurementRecord>,
    /// Entries without a code, timestamp or numeric value
    pub skipped: usize,
    /// Readings whose code is outside the OBIS table
    pub unknown_codes: usize,
}

/// Decode an energyLIVE `measurements/latest` response for `device_id`:
/// `[{measurement, timestamp, value}]` with epoch-millisecond timestamps.
pub fn measurements_from_energylive(device_id: &str, json: &str) -> Result<MeterImport, IngestError> {
    let entries: Vec<Value> = serde_json::from_str(json)?;

    let mut import = MeterImport {
        device_id: device_id.to_string(),
        readings: Vec::with_capacity(entries.len()),
        skipped: 0,
        unknown_codes: 0,
    };
    for entry in &entries {
        let Some(reading) = reading_from_entry(entry, device_id) else {
            debug!("Skipping incomplete measurement: {}", entry);
            import.skipped += 1;
            continue;
        };
        if reading.obis().is_none() {
            warn!("Unknown OBIS code {}", reading.obis_code);
            import.unknown_codes += 1;
        }
        import.readings.push(reading);
    }
    Ok(import)
}

fn reading_from_entry(entry: &Value, device_id: &str) -> Option<MeasurementRecord> {
    let code = entry.get("measurement")?.as_str().filter(|c| !c.is_empty())?;
    let timestamp_ms = entry.get("timestamp")?.as_i64()?;
    let value = json_text(entry.get("value"), "value").ok()??;
    decimal_field("value", Some(&value), 0.0).ok()?;

    let (measurement_name, unit) = match ObisCode::from_code(code) {
        Some(obis) => (obis.name().to_string(), obis.unit().to_string()),
        None => (code.to_string(), UNKNOWN_UNIT.to_string()),
    };
    Some(MeasurementRecord {
        device_id: device_id.to_string(),
        timestamp_ms,
        obis_code: code.to_string(),
        measurement_name,
        unit,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name_from_topic() {
        assert_eq!(parse_device_name("tele/serverpowermeter/SENSOR"), "serverpowermeter");
        assert_eq!(parse_device_name("SENSOR"), UNKNOWN_DEVICE);
        assert_eq!(parse_device_name("tele//SENSOR"), UNKNOWN_DEVICE);
        assert_eq!(parse_device_name(""), UNKNOWN_DEVICE);
    }

    #[test]
    fn test_normalize_timestamp_forms() {
        assert_eq!(
            normalize_timestamp("1751208300000").unwrap(),
            "2025-06-29T14:45:00.000000"
        );
        assert_eq!(
            normalize_timestamp("2025-06-29T16:45:00+02:00").unwrap(),
            "2025-06-29T14:45:00.000000"
        );
        assert_eq!(
            normalize_timestamp("2025-06-29T14:45:00.123Z").unwrap(),
            "2025-06-29T14:45:00.123000"
        );
        assert_eq!(
            normalize_timestamp("2025-06-29T14:45:00").unwrap(),
            "2025-06-29T14:45:00.000000"
        );
        assert!(matches!(
            normalize_timestamp("yesterday"),
            Err(IngestError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_sample_from_tasmota_message() {
        let payload = r#"{
            "Time": "2025-06-29T16:45:00",
            "ENERGY": {"Total": 12.345, "Today": 1.2, "Power": 87, "Voltage": 231, "Current": 0.41, "Factor": 0.92},
            "ANALOG": {"A0": 512}
        }"#;
        let record =
            sample_from_message("tele/serverpowermeter/SENSOR", payload, Some("2025-06-29T14:45:00Z")).unwrap();
        assert_eq!(record.device_id, "serverpowermeter");
        assert_eq!(record.timestamp, "2025-06-29T14:45:00.000000");
        assert_eq!(record.device_time.as_deref(), Some("2025-06-29T16:45:00"));
        assert_eq!(record.power_watts(), Ok(87.0));
        assert_eq!(record.total_energy.as_deref(), Some("12.345"));
        assert_eq!(record.apparent_power.as_deref(), Some("0"));
        assert_eq!(record.analog_a0.as_deref(), Some("512"));
    }

    #[test]
    fn test_message_without_energy_is_rejected() {
        let err = sample_from_message("tele/x/SENSOR", r#"{"Time": "t"}"#, None).unwrap_err();
        assert!(matches!(err, IngestError::NoEnergyData));
    }

    #[test]
    fn test_malformed_reading_rejects_message() {
        let payload = r#"{"ENERGY": {"Power": "lots"}}"#;
        let err = sample_from_message("tele/x/SENSOR", payload, Some("1751208300000")).unwrap_err();
        assert!(matches!(err, IngestError::Field(FieldError::Malformed { field: "current_power", .. })));
    }

    #[test]
    fn test_unparseable_received_at_is_rejected() {
        let payload = r#"{"ENERGY": {"Power": 10}}"#;
        let err = sample_from_message("tele/x/SENSOR", payload, Some("soon")).unwrap_err();
        assert!(matches!(err, IngestError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_feed_skips_incomplete_entries() {
        let json = r#"{
            "tariff": "EPEXSPOTAT",
            "unit": "ct/kWh",
            "interval": 15,
            "data": [
                {"date": "2025-06-29T16:45:00+02:00", "value": 9.87},
                {"date": "2025-06-29T17:00:00+02:00"},
                {"value": 3.1},
                {"date": "not a date", "value": 1.0}
            ]
        }"#;
        let import = quotes_from_feed(json).unwrap();
        assert_eq!(import.quotes.len(), 1);
        assert_eq!(import.skipped, 3);
        assert_eq!(import.quotes[0].timestamp_ms, 1_751_208_300_000);
        assert_eq!(import.quotes[0].price_cents(), Ok(9.87));
    }

    #[test]
    fn test_feed_without_data_is_empty() {
        assert!(matches!(quotes_from_feed(r#"{"tariff": "X"}"#), Err(IngestError::EmptyFeed)));
    }

    #[test]
    fn test_energylive_readings_through_obis_table() {
        let json = r#"[
            {"measurement": "0100010700", "timestamp": 1751208300000, "value": 245.5},
            {"measurement": "0100010800", "timestamp": 1751208300000, "value": 1234567},
            {"measurement": "0100990700", "timestamp": 1751208300000, "value": 1},
            {"measurement": "0100020700", "timestamp": 1751208300000},
            {"timestamp": 1751208300000, "value": 3}
        ]"#;
        let import = measurements_from_energylive("I-10082023-01658401", json).unwrap();
        assert_eq!(import.readings.len(), 3);
        assert_eq!(import.skipped, 2);
        assert_eq!(import.unknown_codes, 1);

        let power = &import.readings[0];
        assert_eq!(power.obis(), Some(ObisCode::ActivePowerPlus));
        assert_eq!(power.measurement_name, "active_power_plus");
        assert_eq!(power.unit, "W");
        assert_eq!(power.value(), Ok(245.5));
        assert_eq!(import.readings[1].unit, "Wh");

        let unknown = &import.readings[2];
        assert_eq!(unknown.measurement_name, "0100990700");
        assert_eq!(unknown.unit, UNKNOWN_UNIT);
    }

    #[test]
    fn test_energylive_empty_response() {
        let import = measurements_from_energylive("dev", "[]").unwrap();
        assert!(import.readings.is_empty());
        assert!(matches!(
            measurements_from_energylive("dev", r#"{"error": "unauthorized"}"#),
            Err(IngestError::Json(_))
        ));
    }
}
