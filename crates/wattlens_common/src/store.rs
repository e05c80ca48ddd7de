//! Time-series store: range queries by partition key + ordered sort key.
//!
//! Two logical collections feed the analysis:
//! - `sensor_data`: power samples keyed by (device_id, timestamp string)
//! - `spot_prices`: price quotes keyed by (tariff, timestamp_ms)
//!
//! A third, `meter_readings`, holds smart-meter OBIS readings keyed by
//! (device_id, obis_code, timestamp_ms). Only ingestion writes it.
//!
//! Empty ranges come back as empty vectors. Busy/locked conditions surface as
//! [`StoreError::Transient`]; retrying is the caller's business, see
//! [`with_backoff`].

use crate::error::StoreError;
use crate::record::{MeasurementRecord, QuoteRecord, SampleRecord};
use crate::timestamp;
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Range queries over the two collections, ascending by sort key.
pub trait TimeSeriesStore {
    /// Samples of one device with `lower <= timestamp <= upper`.
    fn query_samples(
        &self,
        device_id: &str,
        lower: &str,
        upper: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SampleRecord>, StoreError>;

    /// Quotes of one tariff with `lower_ms <= timestamp_ms <= upper_ms`.
    fn query_quotes(
        &self,
        tariff: &str,
        lower_ms: i64,
        upper_ms: i64,
        limit: Option<usize>,
    ) -> Result<Vec<QuoteRecord>, StoreError>;

    /// A handful of samples, any device, for discovery.
    fn scan_samples(&self, limit: usize) -> Result<Vec<SampleRecord>, StoreError>;

    /// A handful of quotes, any tariff, for discovery.
    fn scan_quotes(&self, limit: usize) -> Result<Vec<QuoteRecord>, StoreError>;
}

impl<S: TimeSeriesStore + ?Sized> TimeSeriesStore for &S {
    fn query_samples(
        &self,
        device_id: &str,
        lower: &str,
        upper: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SampleRecord>, StoreError> {
        (**self).query_samples(device_id, lower, upper, limit)
    }

    fn query_quotes(
        &self,
        tariff: &str,
        lower_ms: i64,
        upper_ms: i64,
        limit: Option<usize>,
    ) -> Result<Vec<QuoteRecord>, StoreError> {
        (**self).query_quotes(tariff, lower_ms, upper_ms, limit)
    }

    fn scan_samples(&self, limit: usize) -> Result<Vec<SampleRecord>, StoreError> {
        (**self).scan_samples(limit)
    }

    fn scan_quotes(&self, limit: usize) -> Result<Vec<QuoteRecord>, StoreError> {
        (**self).scan_quotes(limit)
    }
}

/// Primary key of a sample row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleKey {
    pub device_id: String,
    pub timestamp: String,
}

const SAMPLE_COLUMNS: &str = "device_id, timestamp, device_time, current_power, total_energy, \
     today_energy, apparent_power, reactive_power, power_factor, voltage, current, analog_a0";

const QUOTE_COLUMNS: &str = "tariff, timestamp_ms, price, unit, interval_minutes";

const MEASUREMENT_COLUMNS: &str = "device_id, timestamp_ms, obis_code, measurement_name, unit, value";

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the store at a specific path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path_ref)?;

        // WAL lets ingestion keep writing while an analysis run reads
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_data (
                device_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                device_time TEXT,
                current_power TEXT,
                total_energy TEXT,
                today_energy TEXT,
                apparent_power TEXT,
                reactive_power TEXT,
                power_factor TEXT,
                voltage TEXT,
                current TEXT,
                analog_a0 TEXT,
                PRIMARY KEY (device_id, timestamp)
            );

            CREATE TABLE IF NOT EXISTS spot_prices (
                tariff TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                price TEXT,
                unit TEXT NOT NULL DEFAULT 'ct/kWh',
                interval_minutes INTEGER NOT NULL DEFAULT 15,
                PRIMARY KEY (tariff, timestamp_ms)
            );

            CREATE TABLE IF NOT EXISTS meter_readings (
                device_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                obis_code TEXT NOT NULL,
                measurement_name TEXT NOT NULL,
                unit TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (device_id, obis_code, timestamp_ms)
            );
            "#,
        )?;

        debug!("Opened store at {}", path_ref.display());
        Ok(Self { conn })
    }

    /// Insert or replace a sample keyed by (device_id, timestamp)
    pub fn put_sample(&self, sample: &SampleRecord) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO sensor_data ({SAMPLE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            &sample_params(sample)[..],
        )?;
        Ok(())
    }

    /// Insert multiple samples in a transaction
    pub fn put_samples(&self, samples: &[SampleRecord]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO sensor_data ({SAMPLE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ))?;
            for sample in samples {
                stmt.execute(&sample_params(sample)[..])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert a quote unless one already exists for (tariff, timestamp_ms).
    ///
    /// Returns `false` for a duplicate; the stored quote is left untouched.
    pub fn insert_quote_if_absent(&self, quote: &QuoteRecord) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO spot_prices ({QUOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                &quote.tariff,
                quote.timestamp_ms,
                &quote.price,
                &quote.unit,
                quote.interval_minutes
            ],
        )?;
        Ok(changed == 1)
    }

    /// Insert a meter reading unless (device_id, obis_code, timestamp_ms) exists.
    pub fn insert_measurement_if_absent(
        &self,
        reading: &MeasurementRecord,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO meter_readings ({MEASUREMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                &reading.device_id,
                reading.timestamp_ms,
                &reading.obis_code,
                &reading.measurement_name,
                &reading.unit,
                &reading.value
            ],
        )?;
        Ok(changed == 1)
    }

    /// Readings of one device and code with `lower_ms <= timestamp_ms <= upper_ms`.
    pub fn query_measurements(
        &self,
        device_id: &str,
        obis_code: &str,
        lower_ms: i64,
        upper_ms: i64,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEASUREMENT_COLUMNS}
             FROM meter_readings
             WHERE device_id = ?1 AND obis_code = ?2 AND timestamp_ms BETWEEN ?3 AND ?4
             ORDER BY timestamp_ms ASC"
        ))?;
        let rows = stmt.query_map(params![device_id, obis_code, lower_ms, upper_ms], |row| {
            Ok(MeasurementRecord {
                device_id: row.get(0)?,
                timestamp_ms: row.get(1)?,
                obis_code: row.get(2)?,
                measurement_name: row.get(3)?,
                unit: row.get(4)?,
                value: text_column(row, 5)?.unwrap_or_default(),
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn sample_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn quote_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM spot_prices", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn measurement_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM meter_readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Keys of samples whose timestamp lacks the microsecond suffix
    pub fn legacy_sample_keys(&self) -> Result<Vec<SampleKey>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT device_id, timestamp FROM sensor_data ORDER BY device_id, timestamp")?;

        let rows = stmt.query_map([], |row| {
            Ok(SampleKey {
                device_id: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;

        let mut legacy = Vec::new();
        for row in rows {
            let key = row?;
            if !timestamp::is_canonical(&key.timestamp) {
                legacy.push(key);
            }
        }
        Ok(legacy)
    }

    /// Delete samples by key in one transaction, returns rows removed
    pub fn delete_samples(&self, keys: &[SampleKey]) -> Result<u64, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0u64;
        {
            let mut stmt =
                tx.prepare("DELETE FROM sensor_data WHERE device_id = ?1 AND timestamp = ?2")?;
            for key in keys {
                deleted += stmt.execute(params![&key.device_id, &key.timestamp])? as u64;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}

impl TimeSeriesStore for SqliteStore {
    fn query_samples(
        &self,
        device_id: &str,
        lower: &str,
        upper: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SampleRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM sensor_data
             WHERE device_id = ?1 AND timestamp BETWEEN ?2 AND ?3
             ORDER BY timestamp ASC
             LIMIT ?4"
        ))?;

        let rows = stmt.query_map(params![device_id, lower, upper, sql_limit(limit)], sample_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        debug!(
            "query_samples {} [{} .. {}] -> {} rows",
            device_id,
            lower,
            upper,
            results.len()
        );
        Ok(results)
    }

    fn query_quotes(
        &self,
        tariff: &str,
        lower_ms: i64,
        upper_ms: i64,
        limit: Option<usize>,
    ) -> Result<Vec<QuoteRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUOTE_COLUMNS}
             FROM spot_prices
             WHERE tariff = ?1 AND timestamp_ms BETWEEN ?2 AND ?3
             ORDER BY timestamp_ms ASC
             LIMIT ?4"
        ))?;

        let rows = stmt.query_map(
            params![tariff, lower_ms, upper_ms, sql_limit(limit)],
            quote_from_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        debug!(
            "query_quotes {} [{} .. {}] -> {} rows",
            tariff,
            lower_ms,
            upper_ms,
            results.len()
        );
        Ok(results)
    }

    fn scan_samples(&self, limit: usize) -> Result<Vec<SampleRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM sensor_data ORDER BY rowid LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], sample_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn scan_quotes(&self, limit: usize) -> Result<Vec<QuoteRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUOTE_COLUMNS} FROM spot_prices ORDER BY rowid LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], quote_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

/// SQLite treats a negative LIMIT as "no limit".
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(-1)
}

fn sample_params(sample: &SampleRecord) -> [&dyn rusqlite::ToSql; 12] {
    [
        &sample.device_id,
        &sample.timestamp,
        &sample.device_time,
        &sample.current_power,
        &sample.total_energy,
        &sample.today_energy,
        &sample.apparent_power,
        &sample.reactive_power,
        &sample.power_factor,
        &sample.voltage,
        &sample.current,
        &sample.analog_a0,
    ]
}

/// Read a loosely typed column as text.
///
/// SQLite does not enforce column types, so a numeric value written by some
/// other tool is accepted and rendered as text; blobs are kept as an
/// unparseable marker so they end up classified as malformed.
fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get::<_, Value>(idx)? {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(_) => Some("<blob>".to_string()),
    })
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<SampleRecord> {
    Ok(SampleRecord {
        device_id: row.get(0)?,
        timestamp: row.get(1)?,
        device_time: text_column(row, 2)?,
        current_power: text_column(row, 3)?,
        total_energy: text_column(row, 4)?,
        today_energy: text_column(row, 5)?,
        apparent_power: text_column(row, 6)?,
        reactive_power: text_column(row, 7)?,
        power_factor: text_column(row, 8)?,
        voltage: text_column(row, 9)?,
        current: text_column(row, 10)?,
        analog_a0: text_column(row, 11)?,
    })
}

fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<QuoteRecord> {
    Ok(QuoteRecord {
        tariff: row.get(0)?,
        timestamp_ms: row.get(1)?,
        price: text_column(row, 2)?,
        unit: row.get(3)?,
        interval_minutes: u32::try_from(row.get::<_, i64>(4)?)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Integer, Box::new(e)))?,
    })
}

/// Exponential backoff for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Run `op`, retrying transient failures with delays of
/// `base_delay * 2^attempt`. Other errors return immediately.
pub fn with_backoff<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0u32;
    loop {
        match op() {
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt);
                warn!("{}, retrying in {:?}", e, delay);
                std::thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (NamedTempFile, SqliteStore) {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::open_at(tmp.path()).unwrap();
        (tmp, store)
    }

    fn sample(ts: &str, power: &str) -> SampleRecord {
        SampleRecord {
            device_id: "serverpowermeter".to_string(),
            timestamp: ts.to_string(),
            current_power: Some(power.to_string()),
            ..Default::default()
        }
    }

    fn quote(ts_ms: i64, price: &str) -> QuoteRecord {
        QuoteRecord {
            tariff: "EPEXSPOTAT".to_string(),
            timestamp_ms: ts_ms,
            price: Some(price.to_string()),
            unit: "ct/kWh".to_string(),
            interval_minutes: 15,
        }
    }

    #[test]
    fn test_query_range_is_inclusive_and_ordered() {
        let (_tmp, store) = test_store();
        store
            .put_samples(&[
                sample("2025-06-29T14:46:00.000000", "52.0"),
                sample("2025-06-29T14:45:00.000000", "51.0"),
                sample("2025-06-29T15:00:00.000000", "53.0"),
                sample("2025-06-29T15:00:00.500000", "99.0"),
            ])
            .unwrap();

        let rows = store
            .query_samples(
                "serverpowermeter",
                "2025-06-29T14:45:00",
                "2025-06-29T15:00:00.000000",
                None,
            )
            .unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            vec![
                "2025-06-29T14:45:00.000000",
                "2025-06-29T14:46:00.000000",
                "2025-06-29T15:00:00.000000"
            ]
        );
    }

    #[test]
    fn test_empty_range_is_not_an_error() {
        let (_tmp, store) = test_store();
        let rows = store
            .query_samples("nobody", "2025-06-29T00:00:00", "2025-06-29T23:59:59", None)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_limit_and_scan() {
        let (_tmp, store) = test_store();
        let samples: Vec<_> = (0..10)
            .map(|i| sample(&format!("2025-06-29T14:{:02}:00.000000", i), "10"))
            .collect();
        store.put_samples(&samples).unwrap();

        let limited = store
            .query_samples("serverpowermeter", "2025-06-29T00:00:00", "2025-06-29T23:59:59", Some(3))
            .unwrap();
        assert_eq!(limited.len(), 3);
        assert_eq!(store.scan_samples(5).unwrap().len(), 5);
        assert_eq!(store.sample_count().unwrap(), 10);
    }

    #[test]
    fn test_put_sample_upserts() {
        let (_tmp, store) = test_store();
        store.put_sample(&sample("2025-06-29T14:45:00.000000", "10")).unwrap();
        store.put_sample(&sample("2025-06-29T14:45:00.000000", "20")).unwrap();

        let rows = store.scan_samples(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].current_power.as_deref(), Some("20"));
    }

    #[test]
    fn test_quote_insert_if_absent_rejects_duplicates() {
        let (_tmp, store) = test_store();
        assert!(store.insert_quote_if_absent(&quote(1_000, "10.0")).unwrap());
        assert!(!store.insert_quote_if_absent(&quote(1_000, "99.0")).unwrap());

        let quotes = store.query_quotes("EPEXSPOTAT", 0, 2_000, None).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].price.as_deref(), Some("10.0"));
    }

    #[test]
    fn test_measurement_insert_if_absent_and_range() {
        let (_tmp, store) = test_store();
        let reading = |ts: i64, code: &str, value: &str| MeasurementRecord {
            device_id: "I-10082023-01658401".to_string(),
            timestamp_ms: ts,
            obis_code: code.to_string(),
            measurement_name: "active_power_plus".to_string(),
            unit: "W".to_string(),
            value: value.to_string(),
        };
        assert!(store.insert_measurement_if_absent(&reading(1_000, "0100010700", "250")).unwrap());
        assert!(!store.insert_measurement_if_absent(&reading(1_000, "0100010700", "999")).unwrap());
        assert!(store.insert_measurement_if_absent(&reading(1_000, "0100010800", "12000")).unwrap());
        assert!(store.insert_measurement_if_absent(&reading(3_000, "0100010700", "260")).unwrap());

        let rows = store
            .query_measurements("I-10082023-01658401", "0100010700", 0, 2_000)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value(), Ok(250.0));
        assert_eq!(store.measurement_count().unwrap(), 3);
    }

    #[test]
    fn test_legacy_keys_and_cleanup() {
        let (_tmp, store) = test_store();
        store
            .put_samples(&[
                sample("2025-06-29T14:45:00", "10"),
                sample("2025-06-29T14:46:00.000000", "10"),
                sample("2025-06-29T14:47:00.123", "10"),
            ])
            .unwrap();

        let legacy = store.legacy_sample_keys().unwrap();
        assert_eq!(legacy.len(), 2);
        assert_eq!(store.delete_samples(&legacy).unwrap(), 2);
        assert_eq!(store.sample_count().unwrap(), 1);
        assert!(store.legacy_sample_keys().unwrap().is_empty());
    }

    #[test]
    fn test_numeric_column_reads_back_as_text() {
        let (_tmp, store) = test_store();
        store
            .conn
            .execute(
                "INSERT INTO sensor_data (device_id, timestamp, current_power) VALUES (?1, ?2, ?3)",
                params!["m", "2025-06-29T14:45:00.000000", 42.5f64],
            )
            .unwrap();
        let rows = store.scan_samples(1).unwrap();
        assert_eq!(rows[0].power_watts(), Ok(42.5));
    }

    #[test]
    fn test_out_of_range_interval_is_an_error() {
        let (_tmp, store) = test_store();
        store
            .conn
            .execute(
                "INSERT INTO spot_prices (tariff, timestamp_ms, price, interval_minutes)
                 VALUES ('EPEXSPOTAT', 1000, '10.0', -15)",
                [],
            )
            .unwrap();
        let err = store.query_quotes("EPEXSPOTAT", 0, 2_000, None).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_backoff_retries_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        };
        let mut calls = 0;
        let result = with_backoff(&policy, || {
            calls += 1;
            if calls < 3 {
                Err(StoreError::Transient("busy".to_string()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_backoff_gives_up_on_backend_errors() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::ZERO,
        };
        let mut calls = 0;
        let result: Result<(), _> = with_backoff(&policy, || {
            calls += 1;
            Err(StoreError::Backend("no such table".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
