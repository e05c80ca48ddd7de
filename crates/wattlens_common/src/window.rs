//! Analysis window definitions.
//!
//! A window is a named span of a measurement campaign tagged with the
//! temporal pattern of the workload that ran in it. Cyclic windows list their
//! active sub-intervals explicitly; only those are ever queried.
//!
//! Definitions are validated once, when the configuration is loaded, so the
//! aggregators can rely on the pattern invariants.

use crate::error::WindowError;
use crate::timestamp;
use serde::{Deserialize, Serialize};

/// Temporal pattern of a workload window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// One short event (reboot, maintenance run)
    Single,
    /// One uninterrupted span (idle baseline)
    Continuous,
    /// Repeating active/pause sub-intervals
    Cyclic,
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Continuous => write!(f, "continuous"),
            Self::Cyclic => write!(f, "cyclic"),
        }
    }
}

/// Inclusive `[start, end]` span in UTC window-bound format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: String,
    pub end: String,
}

impl Interval {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Length in minutes, `None` if a bound does not parse
    pub fn minutes(&self) -> Option<i64> {
        timestamp::minutes_between(&self.start, &self.end)
    }
}

/// Window definition as written in the configuration file.
///
/// `active_intervals` may be omitted for single/continuous windows.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWindowDefinition {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: Pattern,
    pub overall_start: String,
    pub overall_end: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub active_intervals: Vec<(String, String)>,
}

/// Validated window definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWindowDefinition", into = "RawWindowDefinitionOut")]
pub struct WindowDefinition {
    key: String,
    display_name: String,
    description: String,
    pattern: Pattern,
    overall: Interval,
    duration_minutes: i64,
    active_intervals: Vec<Interval>,
}

impl WindowDefinition {
    /// Window with one interval equal to its span
    pub fn spanning(
        key: &str,
        display_name: &str,
        pattern: Pattern,
        start: &str,
        end: &str,
    ) -> Result<Self, WindowError> {
        let duration = timestamp::minutes_between(start, end).ok_or_else(|| {
            WindowError::InvalidTimestamp {
                key: key.to_string(),
                value: format!("{} - {}", start, end),
            }
        })?;
        Self::try_from(RawWindowDefinition {
            key: key.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            pattern,
            overall_start: start.to_string(),
            overall_end: end.to_string(),
            duration_minutes: duration,
            active_intervals: Vec::new(),
        })
    }

    /// Cyclic window with explicit active sub-intervals
    pub fn cyclic(
        key: &str,
        display_name: &str,
        start: &str,
        end: &str,
        active: &[(&str, &str)],
    ) -> Result<Self, WindowError> {
        let duration = timestamp::minutes_between(start, end).ok_or_else(|| {
            WindowError::InvalidTimestamp {
                key: key.to_string(),
                value: format!("{} - {}", start, end),
            }
        })?;
        Self::try_from(RawWindowDefinition {
            key: key.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            pattern: Pattern::Cyclic,
            overall_start: start.to_string(),
            overall_end: end.to_string(),
            duration_minutes: duration,
            active_intervals: active
                .iter()
                .map(|(s, e)| (s.to_string(), e.to_string()))
                .collect(),
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn overall(&self) -> &Interval {
        &self.overall
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }

    /// Intervals to query. One for single/continuous, one per cycle for cyclic.
    pub fn active_intervals(&self) -> &[Interval] {
        &self.active_intervals
    }

    /// Minutes that count toward energy: the sum of the active intervals for
    /// cyclic windows, the declared duration otherwise.
    pub fn active_duration_minutes(&self) -> i64 {
        match self.pattern {
            Pattern::Cyclic => self
                .active_intervals
                .iter()
                .filter_map(Interval::minutes)
                .sum(),
            Pattern::Single | Pattern::Continuous => self.duration_minutes,
        }
    }

    pub fn declared_cycles(&self) -> usize {
        match self.pattern {
            Pattern::Cyclic => self.active_intervals.len(),
            Pattern::Single | Pattern::Continuous => 1,
        }
    }
}

impl TryFrom<RawWindowDefinition> for WindowDefinition {
    type Error = WindowError;

    fn try_from(raw: RawWindowDefinition) -> Result<Self, Self::Error> {
        let key = raw.key.clone();
        let invalid = |value: &str| WindowError::InvalidTimestamp {
            key: key.clone(),
            value: value.to_string(),
        };

        let start = timestamp::parse_bound(&raw.overall_start)
            .ok_or_else(|| invalid(&raw.overall_start))?;
        let end =
            timestamp::parse_bound(&raw.overall_end).ok_or_else(|| invalid(&raw.overall_end))?;
        if end <= start {
            return Err(WindowError::EmptySpan {
                key,
                start: raw.overall_start,
                end: raw.overall_end,
            });
        }

        let actual = (end - start).num_minutes();
        if actual != raw.duration_minutes {
            return Err(WindowError::DurationMismatch {
                key,
                declared: raw.duration_minutes,
                actual,
            });
        }

        let overall = Interval::new(&raw.overall_start, &raw.overall_end);
        let intervals: Vec<Interval> = raw
            .active_intervals
            .iter()
            .map(|(s, e)| Interval::new(s, e))
            .collect();

        let active_intervals = match raw.pattern {
            Pattern::Single | Pattern::Continuous => match intervals.as_slice() {
                [] => vec![overall.clone()],
                [only] if *only == overall => intervals,
                _ => {
                    return Err(WindowError::SingleIntervalMismatch {
                        key,
                        pattern: raw.pattern.to_string(),
                    })
                }
            },
            Pattern::Cyclic => {
                validate_cycles(&key, start, end, &intervals)?;
                intervals
            }
        };

        Ok(Self {
            key: raw.key,
            display_name: raw.display_name,
            description: raw.description,
            pattern: raw.pattern,
            overall,
            duration_minutes: raw.duration_minutes,
            active_intervals,
        })
    }
}

/// Cyclic invariants: non-empty, inside the window, strictly increasing,
/// non-overlapping, identical sub-durations.
fn validate_cycles(
    key: &str,
    window_start: chrono::NaiveDateTime,
    window_end: chrono::NaiveDateTime,
    intervals: &[Interval],
) -> Result<(), WindowError> {
    if intervals.is_empty() {
        return Err(WindowError::NoActiveIntervals {
            key: key.to_string(),
        });
    }

    let mut expected_minutes = None;
    let mut previous_end = None;

    for interval in intervals {
        let invalid = |value: &str| WindowError::InvalidTimestamp {
            key: key.to_string(),
            value: value.to_string(),
        };
        let start = timestamp::parse_bound(&interval.start).ok_or_else(|| invalid(&interval.start))?;
        let end = timestamp::parse_bound(&interval.end).ok_or_else(|| invalid(&interval.end))?;

        if end <= start {
            return Err(WindowError::EmptySpan {
                key: key.to_string(),
                start: interval.start.clone(),
                end: interval.end.clone(),
            });
        }
        if start < window_start || end > window_end {
            return Err(WindowError::IntervalOutsideWindow {
                key: key.to_string(),
                start: interval.start.clone(),
                end: interval.end.clone(),
            });
        }
        if previous_end.is_some_and(|prev| start <= prev) {
            return Err(WindowError::OverlappingIntervals {
                key: key.to_string(),
            });
        }

        let minutes = (end - start).num_minutes();
        match expected_minutes {
            None => expected_minutes = Some(minutes),
            Some(expected) if expected != minutes => {
                return Err(WindowError::UnequalIntervals {
                    key: key.to_string(),
                    expected,
                    found: minutes,
                })
            }
            Some(_) => {}
        }
        previous_end = Some(end);
    }
    Ok(())
}

/// Serialized shape, mirrors [`RawWindowDefinition`]
#[derive(Serialize)]
struct RawWindowDefinitionOut {
    key: String,
    display_name: String,
    description: String,
    pattern: Pattern,
    overall_start: String,
    overall_end: String,
    duration_minutes: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    active_intervals: Vec<(String, String)>,
}

impl From<WindowDefinition> for RawWindowDefinitionOut {
    fn from(def: WindowDefinition) -> Self {
        let active_intervals = match def.pattern {
            Pattern::Cyclic => def
                .active_intervals
                .into_iter()
                .map(|i| (i.start, i.end))
                .collect(),
            Pattern::Single | Pattern::Continuous => Vec::new(),
        };
        Self {
            key: def.key,
            display_name: def.display_name,
            description: def.description,
            pattern: def.pattern,
            overall_start: def.overall.start,
            overall_end: def.overall.end,
            duration_minutes: def.duration_minutes,
            active_intervals,
        }
    }
}

/// Workload table of the 2025-06-29 measurement campaign (UTC, local +2h).
pub fn default_windows() -> Vec<WindowDefinition> {
    let date = "2025-06-29";
    let t = |hm: &str| format!("{}T{}:00", date, hm);

    let mut windows = Vec::new();

    let cpu = [("14:45", "15:00"), ("15:15", "15:30"), ("15:45", "16:00"), ("16:15", "16:30")];
    let cpu: Vec<(String, String)> = cpu.iter().map(|(s, e)| (t(s), t(e))).collect();
    let cpu_refs: Vec<(&str, &str)> = cpu.iter().map(|(s, e)| (s.as_str(), e.as_str())).collect();

    let io = [("16:45", "17:00"), ("17:15", "17:30")];
    let io: Vec<(String, String)> = io.iter().map(|(s, e)| (t(s), t(e))).collect();
    let io_refs: Vec<(&str, &str)> = io.iter().map(|(s, e)| (s.as_str(), e.as_str())).collect();

    let defs = [
        WindowDefinition::cyclic(
            "WL1_CPU_Stress",
            "Maximum Computational Load",
            &t("14:45"),
            &t("16:45"),
            &cpu_refs,
        )
        .map(|w| w.with_description("CPU stress testing with stress-ng (4 cycles: 15min stress + 15min pause)")),
        WindowDefinition::cyclic(
            "WL2_IO_Stress",
            "I/O Stress Testing",
            &t("16:45"),
            &t("17:45"),
            &io_refs,
        )
        .map(|w| w.with_description("FIO I/O stress testing (2 cycles: 15min I/O stress + 15min pause)")),
        WindowDefinition::spanning("WL3_Reboot", "System Reboot Cycle", Pattern::Single, &t("18:35"), &t("18:40"))
            .map(|w| w.with_description("Full system reboot cycle")),
        WindowDefinition::spanning(
            "WL4_Maintenance",
            "Maintenance Operations",
            Pattern::Single,
            &t("20:30"),
            &t("20:35"),
        )
        .map(|w| w.with_description("System maintenance and updates")),
        WindowDefinition::spanning("WL5_Idle", "Idle State", Pattern::Continuous, &t("20:50"), &t("21:50"))
            .map(|w| w.with_description("System idle state baseline")),
    ];

    for def in defs.into_iter().flatten() {
        windows.push(def);
    }
    windows
}
