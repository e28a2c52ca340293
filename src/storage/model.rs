//! Row types read from and written to `test_results`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Outcome of one test file execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    /// Exit code 0 passes, everything else (including no code at all) fails.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => TestStatus::Pass,
            _ => TestStatus::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "Pass",
            TestStatus::Fail => "Fail",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown test status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pass" => Ok(TestStatus::Pass),
            "Fail" => Ok(TestStatus::Fail),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One persisted execution. Field order matches the table's column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub id: i64,
    pub test_name: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub execution_date: NaiveDateTime,
    pub duration: Option<f64>,
    pub status: TestStatus,
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(super::TIMESTAMP_FORMAT))
}

/// Summary statistics over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub window_days: u32,
    pub total: u64,
    pub passed: u64,
    /// Percentage of passing rows, 0.0 when the window is empty.
    pub success_rate: f64,
    /// Mean of the non-null durations, 0.0 when there are none.
    pub average_duration: f64,
}

/// Pass/fail counts for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub passed: u64,
    pub failed: u64,
}
