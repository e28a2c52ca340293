//! Reporting Queries -- stateless read-side views over the Result Store.
//!
//! Nothing here is cached: every call goes back to the database.

pub mod export;
pub mod summary;

use crate::storage::{DailyTrend, Kpis, ResultStore, StoreError, TestResult};
use serde::Serialize;

/// Columns of a history listing, in table order.
pub const HISTORY_COLUMNS: [&str; 5] = ["id", "test_name", "execution_date", "duration", "status"];

/// Upper bound on histogram buckets; larger requests are clamped.
pub const MAX_HISTOGRAM_BINS: usize = 1000;

/// Read-side facade used by the CLI and the HTTP API.
#[derive(Clone)]
pub struct Reporter {
    store: ResultStore,
}

impl Reporter {
    pub fn new(store: ResultStore) -> Self {
        Self { store }
    }

    /// KPI summary over the trailing `window_days`.
    pub fn summary(&self, window_days: u32) -> Result<Kpis, StoreError> {
        self.store.query_kpis(window_days)
    }

    /// Most recent executions, optionally narrowed by `search`.
    pub fn history(&self, limit: u32, search: Option<&str>) -> Result<HistoryTable, StoreError> {
        Ok(HistoryTable {
            rows: self.store.query_recent(limit, search)?,
        })
    }

    /// Daily pass/fail counts.
    pub fn trend(&self) -> Result<Vec<DailyTrend>, StoreError> {
        self.store.query_daily_trend()
    }
}

/// A history view: rows in the same column order as the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HistoryTable {
    pub rows: Vec<TestResult>,
}

impl HistoryTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Equal-width histogram of the non-null durations in this view.
    pub fn duration_histogram(&self, bins: usize) -> Vec<HistogramBin> {
        duration_histogram(self.rows.iter().filter_map(|r| r.duration), bins)
    }
}

/// One bucket of a duration histogram: `[lower, upper)`, the last bucket closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Bucket `values` into `bins` equal-width bins spanning their min..max.
/// `bins` is clamped to [`MAX_HISTOGRAM_BINS`].
///
/// Returns no bins for no values. When every value is equal the range is
/// widened to one unit so the single populated bin has a width.
pub fn duration_histogram<I>(values: I, bins: usize) -> Vec<HistogramBin>
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let bins = bins.min(MAX_HISTOGRAM_BINS);

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        max = min + 1.0;
    }
    let width = (max - min) / bins as f64;

    let mut histogram: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();

    for v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        histogram[idx].count += 1;
    }
    histogram
}
