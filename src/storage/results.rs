//! Persistence and read-side queries for `test_results`.

use super::{open_pool, schema, DailyTrend, Kpis, Pool, StoreError, TestResult, TestStatus};
use super::{DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::config::StorageConfig;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::types::Type;
use rusqlite::{params, Row};

/// Result Store: one row per test file execution.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct ResultStore {
    pool: Pool,
}

impl ResultStore {
    /// Open the database described by `config` and ensure the table exists.
    pub fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        let store = Self::from_pool(open_pool(config)?);
        store.initialize()?;
        Ok(store)
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the table if needed. Repeated calls are no-ops.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        schema::migrate(&conn)?;
        Ok(())
    }

    /// Append a result stamped with the current local time.
    pub fn insert(
        &self,
        test_name: &str,
        duration: f64,
        status: TestStatus,
    ) -> Result<TestResult, StoreError> {
        self.insert_at(test_name, duration, status, now_local())
    }

    /// Append a result with an explicit execution timestamp.
    pub fn insert_at(
        &self,
        test_name: &str,
        duration: f64,
        status: TestStatus,
        executed_at: NaiveDateTime,
    ) -> Result<TestResult, StoreError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(StoreError::InvalidDuration(duration));
        }
        let executed_at = executed_at.with_nanosecond(0).unwrap_or(executed_at);

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO test_results (test_name, execution_date, duration, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                test_name,
                executed_at.format(TIMESTAMP_FORMAT).to_string(),
                duration,
                status.as_str(),
            ],
        )?;

        let row = TestResult {
            id: conn.last_insert_rowid(),
            test_name: test_name.to_string(),
            execution_date: executed_at,
            duration: Some(duration),
            status,
        };
        tracing::debug!(id = row.id, test = %row.test_name, status = %row.status, "saved test result");
        Ok(row)
    }

    /// Most recent rows first, optionally narrowed to rows whose name or status
    /// contains `search` verbatim (case-sensitive, no wildcards).
    pub fn query_recent(
        &self,
        limit: u32,
        search: Option<&str>,
    ) -> Result<Vec<TestResult>, StoreError> {
        let search = search.filter(|s| !s.is_empty());

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, test_name, execution_date, duration, status
             FROM test_results
             WHERE ?1 IS NULL
                OR instr(test_name, ?1) > 0
                OR instr(status, ?1) > 0
             ORDER BY datetime(execution_date) DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![search, i64::from(limit)], result_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Totals over rows executed within the last `window_days` days.
    pub fn query_kpis(&self, window_days: u32) -> Result<Kpis, StoreError> {
        let since = days_ago(window_days);

        let conn = self.pool.get()?;
        let (total, passed, average) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'Pass' THEN 1 ELSE 0 END), 0),
                    AVG(duration)
             FROM test_results
             WHERE ?1 IS NULL OR execution_date >= ?1",
            params![since],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            },
        )?;

        let total = total.max(0) as u64;
        let passed = passed.max(0) as u64;
        let success_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };

        Ok(Kpis {
            window_days,
            total,
            passed,
            success_rate,
            average_duration: average.unwrap_or(0.0),
        })
    }

    /// Pass and fail counts per calendar day, oldest day first.
    pub fn query_daily_trend(&self) -> Result<Vec<DailyTrend>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT DATE(execution_date) AS day,
                    SUM(CASE WHEN status = 'Pass' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'Fail' THEN 1 ELSE 0 END)
             FROM test_results
             WHERE DATE(execution_date) IS NOT NULL
             GROUP BY day
             ORDER BY day",
        )?;

        let trend = stmt
            .query_map([], |row| {
                let day: String = row.get(0)?;
                let date = NaiveDate::parse_from_str(&day, DATE_FORMAT)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
                Ok(DailyTrend {
                    date,
                    passed: row.get::<_, i64>(1)?.max(0) as u64,
                    failed: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trend)
    }

    /// Retention sweep: drop rows executed strictly before `now - days`.
    /// Returns how many rows were removed.
    pub fn delete_older_than(&self, days: u32) -> Result<usize, StoreError> {
        let threshold = days_ago(days);

        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM test_results WHERE execution_date < ?1",
            params![threshold],
        )?;

        tracing::info!(days, removed, threshold = ?threshold, "retention sweep complete");
        Ok(removed)
    }
}

fn now_local() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `None` when the cutoff falls before the earliest representable date.
///
/// Bound as a parameter, `NULL` makes `>= ?1` match nothing and `< ?1` delete
/// nothing, so callers that want "everything" check for it explicitly.
fn days_ago(days: u32) -> Option<String> {
    now_local()
        .checked_sub_signed(Duration::days(i64::from(days)))
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TestResult> {
    let execution_date: String = row.get(2)?;
    let execution_date = NaiveDateTime::parse_from_str(&execution_date, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let status: String = row.get(4)?;
    let status = status
        .parse::<TestStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(TestResult {
        id: row.get(0)?,
        test_name: row.get(1)?,
        execution_date,
        duration: row.get(3)?,
        status,
    })
}
