//! Database schema and migrations.

use rusqlite::Connection;

/// Create the results table if it does not exist yet. Safe to call repeatedly.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS test_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            test_name TEXT,
            execution_date TEXT,
            duration REAL,
            status TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_test_results_execution_date
            ON test_results(execution_date);",
    )
}
