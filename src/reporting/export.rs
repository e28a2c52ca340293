//! CSV, JSON and spreadsheet snapshots of a history view.

use super::{HistoryTable, HISTORY_COLUMNS};
use crate::storage::TIMESTAMP_FORMAT;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Worksheet name of the spreadsheet export.
pub const SHEET_NAME: &str = "Test Results";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Serialization formats offered for a history export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    /// Whether the export is text that can go straight to a terminal.
    pub fn is_text(&self) -> bool {
        !matches!(self, ExportFormat::Xlsx)
    }

    /// Download file name used by the dashboard, e.g. `tests_export.csv`.
    pub fn file_name(&self) -> String {
        format!("tests_export.{self}")
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

impl HistoryTable {
    /// Render in `format`.
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        Ok(match format {
            ExportFormat::Csv => self.to_csv().into_bytes(),
            ExportFormat::Json => self.to_json()?.into_bytes(),
            ExportFormat::Xlsx => self.to_xlsx()?,
        })
    }

    /// CSV with a header row. Fields are quoted as in RFC 4180; lines end in `\n`.
    pub fn to_csv(&self) -> String {
        let mut out = HISTORY_COLUMNS.join(",");
        out.push('\n');
        for row in &self.rows {
            let fields = [
                row.id.to_string(),
                csv_field(&row.test_name),
                row.execution_date.format(TIMESTAMP_FORMAT).to_string(),
                row.duration.map(|d| d.to_string()).unwrap_or_default(),
                row.status.to_string(),
            ];
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rows)
    }

    /// Single-sheet workbook: a bold header row, then one row per execution.
    /// Empty durations are left as blank cells.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        for (col, name) in HISTORY_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            let r = i as u32 + 1;
            sheet.write_number(r, 0, row.id as f64)?;
            sheet.write_string(r, 1, &row.test_name)?;
            sheet.write_string(r, 2, row.execution_date.format(TIMESTAMP_FORMAT).to_string())?;
            if let Some(duration) = row.duration {
                sheet.write_number(r, 3, duration)?;
            }
            sheet.write_string(r, 4, row.status.as_str())?;
        }
        sheet.set_column_width(1, 40)?;
        sheet.set_column_width(2, 20)?;

        workbook.save_to_buffer()
    }
}

/// Quote a field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{TestResult, TestStatus};
    use chrono::NaiveDate;

    fn table() -> HistoryTable {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        HistoryTable {
            rows: vec![
                TestResult {
                    id: 2,
                    test_name: "checkout, \"guest\".robot".to_string(),
                    execution_date: ts,
                    duration: Some(12.5),
                    status: TestStatus::Fail,
                },
                TestResult {
                    id: 1,
                    test_name: "login.robot".to_string(),
                    execution_date: ts,
                    duration: None,
                    status: TestStatus::Pass,
                },
            ],
        }
    }

    #[test]
    fn test_csv_export() {
        let csv = table().to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,test_name,execution_date,duration,status");
        assert_eq!(
            lines[1],
            "2,\"checkout, \"\"guest\"\".robot\",2024-03-01 14:05:00,12.5,Fail"
        );
        assert_eq!(lines[2], "1,login.robot,2024-03-01 14:05:00,,Pass");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_export_empty_table_has_header() {
        assert_eq!(
            HistoryTable::default().to_csv(),
            "id,test_name,execution_date,duration,status\n"
        );
    }

    #[test]
    fn test_json_export() {
        let json = String::from_utf8(table().export(ExportFormat::Json).unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["test_name"], "login.robot");
        assert_eq!(rows[1]["execution_date"], "2024-03-01 14:05:00");
        assert!(rows[1]["duration"].is_null());
        assert_eq!(rows[0]["status"], "Fail");
    }

    #[test]
    fn test_xlsx_export_is_a_workbook() {
        let bytes = table().export(ExportFormat::Xlsx).unwrap();
        // xlsx is a zip container.
        assert_eq!(&bytes[..2], b"PK");
        let empty = HistoryTable::default().to_xlsx().unwrap();
        assert_eq!(&empty[..2], b"PK");
    }

    #[test]
    fn test_format_names() {
        let parsed: ExportFormat = serde_json::from_str("\"csv\"").unwrap();
        assert_eq!(parsed, ExportFormat::Csv);
        assert_eq!(ExportFormat::Csv.file_name(), "tests_export.csv");
        assert_eq!(ExportFormat::Json.content_type(), "application/json");
        assert_eq!(ExportFormat::Xlsx.file_name(), "tests_export.xlsx");
        assert!(!ExportFormat::Xlsx.is_text());
        assert!(ExportFormat::Csv.is_text());
    }
}
