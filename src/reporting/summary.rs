//! Human-readable formatting of KPIs, history rows and the daily trend.

use super::{HistogramBin, HistoryTable};
use crate::storage::{DailyTrend, Kpis, TIMESTAMP_FORMAT};

/// One-line KPI summary, e.g. `last 7 days: 12 tests, 83.3% passed, avg duration 41.50`.
pub fn format_kpis(kpis: &Kpis) -> String {
    if kpis.total == 0 {
        return format!(
            "last {} day{}: no test executions",
            kpis.window_days,
            plural(kpis.window_days as u64)
        );
    }
    format!(
        "last {} day{}: {} test{}, {:.1}% passed, avg duration {:.2}",
        kpis.window_days,
        plural(kpis.window_days as u64),
        kpis.total,
        plural(kpis.total),
        kpis.success_rate,
        kpis.average_duration,
    )
}

/// Fixed-width table of history rows, newest first as given.
pub fn format_history(table: &HistoryTable) -> String {
    if table.is_empty() {
        return "No test results found.\n".to_string();
    }

    let mut out = format!(
        "{:>6} | {:<32} | {:<19} | {:>10} | Status\n",
        "ID", "Test", "Executed", "Duration"
    );
    out.push_str(&format!("{:-<6}-|-{:-<32}-|-{:-<19}-|-{:-<10}-|-{:-<6}\n", "", "", "", "", ""));
    for row in &table.rows {
        let duration = row
            .duration
            .map(|d| format!("{d:.2}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:>6} | {:<32} | {:<19} | {:>10} | {}\n",
            row.id,
            row.test_name,
            row.execution_date.format(TIMESTAMP_FORMAT),
            duration,
            row.status,
        ));
    }
    out
}

/// Per-day pass/fail lines in date order.
pub fn format_trend(trend: &[DailyTrend]) -> String {
    if trend.is_empty() {
        return "No test results found.\n".to_string();
    }

    let mut out = format!("{:<10} | {:>6} | {:>6}\n", "Date", "Pass", "Fail");
    out.push_str(&format!("{:-<10}-|-{:-<6}-|-{:-<6}\n", "", "", ""));
    for day in trend {
        out.push_str(&format!("{:<10} | {:>6} | {:>6}\n", day.date, day.passed, day.failed));
    }
    out
}

/// Text histogram with one `#` per execution, scaled down past `width` marks.
pub fn format_histogram(bins: &[HistogramBin], width: usize) -> String {
    let peak = bins.iter().map(|b| b.count).max().unwrap_or(0);
    bins.iter()
        .map(|bin| {
            let marks = if peak as usize <= width {
                bin.count as usize
            } else {
                ((bin.count as f64 / peak as f64) * width as f64).round() as usize
            };
            format!(
                "{:>10.2} - {:<10.2} | {:>5} {}\n",
                bin.lower,
                bin.upper,
                bin.count,
                "#".repeat(marks)
            )
        })
        .collect()
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
