use crate::engine::PhaseLabel;
use crate::records::{display_date, DailyRecord};
use crate::sync::SyncStats;
use chrono::NaiveDate;
use serde::Serialize;

/// End-of-session summary. Falls back to zero values when the day has no record yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub label: PhaseLabel,
    pub time: String,
    pub tasks: String,
}

impl DaySummary {
    pub const EMPTY_TIME: &'static str = "0:00";
    pub const EMPTY_TASKS: &'static str = "0/0";

    pub fn from_parts(label: PhaseLabel, time: Option<String>, tasks: Option<String>) -> Self {
        Self {
            label,
            time: time.unwrap_or_else(|| Self::EMPTY_TIME.to_string()),
            tasks: tasks.unwrap_or_else(|| Self::EMPTY_TASKS.to_string()),
        }
    }
}

/// One row of the statistics view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub date: String,
    pub work: String,
    pub relax: String,
    pub tasks: String,
}

impl HistoryEntry {
    pub fn new(day: NaiveDate, record: &DailyRecord) -> Self {
        let report = record.to_report();
        Self {
            date: display_date(day),
            work: report.work,
            relax: report.relax,
            tasks: report.tasks,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusResponse {
    pub stats: SyncStats,
    /// Ops submitted but not yet attempted
    pub pending: u64,
}

impl From<SyncStats> for SyncStatusResponse {
    fn from(stats: SyncStats) -> Self {
        Self {
            pending: stats
                .submitted
                .saturating_sub(stats.applied + stats.failed),
            stats,
        }
    }
}
