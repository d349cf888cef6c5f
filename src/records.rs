//! Daily Record Store contract.
//!
//! The engine only talks to the store through [`DailyRecordStore`]; the SQLite
//! implementation lives in `database.rs`. Every day-keyed operation takes an
//! explicit local date, the `today` helpers fill it in.

use crate::engine::PhaseLabel;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Date format used for keys handed to the window (`19.10.2026`)
pub const DISPLAY_DATE_FORMAT: &str = "%d.%m.%Y";
/// Date format of the `day` column
pub const STORAGE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("No record for {0}")]
    MissingDay(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Aggregates for one calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyRecord {
    pub work_minutes: u32,
    pub rest_minutes: u32,
    pub tasks_completed: u32,
    pub tasks_total: u32,
}

impl DailyRecord {
    pub fn minutes_for(&self, label: PhaseLabel) -> u32 {
        match label {
            PhaseLabel::Work => self.work_minutes,
            PhaseLabel::Rest => self.rest_minutes,
        }
    }

    pub fn tasks_display(&self) -> String {
        format!("{}/{}", self.tasks_completed, self.tasks_total)
    }

    pub fn to_report(&self) -> DayReport {
        DayReport {
            work: format_minutes(self.work_minutes),
            relax: format_minutes(self.rest_minutes),
            tasks: self.tasks_display(),
        }
    }
}

/// Reporting shape of one day: `{ "work": "1:05", "relax": "0:20", "tasks": "2/3" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayReport {
    pub work: String,
    pub relax: String,
    pub tasks: String,
}

/// `H:MM`, hours are not capped
pub fn format_minutes(total_minutes: u32) -> String {
    format!("{}:{:02}", total_minutes / 60, total_minutes % 60)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn display_date(day: NaiveDate) -> String {
    day.format(DISPLAY_DATE_FORMAT).to_string()
}

pub fn storage_date(day: NaiveDate) -> String {
    day.format(STORAGE_DATE_FORMAT).to_string()
}

pub trait DailyRecordStore: Send + Sync {
    /// Idempotent initialization of the backing store
    fn ensure_record_file(&self) -> StoreResult<()>;

    /// Creates the record if absent. Returns whether it already existed.
    fn ensure_day_exists(&self, day: NaiveDate) -> StoreResult<bool>;

    /// Creates a zeroed record for `day`; an existing record is left alone
    fn add_day(&self, day: NaiveDate) -> StoreResult<()>;

    /// Adds one minute to the accumulator of `label`
    fn increment_time(&self, day: NaiveDate, label: PhaseLabel) -> StoreResult<()>;

    /// Overwrites the task aggregate
    fn set_task_counts(&self, day: NaiveDate, completed: u32, total: u32) -> StoreResult<()>;

    fn get_record(&self, day: NaiveDate) -> StoreResult<Option<DailyRecord>>;

    fn get_all_records(&self) -> StoreResult<BTreeMap<NaiveDate, DailyRecord>>;

    fn ensure_today_exists(&self) -> StoreResult<bool> {
        self.ensure_day_exists(today())
    }

    fn add_today(&self) -> StoreResult<()> {
        self.add_day(today())
    }

    fn increment_today_time(&self, label: PhaseLabel) -> StoreResult<()> {
        self.increment_time(today(), label)
    }

    fn set_today_task_counts(&self, completed: u32, total: u32) -> StoreResult<()> {
        self.set_task_counts(today(), completed, total)
    }

    /// Accumulated minutes for `label` on `day`, as `H:MM`
    fn get_time_on(&self, day: NaiveDate, label: PhaseLabel) -> StoreResult<String> {
        let record = self
            .get_record(day)?
            .ok_or_else(|| StoreError::MissingDay(display_date(day)))?;
        Ok(format_minutes(record.minutes_for(label)))
    }

    fn get_today_time(&self, label: PhaseLabel) -> StoreResult<String> {
        self.get_time_on(today(), label)
    }

    /// Task aggregate on `day`, as `completed/total`
    fn get_task_counts_on(&self, day: NaiveDate) -> StoreResult<String> {
        let record = self
            .get_record(day)?
            .ok_or_else(|| StoreError::MissingDay(display_date(day)))?;
        Ok(record.tasks_display())
    }

    fn get_today_tasks(&self) -> StoreResult<String> {
        self.get_task_counts_on(today())
    }

    /// Full history keyed by `DD.MM.YYYY`
    fn get_all_reports(&self) -> StoreResult<BTreeMap<String, DayReport>> {
        Ok(self
            .get_all_records()?
            .into_iter()
            .map(|(day, record)| (display_date(day), record.to_report()))
            .collect())
    }

    /// Every record, newest day first
    fn history(&self) -> StoreResult<Vec<(NaiveDate, DailyRecord)>> {
        Ok(self.get_all_records()?.into_iter().rev().collect())
    }
}
