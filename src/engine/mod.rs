use crate::alert::{AlertPattern, CompletionSignal};
use crate::sync::DailyRecordSync;
use crate::Database;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
mod core;
mod db;

pub use self::core::{advance_cursor, derive_remaining_seconds, minute_value, split_hours_minutes};
pub(crate) use self::core::{local_day, now_ms};

/// Timer Engine: phase anchor + minute accountant.
///
/// The persisted anchor (`end_at_ms`) is the only source of truth for remaining
/// time. The cursor is in-memory only and is reset on every mount, stop and
/// restart, so a cold start never counts as elapsed time.
pub struct TimerEngine {
    pub(crate) cursor: Arc<Mutex<MinuteCursor>>,
    /// Local key-value storage for the anchor (survives reloads)
    pub(crate) db: Arc<Database>,
    pub(crate) sync: DailyRecordSync,
    pub(crate) alert: CompletionSignal,
    pub(crate) config: TimerConfig,
    /// Periodic poll task, present while the timer view is mounted
    pub(crate) poller: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub poll_interval: Duration,
    pub alert: AlertPattern,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            // One minute: accounting is in whole minutes, finer polling only burns wakeups
            poll_interval: Duration::from_secs(60),
            alert: AlertPattern::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseLabel {
    Work,
    Rest,
}

impl PhaseLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseLabel::Work => "WORK",
            PhaseLabel::Rest => "REST",
        }
    }

    /// WORK → REST → WORK
    pub fn next(self) -> Self {
        match self {
            PhaseLabel::Work => PhaseLabel::Rest,
            PhaseLabel::Rest => PhaseLabel::Work,
        }
    }
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WORK" => Ok(PhaseLabel::Work),
            "REST" => Ok(PhaseLabel::Rest),
            other => Err(format!("Unknown phase label: {:?}", other)),
        }
    }
}

/// Persisted phase anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub label: PhaseLabel,
    /// Epoch milliseconds at which the countdown reaches zero
    pub end_at_ms: i64,
}

/// Minute-boundary accountant FSM
///
/// Running/Completed remember the anchor they belong to: a different anchor
/// means a new countdown and is re-baselined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinuteCursor {
    /// No countdown
    Idle,
    /// Countdown present, baseline not taken yet
    Armed,
    Running { end_at_ms: i64, last_minute: u64 },
    Completed { end_at_ms: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    MinuteElapsed { label: PhaseLabel },
    TimerCompleted { label: PhaseLabel },
}

/// Receives poll results while the timer view is mounted
pub trait TimerObserver: Send + Sync {
    fn on_tick(&self, state: &TimerStateResponse);

    fn on_completed(&self, _label: PhaseLabel) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStatus {
    Idle,
    Running,
    Completed,
}

/// Snapshot for the window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStateResponse {
    pub status: TimerStatus,
    pub label: Option<PhaseLabel>,
    pub end_at_ms: Option<i64>,
    pub remaining_seconds: u64,
    pub hours: u64,
    pub minutes: u64,
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub state: TimerStateResponse,
    pub events: Vec<EngineEvent>,
}

impl Tick {
    pub fn minutes_elapsed(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, EngineEvent::MinuteElapsed { .. }))
            .count()
    }

    pub fn completed(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, EngineEvent::TimerCompleted { .. }))
    }
}
