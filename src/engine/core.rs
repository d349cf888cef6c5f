use crate::alert::{CompletionSignal, ToneSink};
use crate::engine::{
    EngineEvent, MinuteCursor, PhaseLabel, PhaseState, Tick, TimerConfig, TimerEngine,
    TimerObserver, TimerStateResponse, TimerStatus,
};
use crate::records::today;
use crate::sync::{DailyRecordSync, SyncOp};
use crate::Database;
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Remaining whole seconds: `max(0, floor((end_at - now) / 1000))`.
/// Pure: never depends on a previously derived value, so a reload needs no resume logic.
pub fn derive_remaining_seconds(end_at_ms: i64, now_ms: i64) -> u64 {
    let diff_ms = end_at_ms.saturating_sub(now_ms);
    if diff_ms <= 0 {
        0
    } else {
        (diff_ms / 1000) as u64
    }
}

/// Display split, truncating
pub fn split_hours_minutes(remaining_seconds: u64) -> (u64, u64) {
    (remaining_seconds / 3600, (remaining_seconds % 3600) / 60)
}

/// Started minutes left (1500s → 25, 1499s → 25, 1440s → 24, 0s → 0).
/// Each value lasts exactly sixty seconds aligned to the anchor.
pub fn minute_value(remaining_seconds: u64) -> u64 {
    remaining_seconds.div_ceil(60)
}

fn elapsed_events(label: PhaseLabel, minutes: u64) -> Vec<EngineEvent> {
    (0..minutes)
        .map(|_| EngineEvent::MinuteElapsed { label })
        .collect()
}

/// Accountant transition for one poll. Pure; the engine applies the events.
///
/// - first observation of an anchor takes the baseline and emits nothing
///   (or `TimerCompleted` right away if the anchor is already expired)
/// - every minute value crossed afterwards emits one `MinuteElapsed`
/// - reaching zero emits `TimerCompleted` once; the final crossing is not a `MinuteElapsed`
pub fn advance_cursor(
    cursor: MinuteCursor,
    phase: Option<&PhaseState>,
    now_ms: i64,
) -> (MinuteCursor, Vec<EngineEvent>) {
    let Some(phase) = phase else {
        // Completion clears the anchor; Completed holds until stop/detach
        return match cursor {
            MinuteCursor::Completed { .. } => (cursor, Vec::new()),
            _ => (MinuteCursor::Idle, Vec::new()),
        };
    };

    let label = phase.label;
    let remaining = derive_remaining_seconds(phase.end_at_ms, now_ms);
    let minute = minute_value(remaining);

    match cursor {
        MinuteCursor::Completed { end_at_ms } if end_at_ms == phase.end_at_ms => {
            (cursor, Vec::new())
        }
        MinuteCursor::Running {
            end_at_ms,
            last_minute,
        } if end_at_ms == phase.end_at_ms => {
            if remaining == 0 {
                let mut events = elapsed_events(label, last_minute.saturating_sub(1));
                events.push(EngineEvent::TimerCompleted { label });
                (MinuteCursor::Completed { end_at_ms }, events)
            } else if minute < last_minute {
                (
                    MinuteCursor::Running {
                        end_at_ms,
                        last_minute: minute,
                    },
                    elapsed_events(label, last_minute - minute),
                )
            } else {
                // Same minute, or the wall clock went backwards: move the baseline only
                (
                    MinuteCursor::Running {
                        end_at_ms,
                        last_minute: minute,
                    },
                    Vec::new(),
                )
            }
        }
        // Idle, Armed, or a cursor left over from another anchor
        _ => {
            if remaining == 0 {
                (
                    MinuteCursor::Completed {
                        end_at_ms: phase.end_at_ms,
                    },
                    vec![EngineEvent::TimerCompleted { label }],
                )
            } else {
                (
                    MinuteCursor::Running {
                        end_at_ms: phase.end_at_ms,
                        last_minute: minute,
                    },
                    Vec::new(),
                )
            }
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Local calendar day of an epoch-ms instant
pub(crate) fn local_day(now_ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(now_ms)
        .map(|dt| dt.with_timezone(&Local).date_naive())
        .unwrap_or_else(today)
}

impl TimerEngine {
    pub fn with_db(
        db: Arc<Database>,
        sync: DailyRecordSync,
        sink: Arc<dyn ToneSink>,
        config: TimerConfig,
    ) -> Self {
        let engine = Self {
            cursor: Arc::new(Mutex::new(MinuteCursor::Idle)),
            db,
            sync,
            alert: CompletionSignal::new(config.alert.clone(), sink),
            config,
            poller: Mutex::new(None),
        };
        engine.restore_state();
        engine
    }

    fn lock_cursor(&self) -> Result<MutexGuard<'_, MinuteCursor>, String> {
        self.cursor
            .lock()
            .map_err(|e| format!("Mutex poisoned: {}", e))
    }

    /// Start a countdown of `hours:minutes` from now
    pub fn start_phase(
        &self,
        label: PhaseLabel,
        hours: u32,
        minutes: u32,
    ) -> Result<TimerStateResponse, String> {
        let duration_seconds = i64::from(hours) * 3600 + i64::from(minutes) * 60;
        self.start_phase_at(label, duration_seconds, now_ms())
    }

    /// Zero or negative durations are accepted and complete on the next poll
    pub fn start_phase_at(
        &self,
        label: PhaseLabel,
        duration_seconds: i64,
        now_ms: i64,
    ) -> Result<TimerStateResponse, String> {
        self.alert.cancel();

        let phase = PhaseState {
            label,
            end_at_ms: now_ms.saturating_add(duration_seconds.saturating_mul(1000)),
        };
        {
            let mut cursor = self.lock_cursor()?;
            self.set_phase(&phase)?;
            *cursor = MinuteCursor::Armed;
        }

        self.sync.submit(SyncOp::EnsureDay {
            day: local_day(now_ms),
        });

        info!(
            "[TIMER] Started {} for {}s (end_at={})",
            label, duration_seconds, phase.end_at_ms
        );
        Ok(self.snapshot(Some(phase), MinuteCursor::Armed, now_ms))
    }

    pub fn poll(&self) -> Result<Tick, String> {
        self.poll_at(now_ms())
    }

    /// One tick. Phase is read before derivation, the transition is decided
    /// before any store call is submitted. The cursor lock is held throughout
    /// so start/stop cannot interleave with a tick.
    pub fn poll_at(&self, now_ms: i64) -> Result<Tick, String> {
        let mut cursor = self.lock_cursor()?;
        let phase = self.get_phase();

        let (next, events) = advance_cursor(*cursor, phase.as_ref(), now_ms);
        if let (
            MinuteCursor::Running { last_minute: before, end_at_ms: a },
            MinuteCursor::Running { last_minute: after, end_at_ms: b },
        ) = (*cursor, next)
        {
            if a == b && after > before {
                warn!(
                    "[TIMER] Remaining time went up ({} → {} min), clock moved backwards; rebaselined",
                    before, after
                );
            }
        }
        *cursor = next;

        for event in &events {
            self.dispatch(*event, phase.as_ref(), now_ms);
        }
        drop(cursor);

        Ok(Tick {
            state: self.snapshot(phase, next, now_ms),
            events,
        })
    }

    fn dispatch(&self, event: EngineEvent, phase: Option<&PhaseState>, now_ms: i64) {
        match event {
            EngineEvent::MinuteElapsed { label } => {
                debug!("[TIMER] +1 minute to {}", label);
                self.sync.submit(SyncOp::IncrementTime {
                    day: local_day(now_ms),
                    label,
                });
            }
            EngineEvent::TimerCompleted { label } => {
                info!("[TIMER] {} countdown completed", label);
                // Anchor goes away so a reload does not replay the alert
                if let Some(phase) = phase {
                    match self.clear_phase_if(phase) {
                        Ok(true) => {}
                        Ok(false) => debug!("[TIMER] Anchor already replaced, left in place"),
                        Err(e) => error!("[TIMER] Failed to clear phase after completion: {}", e),
                    }
                }
                self.alert.trigger();
            }
        }
    }

    /// Current snapshot without advancing the accountant
    pub fn get_state(&self) -> Result<TimerStateResponse, String> {
        let phase = self.get_phase();
        let cursor = *self.lock_cursor()?;
        Ok(self.snapshot(phase, cursor, now_ms()))
    }

    fn snapshot(
        &self,
        phase: Option<PhaseState>,
        cursor: MinuteCursor,
        now_ms: i64,
    ) -> TimerStateResponse {
        match (phase, cursor) {
            (_, MinuteCursor::Completed { end_at_ms }) => TimerStateResponse {
                status: TimerStatus::Completed,
                label: phase.map(|p| p.label).or_else(|| self.last_label()),
                end_at_ms: Some(end_at_ms),
                remaining_seconds: 0,
                hours: 0,
                minutes: 0,
            },
            (Some(phase), _) => {
                let remaining = derive_remaining_seconds(phase.end_at_ms, now_ms);
                let (hours, minutes) = split_hours_minutes(remaining);
                TimerStateResponse {
                    status: TimerStatus::Running,
                    label: Some(phase.label),
                    end_at_ms: Some(phase.end_at_ms),
                    remaining_seconds: remaining,
                    hours,
                    minutes,
                }
            }
            (None, _) => TimerStateResponse {
                status: TimerStatus::Idle,
                label: self.last_label(),
                end_at_ms: None,
                remaining_seconds: 0,
                hours: 0,
                minutes: 0,
            },
        }
    }

    /// Mount: reset the cursor and start polling (first tick right away).
    /// Replaces a poll task left from an earlier mount.
    pub fn attach(self: &Arc<Self>, observer: Arc<dyn TimerObserver>) -> Result<(), String> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("No async runtime for poll task: {}", e))?;

        let mut poller = self
            .poller
            .lock()
            .map_err(|e| format!("Mutex poisoned: {}", e))?;
        if let Some(previous) = poller.take() {
            previous.abort();
        }

        *self.lock_cursor()? = if self.get_phase().is_some() {
            MinuteCursor::Armed
        } else {
            MinuteCursor::Idle
        };

        let engine = Arc::downgrade(self);
        let period = self.config.poll_interval;
        *poller = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                match engine.poll() {
                    Ok(tick) => {
                        observer.on_tick(&tick.state);
                        for event in &tick.events {
                            if let EngineEvent::TimerCompleted { label } = event {
                                observer.on_completed(*label);
                            }
                        }
                    }
                    Err(e) => warn!("[TIMER] Poll failed: {}", e),
                }
            }
        }));

        info!("[TIMER] Poll task attached (every {:?})", period);
        Ok(())
    }

    /// Unmount / navigate away: no background work survives this call
    pub fn detach(&self) {
        self.cancel_poller();
        match self.cursor.lock() {
            Ok(mut cursor) => *cursor = MinuteCursor::Idle,
            Err(e) => error!("[TIMER] Mutex poisoned while resetting cursor: {}", e),
        }
        self.alert.cancel();
    }

    fn cancel_poller(&self) {
        match self.poller.lock() {
            Ok(mut poller) => {
                if let Some(handle) = poller.take() {
                    handle.abort();
                    debug!("[TIMER] Poll task cancelled");
                }
            }
            Err(e) => error!("[TIMER] Mutex poisoned while cancelling poll task: {}", e),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .map(|p| p.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Stop action: tear down, drop the anchor, hand back the label to offer next
    pub fn stop(&self) -> Result<PhaseLabel, String> {
        self.cancel_poller();
        let current = {
            let mut cursor = self.lock_cursor()?;
            let current = self
                .get_phase()
                .map(|p| p.label)
                .or_else(|| self.last_label());
            *cursor = MinuteCursor::Idle;
            self.clear_phase()?;
            current
        };
        self.alert.cancel();

        let next = current.map(PhaseLabel::next).unwrap_or(PhaseLabel::Work);
        info!(
            "[TIMER] Stopped {}; next phase {}",
            current.map(|l| l.as_str()).unwrap_or("-"),
            next
        );
        Ok(next)
    }

    /// Silence a ringing alert (any navigation action)
    pub fn dismiss_alert(&self) {
        self.alert.cancel();
    }

    pub fn is_alerting(&self) -> bool {
        self.alert.is_playing()
    }

    pub fn cursor(&self) -> Result<MinuteCursor, String> {
        Ok(*self.lock_cursor()?)
    }
}
