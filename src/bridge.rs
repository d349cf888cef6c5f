//! Window side of the engine: poll results, completion and alert tones go out as Tauri events.

use crate::alert::{Tone, ToneSink};
use crate::engine::{PhaseLabel, TimerObserver, TimerStateResponse};
use crate::ipc::events;
use tauri::{AppHandle, Emitter};
use tauri_plugin_notification::NotificationExt;
use tracing::warn;

pub struct WindowBridge {
    app: AppHandle,
}

impl WindowBridge {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl TimerObserver for WindowBridge {
    fn on_tick(&self, state: &TimerStateResponse) {
        if let Err(e) = self.app.emit(events::TIMER_STATE_UPDATE, state) {
            warn!("[TIMER] Failed to emit state update: {}", e);
        }
    }

    fn on_completed(&self, label: PhaseLabel) {
        if let Err(e) = self.app.emit(events::TIMER_COMPLETED, label) {
            warn!("[TIMER] Failed to emit completion: {}", e);
        }
        let body = match label {
            PhaseLabel::Work => "Work session is over. Time for a break.",
            PhaseLabel::Rest => "Break is over. Back to work.",
        };
        // Window may be hidden; the notification is best effort
        if let Err(e) = self
            .app
            .notification()
            .builder()
            .title("Time is up")
            .body(body)
            .show()
        {
            warn!("[ALERT] Failed to show notification: {:?}", e);
        }
    }
}

impl ToneSink for WindowBridge {
    fn play(&self, tone: Tone) {
        if let Err(e) = self.app.emit(events::ALERT_TONE, tone) {
            warn!("[ALERT] Failed to emit tone: {}", e);
        }
    }

    fn silence(&self) {
        let _ = self.app.emit(events::ALERT_SILENCE, ());
    }
}
