use crate::engine::core::{derive_remaining_seconds, now_ms};
use crate::engine::{PhaseLabel, PhaseState, TimerEngine};
use tracing::{error, info, warn};

pub(crate) const PHASE_KEY: &str = "timer_phase";
pub(crate) const LAST_LABEL_KEY: &str = "timer_last_label";
pub(crate) const ALERT_ENABLED_KEY: &str = "alert_enabled";

impl TimerEngine {
    /// Persist the anchor; also remembered as the last label so stop/complete
    /// can offer the opposite phase after the anchor is gone
    pub fn set_phase(&self, phase: &PhaseState) -> Result<(), String> {
        let value = serde_json::to_string(phase)
            .map_err(|e| format!("Failed to serialize phase: {}", e))?;
        self.db
            .set_app_meta(PHASE_KEY, &value)
            .map_err(|e| format!("Failed to save phase: {}", e))?;
        if let Err(e) = self.db.set_app_meta(LAST_LABEL_KEY, phase.label.as_str()) {
            warn!("[TIMER] Failed to save last label: {}", e);
        }
        Ok(())
    }

    /// Absent, unreadable or malformed anchors all mean "no active timer"
    pub fn get_phase(&self) -> Option<PhaseState> {
        let raw = match self.db.get_app_meta(PHASE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!("[TIMER] Failed to read phase: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<PhaseState>(&raw) {
            Ok(phase) => Some(phase),
            Err(e) => {
                warn!("[TIMER] Ignoring malformed phase {:?}: {}", raw, e);
                None
            }
        }
    }

    pub fn clear_phase(&self) -> Result<(), String> {
        self.db
            .delete_app_meta(PHASE_KEY)
            .map_err(|e| format!("Failed to clear phase: {}", e))
    }

    /// Remove the anchor only if it is still `phase`; a newer anchor is left alone
    pub(crate) fn clear_phase_if(&self, phase: &PhaseState) -> Result<bool, String> {
        let value = serde_json::to_string(phase)
            .map_err(|e| format!("Failed to serialize phase: {}", e))?;
        self.db
            .delete_app_meta_if(PHASE_KEY, &value)
            .map_err(|e| format!("Failed to clear phase: {}", e))
    }

    pub fn last_label(&self) -> Option<PhaseLabel> {
        self.db
            .get_app_meta(LAST_LABEL_KEY)
            .ok()
            .flatten()
            .and_then(|raw| raw.parse().ok())
    }

    pub fn alert_enabled(&self) -> bool {
        self.alert.is_enabled()
    }

    pub fn set_alert_enabled(&self, enabled: bool) -> Result<(), String> {
        self.db
            .set_app_meta(ALERT_ENABLED_KEY, if enabled { "1" } else { "0" })
            .map_err(|e| format!("Failed to save alert setting: {}", e))?;
        self.alert.set_enabled(enabled);
        if !enabled {
            self.alert.cancel();
        }
        Ok(())
    }

    /// Reload settings and report the anchor found on startup.
    /// GUARD: never fails; anything unreadable falls back to defaults.
    pub(crate) fn restore_state(&self) {
        match self.db.get_app_meta(ALERT_ENABLED_KEY) {
            Ok(Some(value)) => self.alert.set_enabled(value != "0"),
            Ok(None) => {}
            Err(e) => warn!("[RECOVERY] Failed to read alert setting: {}. Using default.", e),
        }

        match self.get_phase() {
            Some(phase) => info!(
                "[RECOVERY] Found {} countdown, {}s remaining",
                phase.label,
                derive_remaining_seconds(phase.end_at_ms, now_ms())
            ),
            None => info!("[RECOVERY] No active countdown"),
        }
    }
}
