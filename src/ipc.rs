//! Centralized IPC event names.
//! Shared by the emitting side in Rust and the window script.

/// Tauri event names (Rust emit ↔ Frontend listen)
pub mod events {
    pub const TIMER_STATE_UPDATE: &str = "timer-state-update";
    pub const TIMER_COMPLETED: &str = "timer-completed";
    /// Payload: `Tone`; the window plays it with its audio context
    pub const ALERT_TONE: &str = "alert-tone";
    pub const ALERT_SILENCE: &str = "alert-silence";
    pub const DB_RECOVERED: &str = "db-recovered-from-corruption";
}
