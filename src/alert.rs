//! Completion signal: a short, self-terminating tone pattern.

use scopeguard::guard;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u64,
}

/// Alternating pitches at a fixed cadence, `repeats` rounds of `pitches_hz`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPattern {
    pub pitches_hz: Vec<u32>,
    pub tone_ms: u64,
    pub cadence_ms: u64,
    pub repeats: u32,
}

impl Default for AlertPattern {
    fn default() -> Self {
        Self {
            pitches_hz: vec![880, 660],
            tone_ms: 300,
            cadence_ms: 500,
            repeats: 6,
        }
    }
}

impl AlertPattern {
    pub fn tones(&self) -> Vec<Tone> {
        (0..self.repeats)
            .flat_map(|_| self.pitches_hz.iter())
            .map(|&frequency_hz| Tone {
                frequency_hz,
                duration_ms: self.tone_ms,
            })
            .collect()
    }

    /// From the first tone starting to the last one ending
    pub fn total_duration(&self) -> Duration {
        let count = self.tones().len() as u64;
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis((count - 1) * self.cadence_ms + self.tone_ms)
    }
}

/// Where tones end up (the window's audio, a test recorder)
pub trait ToneSink: Send + Sync {
    fn play(&self, tone: Tone);
    fn silence(&self);
}

pub struct CompletionSignal {
    pattern: AlertPattern,
    sink: Arc<dyn ToneSink>,
    handle: Mutex<Option<JoinHandle<()>>>,
    playing: Arc<AtomicBool>,
    enabled: AtomicBool,
}

impl CompletionSignal {
    pub fn new(pattern: AlertPattern, sink: Arc<dyn ToneSink>) -> Self {
        Self {
            pattern,
            sink,
            handle: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Start the pattern. Single-flight: returns false if already playing,
    /// disabled, or there is no runtime to play on.
    pub fn trigger(&self) -> bool {
        if !self.is_enabled() {
            debug!("[ALERT] Disabled, not playing");
            return false;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("[ALERT] No async runtime, alert skipped: {}", e);
                return false;
            }
        };
        if self
            .playing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("[ALERT] Already playing");
            return false;
        }

        let tones = self.pattern.tones();
        let cadence = Duration::from_millis(self.pattern.cadence_ms);
        let tail = Duration::from_millis(self.pattern.tone_ms);
        let sink = self.sink.clone();
        let playing = self.playing.clone();

        let task = runtime.spawn(async move {
            // Cleared on normal end and on abort alike
            let _playing = guard(playing, |flag| flag.store(false, Ordering::Release));
            for (i, tone) in tones.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(cadence).await;
                }
                sink.play(tone);
            }
            tokio::time::sleep(tail).await;
            sink.silence();
            debug!("[ALERT] Pattern finished");
        });

        match self.handle.lock() {
            Ok(mut handle) => {
                if let Some(stale) = handle.replace(task) {
                    stale.abort();
                }
            }
            Err(e) => warn!("[ALERT] Mutex poisoned, alert cannot be cancelled early: {}", e),
        }
        info!(
            "[ALERT] Playing completion alert ({:?})",
            self.pattern.total_duration()
        );
        true
    }

    /// Abort playback and silence the sink. Safe to call at any time.
    pub fn cancel(&self) {
        let task = match self.handle.lock() {
            Ok(mut handle) => handle.take(),
            Err(e) => {
                warn!("[ALERT] Mutex poisoned while cancelling: {}", e);
                None
            }
        };
        if let Some(task) = task {
            let was_running = !task.is_finished();
            task.abort();
            if was_running {
                self.sink.silence();
                debug!("[ALERT] Cancelled");
            }
        }
        self.playing.store(false, Ordering::Release);
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(task) = handle.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern_is_bounded_and_alternating() {
        let pattern = AlertPattern::default();
        let tones = pattern.tones();

        assert_eq!(tones.len(), 12);
        assert!(tones
            .windows(2)
            .all(|pair| pair[0].frequency_hz != pair[1].frequency_hz));
        assert_eq!(pattern.total_duration(), Duration::from_millis(11 * 500 + 300));
    }

    #[test]
    fn test_empty_pattern_has_no_duration() {
        let pattern = AlertPattern {
            repeats: 0,
            ..Default::default()
        };
        assert!(pattern.tones().is_empty());
        assert_eq!(pattern.total_duration(), Duration::ZERO);
    }
}
