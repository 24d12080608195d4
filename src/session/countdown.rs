//! Cooperative countdown timer.
//!
//! No thread of its own: the host pumps `RecordingSession::tick` on its
//! control loop, and the timer reports what to display and when the next
//! tick is due. Reaching zero is signalled exactly once per arming.

use std::time::Duration;

use super::state::RecordingWindow;

/// Remaining time at or below this switches the display to warning emphasis.
pub const WARNING_THRESHOLD_MS: i64 = 11_000;

/// Tick cadence while recording.
pub const RECORDING_TICK: Duration = Duration::from_millis(1000);

/// Tick cadence during the preview auto-submit countdown.
pub const PREVIEW_TICK: Duration = Duration::from_millis(200);

/// What one tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownUpdate {
    /// `m:ss` elapsed time, or `-m:ss` remaining time under a limit.
    pub display: String,
    /// Remaining time is inside the warning threshold.
    pub warning: bool,
    /// The window closed on this tick. Signalled exactly once.
    pub reached_zero: bool,
}

/// Cooperative repeating countdown bound to the session's control thread.
#[derive(Debug)]
pub struct Countdown {
    armed: bool,
    fired_zero: bool,
    cadence: Duration,
}

impl Countdown {
    pub fn new() -> Self {
        Self {
            armed: false,
            fired_zero: false,
            cadence: RECORDING_TICK,
        }
    }

    /// Arm (or re-arm) with the given cadence. Re-arming resets the
    /// reached-zero latch.
    pub fn arm(&mut self, cadence: Duration) {
        self.armed = true;
        self.fired_zero = false;
        self.cadence = cadence;
    }

    /// Idempotent: cancelling a cancelled countdown is a no-op.
    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Compute this tick's update from the wall clock. Returns `None` while
    /// disarmed, before the window opens, or after zero already fired.
    pub fn tick(&mut self, window: &RecordingWindow, now_ms: i64) -> Option<CountdownUpdate> {
        if !self.armed {
            return None;
        }
        if !window.started() && window.end_ms() < 0 {
            return None;
        }

        match window.remaining_at(now_ms) {
            Some(remaining) if remaining <= 0 => {
                if self.fired_zero {
                    return None;
                }
                self.fired_zero = true;
                Some(CountdownUpdate {
                    display: format!("-{}", format_duration(0)),
                    warning: true,
                    reached_zero: true,
                })
            }
            Some(remaining) => Some(CountdownUpdate {
                display: format!("-{}", format_duration(remaining)),
                warning: remaining <= WARNING_THRESHOLD_MS,
                reached_zero: false,
            }),
            None => {
                let elapsed = window.elapsed_at(now_ms).unwrap_or(0);
                Some(CountdownUpdate {
                    display: format_duration(elapsed),
                    warning: false,
                    reached_zero: false,
                })
            }
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

/// `m:ss` with unpadded minutes: 0:07, 1:30, 12:05.
pub fn format_duration(ms: i64) -> String {
    let total_secs = ms.max(0) / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
