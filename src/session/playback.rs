//! Playback callback contract.
//!
//! The clip preview player itself is host UI; only its notification surface
//! is part of the core so the session's preview countdown and retry flow can
//! react to playback progress.

/// Notifications a host playback view delivers while previewing a clip.
pub trait PlaybackObserver {
    /// The clip is ready; `duration_ms` is its total length.
    fn on_prepared(&mut self, duration_ms: i64);

    /// Playback ran to the end of the clip.
    fn on_completed(&mut self);

    /// Preparation or playback failed.
    fn on_error(&mut self, kind: PlaybackErrorKind, message: &str);

    /// Buffering progressed to the given percentage.
    fn on_buffered(&mut self, percent: u8);
}

/// Why playback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackErrorKind {
    Io,
    Malformed,
    Unsupported,
    TimedOut,
    ServerDied,
    NotValidForProgressivePlayback,
}

impl PlaybackErrorKind {
    pub fn describe(self) -> &'static str {
        match self {
            PlaybackErrorKind::Io => "I/O error",
            PlaybackErrorKind::Malformed => "malformed media",
            PlaybackErrorKind::Unsupported => "unsupported media",
            PlaybackErrorKind::TimedOut => "timed out",
            PlaybackErrorKind::ServerDied => "media service died",
            PlaybackErrorKind::NotValidForProgressivePlayback => {
                "not valid for progressive playback"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_have_descriptions() {
        let kinds = [
            PlaybackErrorKind::Io,
            PlaybackErrorKind::Malformed,
            PlaybackErrorKind::Unsupported,
            PlaybackErrorKind::TimedOut,
            PlaybackErrorKind::ServerDied,
            PlaybackErrorKind::NotValidForProgressivePlayback,
        ];
        for kind in kinds {
            assert!(!kind.describe().is_empty());
        }
    }
}
