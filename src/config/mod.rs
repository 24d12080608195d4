//! Capture-flow configuration.
//!
//! One [`SessionConfig`] per capture flow, supplied by the host when the
//! session is created and immutable for the life of that flow.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sentinel meaning "no length limit".
pub const UNLIMITED: i64 = -1;

/// Policy and passthrough settings for one capture flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Maximum recording duration in milliseconds, [`UNLIMITED`] for none.
    pub length_limit_ms: i64,

    /// Whether the user may discard a clip and record again.
    pub allow_retry: bool,

    /// Accept a completed recording without user preview/confirmation.
    pub auto_submit: bool,

    /// Where produced clips go. None = platform default directory.
    pub save_dir: Option<PathBuf>,

    /// ARGB accent color for the host UI. Passed through untouched.
    pub accent_color: u32,

    /// Whether the host should warn before recording in portrait.
    pub show_portrait_warning: bool,

    /// Select the front camera first when both facings exist.
    pub default_to_front_facing: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            length_limit_ms: UNLIMITED,
            allow_retry: true,
            auto_submit: false,
            save_dir: None,
            accent_color: 0,
            show_portrait_warning: true,
            default_to_front_facing: false,
        }
    }
}

impl SessionConfig {
    /// Normalize settings to acceptable values. A non-positive length limit
    /// means unlimited.
    pub fn validate(&mut self) {
        if self.length_limit_ms <= 0 {
            self.length_limit_ms = UNLIMITED;
        }
    }

    pub fn has_length_limit(&self) -> bool {
        self.length_limit_ms > UNLIMITED
    }
}
