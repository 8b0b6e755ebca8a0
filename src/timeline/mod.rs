//! Second-mark timeline.
//!
//! A timeline is a sparse `BTreeMap<u32, T>` from whole seconds to images.
//! An image stays visible from its second until the next occupied second.

pub mod player;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::config::DEFAULT_MAX_SECONDS as MAX_SECONDS;

/// Returns the entry at the greatest key `<= cursor`.
pub fn resolve<T>(cursor: u32, timeline: &BTreeMap<u32, T>) -> Option<&T> {
    timeline.range(..=cursor).next_back().map(|(_, value)| value)
}

/// Cursor state of the timeline player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Playback {
    /// Cursor in whole seconds.
    pub position: u32,
    pub playing: bool,
    /// Steps per second.
    pub speed: f32,
    pub looping: bool,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            position: 0,
            playing: false,
            speed: 1.0,
            looping: false,
        }
    }
}

impl Playback {
    /// Advances the cursor by one second.
    ///
    /// At `max_seconds` the cursor wraps to 0 when looping; otherwise playback
    /// stops and the cursor stays at `max_seconds`.
    pub fn step(self, max_seconds: u32) -> Self {
        if self.position < max_seconds {
            return Self {
                position: self.position + 1,
                ..self
            };
        }
        if self.looping {
            Self {
                position: 0,
                ..self
            }
        } else {
            Self {
                position: max_seconds,
                playing: false,
                ..self
            }
        }
    }

    /// Delay between steps at `speed`.
    pub fn period(speed: f32) -> Duration {
        if !speed.is_finite() || speed <= 0.0 {
            return Duration::from_secs(1);
        }
        Duration::from_secs_f64(1.0 / f64::from(speed))
    }

    /// Stopped at 0, keeping speed and loop settings.
    pub fn rewound(self) -> Self {
        Self {
            position: 0,
            playing: false,
            ..self
        }
    }
}
