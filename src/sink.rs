//! Where the timer announces itself: a tray label, a status bar, or just the log.

use serde::{Deserialize, Serialize};

/// Coarse activity state shown next to the display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorState {
    Idle,
    Working,
    Paused,
}

/// Receiver of timer display updates. Calls arrive from the timer's background tick as well
/// as from transitions, so implementations must be cheap and must not block.
pub trait NotificationSink: Send + Sync {
    fn set_display_text(&self, text: &str);
    fn set_indicator_state(&self, state: IndicatorState);
}

/// Sink that only writes debug log lines; used when the host has no display surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn set_display_text(&self, text: &str) {
        log::debug!("display text: {text}");
    }

    fn set_indicator_state(&self, state: IndicatorState) {
        log::debug!("indicator: {state:?}");
    }
}
