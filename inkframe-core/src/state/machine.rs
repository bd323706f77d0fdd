//! State machine definition
//!
//! The panel-facing phase of the frame is a function of the current state
//! and an event. Failure mode is tracked separately in
//! [`super::DeviceState`] because it overlaps every phase.

use super::events::Event;

/// Update phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Waiting for the next trigger; last attempt succeeded (or none yet)
    Idle,
    /// Fetching the image into the cache
    Downloading,
    /// Drawing the cached image
    Drawing,
    /// Waiting for the next trigger; last download failed
    DownloadFailed,
    /// Waiting for the next trigger; last render failed
    RenderFailed,
}

impl State {
    /// Status text published to the remote channel
    pub fn status_text(&self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::Downloading => "Downloading",
            State::Drawing => "Drawing",
            State::DownloadFailed => "Download Failed",
            State::RenderFailed => "Render Failed",
        }
    }

    /// Check if an attempt is in progress
    pub fn is_busy(&self) -> bool {
        matches!(self, State::Downloading | State::Drawing)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use State::*;

        match (self, event) {
            // Any resting state can start an attempt
            (Idle | State::DownloadFailed | State::RenderFailed, UpdateTriggered) => Downloading,

            // Downloading transitions
            (Downloading, DownloadComplete) => Drawing,
            (Downloading, Event::DownloadFailed(_)) => State::DownloadFailed,
            (Downloading, AttemptAbandoned) => State::DownloadFailed,

            // Drawing transitions
            (Drawing, RenderComplete) => Idle,
            (Drawing, Event::RenderFailed(_)) => State::RenderFailed,
            (Drawing, AttemptAbandoned) => State::RenderFailed,

            // The watchdog changes the failure flag, not the phase
            // Default: stay in current state
            _ => self,
        }
    }
}
