//! Events that trigger state transitions

use crate::acquire::AcquireError;
use crate::render::RenderError;

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// An update attempt started (schedule, retry or force)
    UpdateTriggered,
    /// Image downloaded and committed to the cache
    DownloadComplete,
    /// Download failed; the previous image is still cached
    DownloadFailed(AcquireError),
    /// Cached image drawn on the panel
    RenderComplete,
    /// Cached image could not be drawn
    RenderFailed(RenderError),
    /// A previous attempt stopped before reporting an outcome
    AttemptAbandoned,
    /// No successful update within the failure threshold
    WatchdogExpired,
}

impl Event {
    /// Check if this event ends an update attempt
    pub fn ends_attempt(&self) -> bool {
        matches!(
            self,
            Event::DownloadFailed(_)
                | Event::RenderComplete
                | Event::RenderFailed(_)
                | Event::AttemptAbandoned
        )
    }

    /// Check if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::DownloadFailed(_)
                | Event::RenderFailed(_)
                | Event::AttemptAbandoned
                | Event::WatchdogExpired
        )
    }
}
