//! Battery-mode bookkeeping across resets
//!
//! A battery cycle ends in a watchdog reset, which clears RAM but not the
//! watchdog scratch registers. The little the update logic needs from the
//! previous cycle is parked there.

use defmt::*;
use embassy_rp::watchdog::Watchdog;

const MAGIC: u32 = 0x494B_5350;

const SLOT_MAGIC: usize = 0;
const SLOT_SINCE_SUCCESS: usize = 1;
const SLOT_FLAGS: usize = 2;

const FLAG_FAILURE_MODE: u32 = 1 << 0;

/// Update state carried from one battery cycle to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CarriedState {
    /// Seconds since the last drawn picture, including the sleep just taken
    pub since_success_s: u32,
    /// Failure screen is on the panel
    pub failure_mode: bool,
}

impl CarriedState {
    /// Read the state left by the previous cycle
    ///
    /// `None` after a power-on reset, when the registers hold no marker.
    pub fn restore(watchdog: &mut Watchdog) -> Option<Self> {
        if watchdog.get_scratch(SLOT_MAGIC) != MAGIC {
            return None;
        }
        let state = Self {
            since_success_s: watchdog.get_scratch(SLOT_SINCE_SUCCESS),
            failure_mode: watchdog.get_scratch(SLOT_FLAGS) & FLAG_FAILURE_MODE != 0,
        };
        debug!("Carried state: {:?}", state);
        Some(state)
    }

    pub fn store(&self, watchdog: &mut Watchdog) {
        let flags = if self.failure_mode { FLAG_FAILURE_MODE } else { 0 };
        watchdog.set_scratch(SLOT_SINCE_SUCCESS, self.since_success_s);
        watchdog.set_scratch(SLOT_FLAGS, flags);
        watchdog.set_scratch(SLOT_MAGIC, MAGIC);
    }

    /// Millisecond timestamp that puts the last success at zero
    pub fn clock_offset_ms(&self) -> u64 {
        self.since_success_s as u64 * 1000
    }
}
