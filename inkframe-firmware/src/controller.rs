//! Control loop driving the update state machine
//!
//! Always-on frames tick forever. Battery frames tick only until one
//! attempt has finished (or the cycle deadline passes), then hand back the
//! state to carry across the reset.

use defmt::*;
use embassy_time::{Duration, Instant, Ticker};

use inkframe_core::state::{Event, UpdateMachine};
use inkframe_core::traits::{ImageStore, PagedPanel};

use crate::services::FrameIo;

/// Control loop period
pub const TICK: Duration = Duration::from_secs(1);

/// Longest a battery cycle stays awake without finishing an attempt
#[cfg(feature = "battery")]
pub const CYCLE_DEADLINE: Duration = Duration::from_secs(180);

fn log_event(event: &Event, machine: &UpdateMachine, now_ms: u64) {
    let state = machine.device().state;
    if event.is_failure() {
        warn!("{:?} -> {:?}", event, state);
    } else {
        info!("{:?} -> {:?}", event, state);
    }
    debug!("{:?}", machine.view(now_ms));
}

/// Run the frame forever
pub async fn run<P, S>(machine: &mut UpdateMachine, io: &mut FrameIo<'_, P, S>) -> !
where
    P: PagedPanel,
    S: ImageStore,
{
    info!("Control loop running, tick {} ms", TICK.as_millis());
    let mut ticker = Ticker::every(TICK);
    loop {
        let now = Instant::now().as_millis();
        if let Some(event) = machine.tick(now, io).await {
            log_event(&event, machine, now);
        }
        ticker.next().await;
    }
}

/// Run one battery cycle and return what the next cycle must know
///
/// `clock_offset_ms` shifts uptime onto the machine's clock so that time
/// slept in earlier cycles counts toward the failure threshold.
#[cfg(feature = "battery")]
pub async fn run_cycle<P, S>(
    machine: &mut UpdateMachine,
    io: &mut FrameIo<'_, P, S>,
    clock_offset_ms: u64,
    sleep_s: u32,
) -> crate::power::CarriedState
where
    P: PagedPanel,
    S: ImageStore,
{
    let started = Instant::now();
    let mut ticker = Ticker::every(TICK);
    loop {
        let now = clock_offset_ms + Instant::now().as_millis();
        if let Some(event) = machine.tick(now, io).await {
            log_event(&event, machine, now);
            if event.ends_attempt() {
                break;
            }
        }
        if started.elapsed() > CYCLE_DEADLINE {
            warn!("Cycle deadline passed without an attempt");
            break;
        }
        ticker.next().await;
    }

    io.shut_down_radio().await;

    let view = machine.view(clock_offset_ms + Instant::now().as_millis());
    let since_success_s = u32::try_from(view.since_success_s).unwrap_or(u32::MAX);
    crate::power::CarriedState {
        since_success_s: since_success_s.saturating_add(sleep_s),
        failure_mode: view.failure_mode,
    }
}
