//! Per-tick update logic
//!
//! One [`UpdateMachine::tick`] per control-loop iteration:
//!
//! 1. Network down: reconnect at the network retry cadence, nothing else.
//! 2. Remote channel up: apply pending commands. Down: reconnect at the
//!    remote retry cadence and publish a status snapshot on success.
//! 3. Watchdog: no successful update for longer than the failure threshold
//!    enters failure mode and draws the failure screen once.
//! 4. Trigger on force-update, on the routine interval (auto-fetch), or on
//!    the failure retry interval while in failure mode.
//! 5. Attempt: download, then draw. Only a drawn picture counts as success.

use heapless::String;
use inkframe_protocol::{CommandKind, RemoteCommand};

use super::events::Event;
use super::machine::State;
use crate::config::{secs_to_ms, FrameConfig, MAX_URL_LEN};
use crate::traits::FrameServices;

const MS_PER_HOUR: u64 = 3_600_000;

/// Timing parameters, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Schedule {
    pub update_interval_ms: u64,
    pub auto_fetch: bool,
    pub failure_threshold_ms: u64,
    pub failure_retry_ms: u64,
    pub network_retry_ms: u64,
    pub remote_retry_ms: u64,
}

impl Schedule {
    pub fn from_config(config: &FrameConfig) -> Self {
        Self {
            update_interval_ms: secs_to_ms(config.update_interval_s),
            auto_fetch: config.auto_fetch,
            failure_threshold_ms: secs_to_ms(config.failure_threshold_s),
            failure_retry_ms: secs_to_ms(config.failure_retry_s),
            network_retry_ms: secs_to_ms(config.network_retry_s),
            remote_retry_ms: secs_to_ms(config.remote_retry_s),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::from_config(&FrameConfig::default())
    }
}

/// Everything the frame remembers between ticks
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceState {
    /// Current update phase
    pub state: State,
    /// When a picture was last drawn successfully
    pub last_success_ms: u64,
    /// When the last attempt (or failure screen) finished
    pub last_attempt_ms: u64,
    /// When the network was last asked to reconnect
    pub last_network_retry_ms: Option<u64>,
    /// When the remote channel was last asked to reconnect
    pub last_remote_retry_ms: Option<u64>,
    /// Attempt on the next eligible tick regardless of timers
    pub force_update: bool,
    /// Watchdog fired and no picture has been drawn since
    pub failure_mode: bool,
    /// An attempt has started and not yet reported its outcome
    pub in_flight: bool,
    /// Active image URL; a remote command may replace it
    pub image_url: String<MAX_URL_LEN>,
}

impl DeviceState {
    /// Fresh state at boot; the first eligible tick fetches immediately
    pub fn new(image_url: String<MAX_URL_LEN>, now_ms: u64) -> Self {
        Self {
            state: State::Idle,
            last_success_ms: now_ms,
            last_attempt_ms: now_ms,
            last_network_retry_ms: None,
            last_remote_retry_ms: None,
            force_update: true,
            failure_mode: false,
            in_flight: false,
            image_url,
        }
    }
}

/// Read-only snapshot handed to status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusView {
    pub state: State,
    pub failure_mode: bool,
    pub since_success_s: u64,
}

impl StatusView {
    pub fn status_text(&self) -> &'static str {
        self.state.status_text()
    }
}

fn due(last: Option<u64>, now_ms: u64, interval_ms: u64) -> bool {
    last.map_or(true, |t| now_ms.saturating_sub(t) >= interval_ms)
}

/// Owner of [`DeviceState`] and the only writer to it
#[derive(Debug, Clone)]
pub struct UpdateMachine {
    schedule: Schedule,
    device: DeviceState,
}

impl UpdateMachine {
    pub fn new(schedule: Schedule, image_url: String<MAX_URL_LEN>, now_ms: u64) -> Self {
        Self::from_state(schedule, DeviceState::new(image_url, now_ms))
    }

    pub fn from_state(schedule: Schedule, device: DeviceState) -> Self {
        Self { schedule, device }
    }

    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Snapshot for status reporting
    pub fn view(&self, now_ms: u64) -> StatusView {
        StatusView {
            state: self.device.state,
            failure_mode: self.device.failure_mode,
            since_success_s: now_ms.saturating_sub(self.device.last_success_ms) / 1000,
        }
    }

    /// Whole hours since the last successful update
    pub fn hours_since_success(&self, now_ms: u64) -> u32 {
        let hours = now_ms.saturating_sub(self.device.last_success_ms) / MS_PER_HOUR;
        u32::try_from(hours).unwrap_or(u32::MAX)
    }

    /// Ask for an attempt on the next eligible tick
    pub fn request_update(&mut self) {
        self.device.force_update = true;
    }

    /// Apply a remote command
    ///
    /// A URL carried by the command replaces the active URL for this and
    /// every later attempt.
    pub fn apply_command(&mut self, command: RemoteCommand) {
        match command.kind {
            CommandKind::Update => {
                if let Some(url) = command.url {
                    self.device.image_url = url;
                }
                self.request_update();
            }
        }
    }

    fn watchdog_expired(&self, now_ms: u64) -> bool {
        let since_success = now_ms.saturating_sub(self.device.last_success_ms);
        !self.device.failure_mode && since_success > self.schedule.failure_threshold_ms
    }

    /// Check whether step 4 would start an attempt at `now_ms`
    pub fn should_attempt(&self, now_ms: u64) -> bool {
        if self.device.in_flight {
            return false;
        }
        let since_attempt = now_ms.saturating_sub(self.device.last_attempt_ms);
        self.device.force_update
            || (self.schedule.auto_fetch && since_attempt > self.schedule.update_interval_ms)
            || (self.device.failure_mode && since_attempt > self.schedule.failure_retry_ms)
    }

    /// Run one control-loop iteration
    ///
    /// Returns the last event raised during the tick, if any.
    pub async fn tick<S: FrameServices>(&mut self, now_ms: u64, services: &mut S) -> Option<Event> {
        if !services.network_up() {
            if due(self.device.last_network_retry_ms, now_ms, self.schedule.network_retry_ms) {
                self.device.last_network_retry_ms = Some(now_ms);
                services.reconnect_network().await;
            }
            return None;
        }

        if services.remote_connected() {
            while let Some(command) = services.poll_remote().await {
                self.apply_command(command);
            }
        } else if due(self.device.last_remote_retry_ms, now_ms, self.schedule.remote_retry_ms) {
            self.device.last_remote_retry_ms = Some(now_ms);
            if services.reconnect_remote().await {
                self.publish(now_ms, services).await;
            }
        }

        let mut event = None;

        // An attempt future dropped mid-way never reported back
        if self.device.in_flight {
            self.device.in_flight = false;
            self.device.last_attempt_ms = now_ms;
            self.enter(Event::AttemptAbandoned);
            self.publish(now_ms, services).await;
            event = Some(Event::AttemptAbandoned);
        }

        if self.watchdog_expired(now_ms) {
            self.device.failure_mode = true;
            self.device.last_attempt_ms = now_ms;
            // Panel errors here have no fallback; the impl reports them
            let _ = services.render_failure_screen(self.hours_since_success(now_ms));
            self.publish(now_ms, services).await;
            event = Some(Event::WatchdogExpired);
        }

        if self.should_attempt(now_ms) {
            event = Some(self.attempt(now_ms, services).await);
        }

        event
    }

    async fn attempt<S: FrameServices>(&mut self, now_ms: u64, services: &mut S) -> Event {
        self.device.in_flight = true;
        self.device.force_update = false;
        self.enter(Event::UpdateTriggered);
        self.publish(now_ms, services).await;

        let url = self.device.image_url.clone();
        let outcome = match services.acquire(&url).await {
            Err(e) => Event::DownloadFailed(e),
            Ok(_) => {
                self.enter(Event::DownloadComplete);
                self.publish(now_ms, services).await;
                match services.render_image() {
                    Ok(()) => Event::RenderComplete,
                    Err(e) => Event::RenderFailed(e),
                }
            }
        };

        self.device.last_attempt_ms = now_ms;
        if outcome == Event::RenderComplete {
            self.device.last_success_ms = now_ms;
            self.device.failure_mode = false;
        }
        self.enter(outcome);
        self.device.in_flight = false;
        self.publish(now_ms, services).await;
        outcome
    }

    fn enter(&mut self, event: Event) {
        self.device.state = self.device.state.transition(event);
    }

    async fn publish<S: FrameServices>(&self, now_ms: u64, services: &mut S) {
        services.publish_status(&self.view(now_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{AcquireError, DownloadError};
    use crate::mock::FakeServices;
    use crate::render::RenderError;
    use crate::traits::{PanelError, StorageError};
    use embassy_futures::block_on;

    const HOUR: u64 = MS_PER_HOUR;
    const URL: &str = "http://frame.local/image.bmp";

    fn url(s: &str) -> String<MAX_URL_LEN> {
        let mut out = String::new();
        out.push_str(s).unwrap();
        out
    }

    /// Settled machine: booted long ago, nothing pending
    fn settled(schedule: Schedule, last_success_ms: u64, last_attempt_ms: u64) -> UpdateMachine {
        let mut device = DeviceState::new(url(URL), 0);
        device.force_update = false;
        device.last_success_ms = last_success_ms;
        device.last_attempt_ms = last_attempt_ms;
        UpdateMachine::from_state(schedule, device)
    }

    fn manual_schedule() -> Schedule {
        Schedule {
            auto_fetch: false,
            ..Schedule::default()
        }
    }

    #[test]
    fn test_boot_fetches_immediately() {
        let mut machine = UpdateMachine::new(Schedule::default(), url(URL), 0);
        let mut services = FakeServices::online();

        let event = block_on(machine.tick(10, &mut services));

        assert_eq!(event, Some(Event::RenderComplete));
        assert_eq!(services.acquired, [URL]);
        assert_eq!(services.renders, 1);
        assert!(!machine.device().force_update);
    }

    #[test]
    fn test_watchdog_enters_failure_mode_once() {
        let now = 25 * HOUR;
        let mut machine = settled(Schedule::default(), 0, 0);
        let mut services = FakeServices::online();

        let event = block_on(machine.tick(now, &mut services));

        assert_eq!(event, Some(Event::WatchdogExpired));
        assert!(machine.device().failure_mode);
        assert_eq!(services.failure_screens, [25]);
        assert_eq!(machine.device().last_attempt_ms, now);
        assert!(services.acquired.is_empty());

        // Later ticks inside the retry interval change nothing
        let event = block_on(machine.tick(now + 60_000, &mut services));
        assert_eq!(event, None);
        assert_eq!(services.failure_screens.len(), 1);
        assert!(services.acquired.is_empty());
    }

    #[test]
    fn test_failure_mode_retries_after_interval() {
        let now = 30 * HOUR;
        let mut device = DeviceState::new(url(URL), 0);
        device.force_update = false;
        device.failure_mode = true;
        device.last_attempt_ms = now - 2 * HOUR;
        let schedule = Schedule {
            failure_retry_ms: HOUR,
            ..manual_schedule()
        };
        let mut machine = UpdateMachine::from_state(schedule, device);
        let mut services = FakeServices::online();

        let event = block_on(machine.tick(now, &mut services));

        assert_eq!(services.acquired.len(), 1);
        assert_eq!(event, Some(Event::RenderComplete));
        assert!(!machine.device().failure_mode);
        assert_eq!(machine.device().last_success_ms, now);
        assert_eq!(machine.device().state, State::Idle);
    }

    #[test]
    fn test_failure_mode_waits_for_retry_interval() {
        let now = 30 * HOUR;
        let mut device = DeviceState::new(url(URL), 0);
        device.force_update = false;
        device.failure_mode = true;
        device.last_attempt_ms = now - HOUR / 2;
        let mut machine = UpdateMachine::from_state(manual_schedule(), device);
        let mut services = FakeServices::online();

        assert_eq!(block_on(machine.tick(now, &mut services)), None);
        assert!(services.acquired.is_empty());
    }

    #[test]
    fn test_not_found_does_not_count_as_success() {
        let now = 2 * HOUR;
        let mut machine = settled(Schedule::default(), 0, 0);
        let mut services = FakeServices::online();
        services
            .acquire_results
            .push_back(Err(AcquireError::Download(DownloadError::Status(404))));

        let event = block_on(machine.tick(now, &mut services));

        assert!(matches!(event, Some(Event::DownloadFailed(_))));
        assert_eq!(machine.device().last_success_ms, 0);
        assert_eq!(machine.device().last_attempt_ms, now);
        assert_eq!(machine.device().state, State::DownloadFailed);
        assert!(!machine.device().failure_mode);
        assert_eq!(services.renders, 0);
        assert_eq!(
            services.published.last().map(|v| v.status_text()),
            Some("Download Failed")
        );
    }

    #[test]
    fn test_download_failure_keeps_failure_mode() {
        let now = 30 * HOUR;
        let mut device = DeviceState::new(url(URL), 0);
        device.force_update = true;
        device.failure_mode = true;
        device.last_attempt_ms = now - HOUR / 2;
        let mut machine = UpdateMachine::from_state(manual_schedule(), device);
        let mut services = FakeServices::online();
        services
            .acquire_results
            .push_back(Err(AcquireError::Storage(StorageError::Io)));

        block_on(machine.tick(now, &mut services));

        assert!(machine.device().failure_mode);
        assert_eq!(machine.device().state, State::DownloadFailed);
    }

    #[test]
    fn test_render_failure() {
        let mut machine = settled(Schedule::default(), 0, 0);
        let mut services = FakeServices::online();
        services.render_result = Err(RenderError::Panel(PanelError::Timeout));

        let event = block_on(machine.tick(2 * HOUR, &mut services));

        assert!(matches!(event, Some(Event::RenderFailed(_))));
        assert_eq!(machine.device().state, State::RenderFailed);
        assert_eq!(machine.device().last_success_ms, 0);
        assert_eq!(machine.device().last_attempt_ms, 2 * HOUR);
    }

    #[test]
    fn test_routine_interval_is_strict() {
        let interval = Schedule::default().update_interval_ms;
        let mut machine = settled(Schedule::default(), 1000, 1000);
        let mut services = FakeServices::online();

        assert_eq!(block_on(machine.tick(1000 + interval, &mut services)), None);
        assert!(services.acquired.is_empty());

        block_on(machine.tick(1000 + interval + 1, &mut services));
        assert_eq!(services.acquired.len(), 1);
    }

    #[test]
    fn test_manual_mode_waits_for_command() {
        let mut machine = settled(manual_schedule(), 0, 0);
        let mut services = FakeServices::online();

        assert_eq!(block_on(machine.tick(3 * HOUR, &mut services)), None);
        assert!(services.acquired.is_empty());
    }

    #[test]
    fn test_network_down_skips_everything() {
        let mut machine = settled(Schedule::default(), 0, 0);
        let mut services = FakeServices::online();
        services.network = false;
        machine.request_update();

        let retry = machine.schedule().network_retry_ms;
        // Past the watchdog threshold too
        let start = 30 * HOUR;
        assert_eq!(block_on(machine.tick(start, &mut services)), None);
        assert_eq!(services.network_reconnects, 1);

        block_on(machine.tick(start + retry / 2, &mut services));
        assert_eq!(services.network_reconnects, 1);

        block_on(machine.tick(start + retry, &mut services));
        assert_eq!(services.network_reconnects, 2);

        assert!(services.acquired.is_empty());
        assert!(services.failure_screens.is_empty());
        assert!(services.published.is_empty());
        assert!(!machine.device().failure_mode);
    }

    #[test]
    fn test_remote_command_forces_update_with_new_url() {
        let mut machine = settled(manual_schedule(), 0, 0);
        let mut services = FakeServices::online();
        services.commands.push_back(RemoteCommand {
            kind: CommandKind::Update,
            url: Some(url("http://other.local/b.bmp")),
        });

        block_on(machine.tick(HOUR, &mut services));

        assert_eq!(services.acquired, ["http://other.local/b.bmp"]);
        assert_eq!(machine.device().image_url.as_str(), "http://other.local/b.bmp");

        // The override sticks for later attempts
        machine.request_update();
        block_on(machine.tick(HOUR + 1, &mut services));
        assert_eq!(services.acquired[1], "http://other.local/b.bmp");
    }

    #[test]
    fn test_remote_reconnect_publishes_status() {
        let mut machine = settled(manual_schedule(), 0, 0);
        let mut services = FakeServices::online();
        services.remote = false;
        services.remote_comes_back = true;

        block_on(machine.tick(5000, &mut services));

        assert_eq!(services.remote_reconnects, 1);
        assert_eq!(services.published.len(), 1);
        assert_eq!(services.published[0].since_success_s, 5);
    }

    #[test]
    fn test_remote_reconnect_cadence() {
        let mut machine = settled(manual_schedule(), 0, 0);
        let mut services = FakeServices::online();
        services.remote = false;
        let retry = machine.schedule().remote_retry_ms;

        block_on(machine.tick(0, &mut services));
        block_on(machine.tick(retry - 1, &mut services));
        assert_eq!(services.remote_reconnects, 1);
        assert!(services.published.is_empty());

        block_on(machine.tick(retry, &mut services));
        assert_eq!(services.remote_reconnects, 2);
    }

    #[test]
    fn test_every_transition_is_published() {
        let mut machine = UpdateMachine::new(Schedule::default(), url(URL), 0);
        let mut services = FakeServices::online();

        block_on(machine.tick(1, &mut services));

        let states: Vec<State> = services.published.iter().map(|v| v.state).collect();
        assert_eq!(states, [State::Downloading, State::Drawing, State::Idle]);
    }

    #[test]
    fn test_abandoned_attempt_is_recovered() {
        use embassy_futures::select::{select, Either};

        let mut machine = UpdateMachine::new(Schedule::default(), url(URL), 0);
        let mut services = FakeServices::online();
        services.acquire_hangs = true;

        // The attempt never finishes; dropping the tick future abandons it
        let first = block_on(select(machine.tick(1, &mut services), async {}));
        assert!(matches!(first, Either::Second(())));
        assert!(machine.device().in_flight);
        assert!(!machine.should_attempt(2));

        services.acquire_hangs = false;
        let event = block_on(machine.tick(2, &mut services));
        assert_eq!(event, Some(Event::AttemptAbandoned));
        assert!(!machine.device().in_flight);
        assert_eq!(machine.device().state, State::DownloadFailed);
        assert_eq!(services.acquired.len(), 1);
    }

    #[test]
    fn test_abandoned_attempt_does_not_block_forced_update() {
        use embassy_futures::select::select;

        let mut machine = UpdateMachine::new(Schedule::default(), url(URL), 0);
        let mut services = FakeServices::online();
        services.acquire_hangs = true;
        block_on(select(machine.tick(1, &mut services), async {}));

        services.acquire_hangs = false;
        machine.request_update();
        let event = block_on(machine.tick(2, &mut services));

        assert_eq!(event, Some(Event::RenderComplete));
        assert_eq!(services.acquired.len(), 2);
        let states: Vec<State> = services.published[1..].iter().map(|v| v.state).collect();
        assert_eq!(
            states,
            [State::DownloadFailed, State::Downloading, State::Drawing, State::Idle]
        );
    }

    #[test]
    fn test_abandoned_attempt_still_runs_watchdog() {
        use embassy_futures::select::select;

        let mut machine = settled(manual_schedule(), 0, 0);
        machine.request_update();
        let mut services = FakeServices::online();
        services.acquire_hangs = true;
        block_on(select(machine.tick(HOUR, &mut services), async {}));

        services.acquire_hangs = false;
        let event = block_on(machine.tick(25 * HOUR, &mut services));

        assert_eq!(event, Some(Event::WatchdogExpired));
        assert_eq!(services.failure_screens, [25]);
        assert!(machine.device().failure_mode);
        assert_eq!(services.acquired.len(), 1);
    }

    #[test]
    fn test_hours_since_success() {
        let machine = settled(Schedule::default(), HOUR, HOUR);
        assert_eq!(machine.hours_since_success(HOUR + HOUR / 2), 0);
        assert_eq!(machine.hours_since_success(26 * HOUR), 25);
        assert_eq!(machine.hours_since_success(0), 0);
    }

    #[test]
    fn test_schedule_from_config() {
        let mut config = FrameConfig::default();
        config.failure_retry_s = 120;
        config.auto_fetch = false;
        let schedule = Schedule::from_config(&config);
        assert_eq!(schedule.failure_retry_ms, 120_000);
        assert_eq!(schedule.update_interval_ms, 1_800_000);
        assert!(!schedule.auto_fetch);
    }
}
