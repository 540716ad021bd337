//! Wake cycle orchestration
//!
//! One call to [`WakeScheduler::run_cycle`] is one wake of the device:
//!
//! ```text
//! WakeDetect → Sample → Connect → FetchAndRender → Report → ArmNextWake → Sleep
//! WakeDetect → Provisioning → Sample → Report → ArmNextWake → Sleep
//! ```
//!
//! A wake that enters provisioning never connects or refreshes the panel,
//! even when the portal leaves valid settings behind; the next timer wake
//! picks them up.
//!
//! Every failure after WakeDetect is absorbed and reported; the cycle always
//! ends with a timer armed and the platform asked to deep sleep. The only
//! stage allowed to keep the device awake is an operator-started provisioning
//! session, and that is bounded by its own timeout.
//!
//! Nothing survives between cycles except [`RetainedState`] and whatever the
//! [`ConfigStore`] persists.

use embedded_hal::delay::DelayNs;

use crate::config::{BuilderError, CycleConfig};
use crate::driver::PanelDriver;
use crate::error::{ArmError, DecodeError};
use crate::input::{Button, WakeCause, WakeReason, classify, navigate};
use crate::interface::DisplayInterface;
use crate::net::Network;
use crate::pipeline::ImagePipeline;
use crate::report::{CycleStatus, FetchFailure, FetchStatus, PanelStatus, ReportSink};
use crate::sensor::{BatteryGauge, ClimateSensor, SensorReading, SensorSampler};
use crate::settings::{ConfigStore, RETAINED_LEN, RetainedState, Settings, load_valid};

/// Board services the scheduler needs
pub trait Platform {
    /// Blocking delay provider
    type Delay: DelayNs;

    /// Why the chip woke up
    fn wake_cause(&mut self) -> WakeCause;

    /// Current level of a button
    fn is_pressed(&mut self, button: Button) -> bool;

    /// Milliseconds since this wake
    fn uptime_ms(&self) -> u64;

    /// Wall-clock time in milliseconds, once synchronized
    fn wall_clock_ms(&self) -> Option<u64>;

    /// Delay provider shared by the panel, sensors and button polling
    fn delay(&mut self) -> &mut Self::Delay;

    /// Read the RTC-retained block
    fn load_retained(&mut self) -> [u8; RETAINED_LEN];

    /// Write the RTC-retained block
    fn store_retained(&mut self, block: &[u8; RETAINED_LEN]);

    /// Restart the hardware watchdog period
    fn feed_watchdog(&mut self);

    /// Wake after `sleep_ms`
    fn arm_timer(&mut self, sleep_ms: u64) -> Result<(), ArmError>;

    /// Wake on any button press
    fn arm_buttons(&mut self) -> Result<(), ArmError>;

    /// Enter deep sleep
    ///
    /// Does not return on hardware.
    fn deep_sleep(&mut self);
}

/// How a provisioning session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// New settings were written to the store
    Saved,
    /// Nobody completed the portal in time
    TimedOut,
    /// The portal could not be started
    Aborted,
}

/// Captive-portal session
///
/// The implementation owns the access point and HTTP server. It must feed the
/// watchdog itself while it waits.
pub trait Provisioning {
    /// Run the portal until settings are saved or `timeout_ms` passes
    fn enter<S: ConfigStore + ?Sized>(
        &mut self,
        store: &mut S,
        timeout_ms: u32,
    ) -> ProvisioningOutcome;

    /// Tear the portal down
    fn exit(&mut self);
}

/// Top-level mode of a wake cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Regular refresh cycle
    Normal,
    /// Provisioning session first
    Provisioning,
}

/// Pick the mode for a wake
///
/// Cold boot, a long refresh hold or unusable settings start provisioning.
pub fn select_mode(reason: WakeReason, settings_valid: bool) -> Mode {
    match reason {
        WakeReason::ColdBoot | WakeReason::ButtonRefreshLong => Mode::Provisioning,
        _ if !settings_valid => Mode::Provisioning,
        _ => Mode::Normal,
    }
}

/// Per-wake context
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WakeContext {
    /// Classified wake reason
    pub reason: WakeReason,
    /// Page shown by this cycle
    pub page: u8,
    /// Cycle counter
    pub cycle: u32,
}

/// What a wake cycle did
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
    /// Mode the cycle ran in
    pub mode: Mode,
    /// Reason, page and counter
    pub context: WakeContext,
    /// Provisioning result, if a session ran
    pub provisioning: Option<ProvisioningOutcome>,
    /// Sensor values sent with the report
    pub reading: SensorReading,
    /// Status sent with the report
    pub status: CycleStatus,
    /// Timer armed before sleeping
    pub sleep_ms: u64,
    /// False if the button wake could not be armed; only the timer will wake
    /// the device
    pub buttons_armed: bool,
}

/// Time until the next scheduled wake
///
/// With a wall clock and a known last refresh the next wake is anchored to
/// `last_refresh + interval`, so page-change wakes do not postpone it.
/// Otherwise the time already spent awake is subtracted from the interval.
/// The result is never below `min_sleep_ms`.
pub fn next_sleep_ms(
    interval_ms: u64,
    min_sleep_ms: u64,
    now_ms: Option<u64>,
    last_refresh_ms: Option<u64>,
    uptime_ms: u64,
) -> u64 {
    let ceiling = interval_ms.max(min_sleep_ms);
    match (now_ms, last_refresh_ms) {
        (Some(now), Some(last)) => (last.saturating_add(interval_ms))
            .saturating_sub(now)
            .clamp(min_sleep_ms, ceiling),
        _ => interval_ms.saturating_sub(uptime_ms).max(min_sleep_ms),
    }
}

/// Runs wake cycles over the board's collaborators
pub struct WakeScheduler<P, I, B, C, N, S, V, R>
where
    P: Platform,
    I: DisplayInterface,
    B: BatteryGauge,
    C: ClimateSensor,
    N: Network,
    S: ConfigStore,
    V: Provisioning,
    R: ReportSink,
{
    config: CycleConfig,
    platform: P,
    panel: PanelDriver<I>,
    sensors: SensorSampler<B, C>,
    network: N,
    store: S,
    provisioning: V,
    sink: R,
}

impl<P, I, B, C, N, S, V, R> WakeScheduler<P, I, B, C, N, S, V, R>
where
    P: Platform,
    I: DisplayInterface,
    B: BatteryGauge,
    C: ClimateSensor,
    N: Network,
    S: ConfigStore,
    V: Provisioning,
    R: ReportSink,
{
    /// Create a scheduler
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::WatchdogBudget` if the watchdog could fire
    /// during a worst-case panel refresh.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CycleConfig,
        platform: P,
        panel: PanelDriver<I>,
        sensors: SensorSampler<B, C>,
        network: N,
        store: S,
        provisioning: V,
        sink: R,
    ) -> Result<Self, BuilderError> {
        let refresh_budget_ms = panel.spec().refresh_budget_ms();
        if config.watchdog_timeout_ms <= refresh_budget_ms {
            return Err(BuilderError::WatchdogBudget {
                watchdog_ms: config.watchdog_timeout_ms,
                refresh_budget_ms,
            });
        }
        Ok(Self {
            config,
            platform,
            panel,
            sensors,
            network,
            store,
            provisioning,
            sink,
        })
    }

    /// Cycle configuration
    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Access the platform
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Access the panel driver
    pub fn panel(&self) -> &PanelDriver<I> {
        &self.panel
    }

    /// Access the network
    pub fn network(&self) -> &N {
        &self.network
    }

    /// Access the settings store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Access the provisioning portal
    pub fn provisioning(&self) -> &V {
        &self.provisioning
    }

    /// Access the report sink
    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Run one wake cycle, ending in deep sleep
    pub fn run_cycle(&mut self) -> CycleReport {
        let retained = RetainedState::decode_or_default(&self.platform.load_retained());
        let cycle = retained.cycle.wrapping_add(1);

        let cause = self.platform.wake_cause();
        let held_ms = self.measure_hold(cause);
        let reason = classify(cause, held_ms, &self.config.thresholds());
        log::info!("wake #{}: {} ({:?}, held {} ms)", cycle, reason, cause, held_ms);

        if reason == WakeReason::WatchdogRecovery {
            if let Err(e) = self.panel.force_power_off(self.platform.delay()) {
                log::error!("panel left in unknown state: {}", e);
            }
        }
        self.platform.feed_watchdog();

        let loaded = match load_valid(&mut self.store) {
            Ok(settings) => Some(settings),
            Err(e) => {
                log::warn!("settings unusable: {}", e);
                None
            }
        };
        let mode = select_mode(reason, loaded.is_some());
        let (settings, provisioning) = match mode {
            Mode::Normal => (loaded, None),
            Mode::Provisioning => {
                let (outcome, settings) = self.provision();
                (settings, Some(outcome))
            }
        };

        let page = settings
            .as_ref()
            .map_or(retained.page, |s| navigate(reason, retained.page, s.page_count()));
        let context = WakeContext {
            reason,
            page,
            cycle,
        };
        log::debug!("context: {:?}", context);

        let reading = self.sensors.sample(self.platform.delay());
        self.platform.feed_watchdog();

        let mut rssi = None;
        let mut connected = false;
        let (fetch, panel) = match &settings {
            _ if mode == Mode::Provisioning => {
                log::info!("provisioning wake, refresh deferred to next cycle");
                (FetchStatus::Skipped, PanelStatus::NotAttempted)
            }
            None => (FetchStatus::Skipped, PanelStatus::NotAttempted),
            Some(_) if reason.is_page_change() => {
                log::info!("page {} selected, refresh deferred", page);
                (FetchStatus::Skipped, PanelStatus::NotAttempted)
            }
            Some(settings) => match self
                .network
                .connect(settings, self.config.connect_timeout_ms)
            {
                Ok(()) => {
                    connected = true;
                    rssi = self.network.rssi();
                    self.platform.feed_watchdog();
                    self.fetch_and_render(settings, page, &reading)
                }
                Err(e) => {
                    log::warn!("network unavailable: {}", e);
                    (
                        FetchStatus::Failed(FetchFailure::ConnectFailed(e)),
                        PanelStatus::NotAttempted,
                    )
                }
            },
        };

        let last_refresh_ms = if panel == PanelStatus::Refreshed {
            self.platform.wall_clock_ms().or(retained.last_refresh_ms)
        } else {
            retained.last_refresh_ms
        };
        let interval_s = settings
            .as_ref()
            .map_or(self.config.fallback_interval_s, |s| s.wake_interval_s);

        let status = CycleStatus {
            reason,
            cycle,
            page,
            interval_s,
            rssi,
            fetch,
            panel,
        };
        if let Err(e) = self.sink.send(&reading, &status) {
            log::warn!("report not delivered: {}", e);
        }
        if connected {
            self.network.disconnect();
        }
        self.platform.feed_watchdog();

        let sleep_ms = next_sleep_ms(
            u64::from(interval_s) * 1000,
            u64::from(self.config.min_sleep_ms),
            self.platform.wall_clock_ms(),
            last_refresh_ms,
            self.platform.uptime_ms(),
        );
        let (sleep_ms, buttons_armed) = self.arm_wake_sources(sleep_ms);

        let state = RetainedState {
            cycle,
            page,
            last_refresh_ms,
        };
        self.platform.store_retained(&state.encode());
        log::info!("cycle #{} done, sleeping {} ms", cycle, sleep_ms);
        self.platform.deep_sleep();

        CycleReport {
            mode,
            context,
            provisioning,
            reading,
            status,
            sleep_ms,
            buttons_armed,
        }
    }

    /// Poll a waking button until it is released or the longest threshold
    /// that matters for it is reached
    fn measure_hold(&mut self, cause: WakeCause) -> u32 {
        let WakeCause::Button(button) = cause else {
            return 0;
        };
        let limit = match button {
            Button::Refresh => self.config.provisioning_hold_ms,
            Button::Left | Button::Right => self.config.long_press_ms,
        };
        let poll = self.config.hold_poll_ms;
        let mut held = 0u32;
        while held < limit && self.platform.is_pressed(button) {
            self.platform.delay().delay_ms(poll);
            held = held.saturating_add(poll);
            self.platform.feed_watchdog();
        }
        held
    }

    fn provision(&mut self) -> (ProvisioningOutcome, Option<Settings>) {
        log::info!("entering provisioning");
        let outcome = self
            .provisioning
            .enter(&mut self.store, self.config.provisioning_timeout_ms);
        self.provisioning.exit();
        self.platform.feed_watchdog();
        log::info!("provisioning ended: {:?}", outcome);

        match load_valid(&mut self.store) {
            Ok(settings) => (outcome, Some(settings)),
            Err(e) => {
                log::warn!("still unconfigured after provisioning: {}", e);
                (outcome, None)
            }
        }
    }

    fn fetch_and_render(
        &mut self,
        settings: &Settings,
        page: u8,
        reading: &SensorReading,
    ) -> (FetchStatus, PanelStatus) {
        let Some(url) = settings.page_url(page) else {
            log::warn!("no URL for page {}", page);
            return (
                FetchStatus::Failed(FetchFailure::NoPage),
                PanelStatus::NotAttempted,
            );
        };
        let spec = self.panel.spec();
        let pipeline = ImagePipeline::new(spec.palette)
            .with_kernel(self.config.kernel)
            .with_resample(self.config.resample)
            .with_gamut_clip(self.config.gamut_clip);

        log::info!("fetching page {}: {}", page, url);
        let rendered = match self.network.fetch(url, reading) {
            Ok(stream) => pipeline.render_png(stream, &spec.geometry),
            Err(e) => {
                log::warn!("fetch failed: {}", e);
                return (
                    FetchStatus::Failed(FetchFailure::Fetch(e)),
                    PanelStatus::NotAttempted,
                );
            }
        };
        self.platform.feed_watchdog();

        let frame = match rendered {
            Ok(frame) => frame,
            Err(DecodeError::Source(e)) => {
                log::warn!("body transfer failed: {}", e);
                return (
                    FetchStatus::Failed(FetchFailure::Fetch(e)),
                    PanelStatus::NotAttempted,
                );
            }
            Err(e) => {
                log::warn!("image rejected: {}", e);
                return (
                    FetchStatus::Failed(FetchFailure::Decode(e)),
                    PanelStatus::NotAttempted,
                );
            }
        };

        let panel = match self.panel.refresh(&frame, self.platform.delay()) {
            Ok(()) => PanelStatus::Refreshed,
            Err(e) => PanelStatus::Faulted(e),
        };
        self.platform.feed_watchdog();
        (FetchStatus::Rendered, panel)
    }

    /// Arm buttons and the timer, returning the sleep actually armed and
    /// whether the buttons will wake the device
    fn arm_wake_sources(&mut self, sleep_ms: u64) -> (u64, bool) {
        let buttons_armed = match self.platform.arm_buttons() {
            Ok(()) => true,
            Err(e) => {
                log::error!("buttons: {}, timer wake only", e);
                false
            }
        };
        if self.platform.arm_timer(sleep_ms).is_ok() {
            return (sleep_ms, buttons_armed);
        }
        let fallback = self.config.fallback_interval_ms();
        log::error!("timer rejected {} ms, retrying with {} ms", sleep_ms, fallback);
        if let Err(e) = self.platform.arm_timer(fallback) {
            log::error!("timer: {}", e);
        }
        (fallback, buttons_armed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::MONOCHROME;
    use crate::command::{
        CommandStep, DATA_START_TRANSMISSION_2, DEEP_SLEEP, DISPLAY_REFRESH, PANEL_SETTING,
        POWER_OFF, POWER_ON, PanelSpec, PanelVariant, PlaneTransfer, PlaneWrite, ResetTiming,
    };
    use crate::config::{Builder, PanelGeometry};
    use crate::error::{ConfigError, FaultReason, IoError, PanelStage};
    use crate::net::SliceStream;
    use crate::png::build_png;
    use crate::sensor::NoSensor;
    use alloc::string::{String, ToString};
    use alloc::vec;
    use alloc::vec::Vec;

    const WALL_BASE: u64 = 1_700_000_000_000;

    static INIT: [CommandStep; 1] = [CommandStep::new(PANEL_SETTING, &[0x1F])];
    static PLANE: [PlaneWrite; 1] = [PlaneWrite {
        command: DATA_START_TRANSMISSION_2,
        plane: 0,
        invert: false,
    }];

    static PANEL: PanelSpec = PanelSpec {
        variant: PanelVariant::E1001,
        geometry: PanelGeometry::fixed(16, 2),
        palette: MONOCHROME,
        busy_active_high: false,
        reset: ResetTiming {
            high_ms: 1,
            low_ms: 1,
            settle_ms: 1,
        },
        init: &INIT,
        power_on: CommandStep::wait(POWER_ON, &[], 100),
        transfer: PlaneTransfer::Planar(&PLANE),
        refresh: CommandStep::wait(DISPLAY_REFRESH, &[], 5_000),
        power_off: CommandStep::wait(POWER_OFF, &[], 100),
        deep_sleep: CommandStep::new(DEEP_SLEEP, &[0xA5]),
    };

    struct SimClock {
        now_ms: u64,
    }

    impl DelayNs for SimClock {
        fn delay_ns(&mut self, ns: u32) {
            self.now_ms += u64::from(ns / 1_000_000);
        }
        fn delay_ms(&mut self, ms: u32) {
            self.now_ms += u64::from(ms);
        }
    }

    struct MockPlatform {
        cause: WakeCause,
        release_at_ms: u64,
        clock: SimClock,
        wall_clock: bool,
        retained: [u8; RETAINED_LEN],
        timer_failures: u32,
        timers: Vec<u64>,
        fail_arm_buttons: bool,
        buttons_armed: bool,
        watchdog_feeds: u32,
        slept: bool,
    }

    impl MockPlatform {
        fn new(cause: WakeCause) -> Self {
            Self {
                cause,
                release_at_ms: 0,
                clock: SimClock { now_ms: 0 },
                wall_clock: false,
                retained: [0; RETAINED_LEN],
                timer_failures: 0,
                timers: Vec::new(),
                fail_arm_buttons: false,
                buttons_armed: false,
                watchdog_feeds: 0,
                slept: false,
            }
        }

        fn with_retained(mut self, state: RetainedState) -> Self {
            self.retained = state.encode();
            self
        }

        fn retained_state(&self) -> RetainedState {
            RetainedState::decode_or_default(&self.retained)
        }
    }

    impl Platform for MockPlatform {
        type Delay = SimClock;

        fn wake_cause(&mut self) -> WakeCause {
            self.cause
        }

        fn is_pressed(&mut self, _button: Button) -> bool {
            self.clock.now_ms < self.release_at_ms
        }

        fn uptime_ms(&self) -> u64 {
            self.clock.now_ms
        }

        fn wall_clock_ms(&self) -> Option<u64> {
            self.wall_clock.then_some(WALL_BASE + self.clock.now_ms)
        }

        fn delay(&mut self) -> &mut SimClock {
            &mut self.clock
        }

        fn load_retained(&mut self) -> [u8; RETAINED_LEN] {
            self.retained
        }

        fn store_retained(&mut self, block: &[u8; RETAINED_LEN]) {
            self.retained = *block;
        }

        fn feed_watchdog(&mut self) {
            self.watchdog_feeds += 1;
        }

        fn arm_timer(&mut self, sleep_ms: u64) -> Result<(), ArmError> {
            self.timers.push(sleep_ms);
            if self.timer_failures > 0 {
                self.timer_failures -= 1;
                return Err(ArmError);
            }
            Ok(())
        }

        fn arm_buttons(&mut self) -> Result<(), ArmError> {
            if self.fail_arm_buttons {
                return Err(ArmError);
            }
            self.buttons_armed = true;
            Ok(())
        }

        fn deep_sleep(&mut self) {
            self.slept = true;
        }
    }

    #[derive(Default)]
    struct PanelBus {
        commands: Vec<u8>,
        fail_command: Option<u8>,
    }

    impl DisplayInterface for PanelBus {
        type Error = FaultReason;

        fn send_command(&mut self, command: u8) -> Result<(), Self::Error> {
            self.commands.push(command);
            if self.fail_command == Some(command) {
                return Err(FaultReason::Bus);
            }
            Ok(())
        }

        fn send_data(&mut self, _data: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn reset<D: DelayNs>(
            &mut self,
            _delay: &mut D,
            _timing: &ResetTiming,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn busy_wait<D: DelayNs>(
            &mut self,
            _delay: &mut D,
            _timeout_ms: u32,
        ) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    struct MockNetwork {
        connect_result: Result<(), IoError>,
        body: Vec<u8>,
        fetched: Vec<String>,
        connects: u32,
        disconnects: u32,
    }

    impl MockNetwork {
        fn serving(body: Vec<u8>) -> Self {
            Self {
                connect_result: Ok(()),
                body,
                fetched: Vec::new(),
                connects: 0,
                disconnects: 0,
            }
        }
    }

    impl Network for MockNetwork {
        type Stream<'a> = SliceStream<'a>;

        fn connect(&mut self, _settings: &Settings, _timeout_ms: u32) -> Result<(), IoError> {
            self.connects += 1;
            self.connect_result
        }

        fn fetch<'a>(
            &'a mut self,
            url: &str,
            _reading: &SensorReading,
        ) -> Result<SliceStream<'a>, IoError> {
            self.fetched.push(url.to_string());
            Ok(SliceStream::new(&self.body))
        }

        fn disconnect(&mut self) {
            self.disconnects += 1;
        }

        fn rssi(&self) -> Option<i8> {
            Some(-58)
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        settings: Option<Settings>,
    }

    impl ConfigStore for MemoryStore {
        fn get(&mut self) -> Result<Settings, ConfigError> {
            self.settings.clone().ok_or(ConfigError::Missing)
        }

        fn set(&mut self, settings: &Settings) -> Result<(), ConfigError> {
            self.settings = Some(settings.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockPortal {
        submit: Option<Settings>,
        sessions: u32,
        exits: u32,
    }

    impl Provisioning for MockPortal {
        fn enter<S: ConfigStore + ?Sized>(
            &mut self,
            store: &mut S,
            _timeout_ms: u32,
        ) -> ProvisioningOutcome {
            self.sessions += 1;
            match self.submit.take() {
                Some(settings) => match store.set(&settings) {
                    Ok(()) => ProvisioningOutcome::Saved,
                    Err(_) => ProvisioningOutcome::Aborted,
                },
                None => ProvisioningOutcome::TimedOut,
            }
        }

        fn exit(&mut self) {
            self.exits += 1;
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<CycleStatus>,
        fail: bool,
    }

    impl ReportSink for RecordingSink {
        fn send(&mut self, _reading: &SensorReading, status: &CycleStatus) -> Result<(), IoError> {
            self.sent.push(*status);
            if self.fail {
                return Err(IoError::Closed);
            }
            Ok(())
        }
    }

    type TestScheduler = WakeScheduler<
        MockPlatform,
        PanelBus,
        NoSensor,
        NoSensor,
        MockNetwork,
        MemoryStore,
        MockPortal,
        RecordingSink,
    >;

    fn settings() -> Settings {
        Settings {
            wifi_ssid: "frame".to_string(),
            wifi_psk: String::new(),
            page_urls: vec![
                "http://server/a.png".to_string(),
                "http://server/b.png".to_string(),
            ],
            wake_interval_s: 900,
        }
    }

    fn white_png() -> Vec<u8> {
        let mut scanlines = Vec::new();
        for _ in 0..2 {
            scanlines.push(0);
            scanlines.extend_from_slice(&[0xFF; 16]);
        }
        build_png(16, 2, 8, 0, &[], &scanlines)
    }

    fn scheduler(platform: MockPlatform, network: MockNetwork, store: MemoryStore) -> TestScheduler {
        WakeScheduler::new(
            CycleConfig::default(),
            platform,
            PanelDriver::with_spec(PanelBus::default(), &PANEL),
            SensorSampler::new(NoSensor, NoSensor),
            network,
            store,
            MockPortal::default(),
            RecordingSink::default(),
        )
        .unwrap()
    }

    fn configured() -> MemoryStore {
        MemoryStore {
            settings: Some(settings()),
        }
    }

    #[test]
    fn test_timer_wake_refreshes_and_sleeps() {
        let platform = MockPlatform::new(WakeCause::Timer).with_retained(RetainedState {
            cycle: 4,
            page: 1,
            last_refresh_ms: None,
        });
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert_eq!(report.mode, Mode::Normal);
        assert_eq!(report.context.reason, WakeReason::TimerExpired);
        assert_eq!(report.context.cycle, 5);
        assert_eq!(report.status.fetch, FetchStatus::Rendered);
        assert_eq!(report.status.panel, PanelStatus::Refreshed);
        assert_eq!(report.status.rssi, Some(-58));
        assert_eq!(report.sleep_ms, 900_000);
        assert!(report.buttons_armed);

        assert_eq!(scheduler.network().fetched, ["http://server/b.png"]);
        assert_eq!(scheduler.network().disconnects, 1);
        assert_eq!(scheduler.sink().sent.len(), 1);
        assert_eq!(
            scheduler
                .panel()
                .interface()
                .commands
                .iter()
                .filter(|&&c| c == DISPLAY_REFRESH)
                .count(),
            1
        );

        let platform = scheduler.platform();
        assert!(platform.slept);
        assert!(platform.buttons_armed);
        assert_eq!(platform.timers, [900_000]);
        assert!(platform.watchdog_feeds > 0);
        assert_eq!(
            platform.retained_state(),
            RetainedState {
                cycle: 5,
                page: 1,
                last_refresh_ms: None,
            }
        );
    }

    #[test]
    fn test_connect_failure_still_reports_and_sleeps() {
        let mut network = MockNetwork::serving(white_png());
        network.connect_result = Err(IoError::Timeout);
        let mut scheduler = scheduler(MockPlatform::new(WakeCause::Timer), network, configured());

        let report = scheduler.run_cycle();
        assert_eq!(
            report.status.fetch,
            FetchStatus::Failed(FetchFailure::ConnectFailed(IoError::Timeout))
        );
        assert_eq!(report.status.panel, PanelStatus::NotAttempted);
        assert!(scheduler.network().fetched.is_empty());
        assert_eq!(scheduler.network().disconnects, 0);
        assert_eq!(scheduler.sink().sent.len(), 1);
        assert!(scheduler.platform().slept);
        assert!(scheduler.panel().interface().commands.is_empty());
    }

    #[test]
    fn test_refresh_hold_enters_provisioning_without_fetch() {
        let mut platform = MockPlatform::new(WakeCause::Button(Button::Refresh));
        platform.release_at_ms = 45_000;
        let mut scheduler = scheduler(
            platform,
            MockNetwork::serving(white_png()),
            MemoryStore::default(),
        );

        let report = scheduler.run_cycle();
        assert_eq!(report.context.reason, WakeReason::ButtonRefreshLong);
        assert_eq!(report.mode, Mode::Provisioning);
        assert_eq!(report.provisioning, Some(ProvisioningOutcome::TimedOut));
        assert_eq!(report.status.fetch, FetchStatus::Skipped);
        assert_eq!(scheduler.provisioning().sessions, 1);
        assert_eq!(scheduler.provisioning().exits, 1);
        assert_eq!(scheduler.network().connects, 0);
        assert_eq!(scheduler.sink().sent.len(), 1);

        // Hold polling stops at the provisioning threshold
        assert_eq!(scheduler.platform().uptime_ms(), 30_000);
        assert_eq!(scheduler.platform().timers, [3_570_000]);
        assert!(scheduler.platform().slept);
    }

    #[test]
    fn test_short_refresh_press_refreshes_current_page() {
        let mut platform = MockPlatform::new(WakeCause::Button(Button::Refresh));
        platform.release_at_ms = 300;
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert_eq!(report.context.reason, WakeReason::ButtonRefreshShort);
        assert_eq!(report.mode, Mode::Normal);
        assert_eq!(report.status.panel, PanelStatus::Refreshed);
        assert_eq!(scheduler.network().fetched, ["http://server/a.png"]);
        // 300 ms awake already
        assert_eq!(report.sleep_ms, 899_700);
    }

    #[test]
    fn test_cold_boot_provisioning_saves_without_refresh() {
        let mut scheduler = scheduler(
            MockPlatform::new(WakeCause::PowerOn),
            MockNetwork::serving(white_png()),
            MemoryStore::default(),
        );
        scheduler.provisioning.submit = Some(settings());

        let report = scheduler.run_cycle();
        assert_eq!(report.mode, Mode::Provisioning);
        assert_eq!(report.provisioning, Some(ProvisioningOutcome::Saved));
        assert_eq!(report.status.fetch, FetchStatus::Skipped);
        assert_eq!(report.status.panel, PanelStatus::NotAttempted);
        assert_eq!(scheduler.store().settings, Some(settings()));
        assert_eq!(scheduler.network().connects, 0);
        assert!(scheduler.panel().interface().commands.is_empty());
        // The saved interval already applies to the next wake
        assert_eq!(report.sleep_ms, 900_000);
        assert!(scheduler.platform().slept);
    }

    #[test]
    fn test_cold_boot_with_valid_settings_does_not_fetch() {
        let mut scheduler = scheduler(
            MockPlatform::new(WakeCause::PowerOn),
            MockNetwork::serving(white_png()),
            configured(),
        );

        let report = scheduler.run_cycle();
        assert_eq!(report.context.reason, WakeReason::ColdBoot);
        assert_eq!(report.mode, Mode::Provisioning);
        assert_eq!(report.provisioning, Some(ProvisioningOutcome::TimedOut));
        assert_eq!(report.status.fetch, FetchStatus::Skipped);
        assert_eq!(scheduler.network().connects, 0);
        assert!(scheduler.network().fetched.is_empty());
        assert!(scheduler.panel().interface().commands.is_empty());
        assert_eq!(scheduler.sink().sent.len(), 1);
        assert_eq!(scheduler.platform().timers, [900_000]);
        assert!(scheduler.platform().slept);
    }

    #[test]
    fn test_refresh_hold_with_valid_settings_does_not_fetch() {
        let mut platform = MockPlatform::new(WakeCause::Button(Button::Refresh));
        platform.release_at_ms = 45_000;
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert_eq!(report.context.reason, WakeReason::ButtonRefreshLong);
        assert_eq!(report.mode, Mode::Provisioning);
        assert_eq!(report.provisioning, Some(ProvisioningOutcome::TimedOut));
        assert_eq!(report.status.fetch, FetchStatus::Skipped);
        assert_eq!(report.status.panel, PanelStatus::NotAttempted);
        assert_eq!(scheduler.network().connects, 0);
        assert!(scheduler.network().fetched.is_empty());
        assert!(scheduler.panel().interface().commands.is_empty());
        assert_eq!(scheduler.sink().sent.len(), 1);
        assert_eq!(report.sleep_ms, 870_000);
        assert!(scheduler.platform().slept);
    }

    #[test]
    fn test_page_change_skips_network() {
        let mut platform = MockPlatform::new(WakeCause::Button(Button::Left));
        platform.release_at_ms = 100;
        platform.wall_clock = true;
        let platform = platform.with_retained(RetainedState {
            cycle: 9,
            page: 0,
            last_refresh_ms: Some(WALL_BASE - 300_000),
        });
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert_eq!(report.context.reason, WakeReason::ButtonLeftShort);
        assert_eq!(report.context.page, 1);
        assert_eq!(report.status.fetch, FetchStatus::Skipped);
        assert_eq!(scheduler.network().connects, 0);
        assert_eq!(scheduler.sink().sent.len(), 1);
        // Next wake stays anchored to the last refresh
        assert_eq!(report.sleep_ms, 600_000 - 100);
        assert_eq!(scheduler.platform().retained_state().page, 1);
        assert_eq!(
            scheduler.platform().retained_state().last_refresh_ms,
            Some(WALL_BASE - 300_000)
        );
    }

    #[test]
    fn test_long_page_jump_skips_network() {
        let mut platform = MockPlatform::new(WakeCause::Button(Button::Right));
        platform.release_at_ms = 5_000;
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert_eq!(report.context.reason, WakeReason::ButtonRightLong);
        assert_eq!(report.context.page, 1);
        assert_eq!(report.status.fetch, FetchStatus::Skipped);
        assert_eq!(scheduler.network().connects, 0);
        assert!(scheduler.panel().interface().commands.is_empty());
        // Polling stops at the long-press threshold
        assert_eq!(report.sleep_ms, 898_000);
        assert_eq!(scheduler.platform().retained_state().page, 1);
    }

    #[test]
    fn test_watchdog_recovery_powers_panel_off_first() {
        let mut scheduler = scheduler(
            MockPlatform::new(WakeCause::Watchdog),
            MockNetwork::serving(white_png()),
            configured(),
        );

        let report = scheduler.run_cycle();
        assert_eq!(report.context.reason, WakeReason::WatchdogRecovery);
        assert_eq!(report.status.panel, PanelStatus::Refreshed);
        let commands = &scheduler.panel().interface().commands;
        assert_eq!(&commands[..3], &[POWER_OFF, DEEP_SLEEP, PANEL_SETTING]);
    }

    #[test]
    fn test_panel_fault_is_reported() {
        let mut scheduler = scheduler(
            MockPlatform::new(WakeCause::Timer),
            MockNetwork::serving(white_png()),
            configured(),
        );
        scheduler.panel = PanelDriver::with_spec(
            PanelBus {
                commands: Vec::new(),
                fail_command: Some(DISPLAY_REFRESH),
            },
            &PANEL,
        );

        let report = scheduler.run_cycle();
        assert_eq!(report.status.fetch, FetchStatus::Rendered);
        assert_eq!(
            report.status.panel,
            PanelStatus::Faulted(crate::error::PanelError::new(
                PanelStage::TriggerRefresh,
                FaultReason::Bus
            ))
        );
        assert_eq!(scheduler.platform().retained_state().last_refresh_ms, None);
        assert!(scheduler.platform().slept);
    }

    #[test]
    fn test_garbage_body_is_decode_failure() {
        let mut scheduler = scheduler(
            MockPlatform::new(WakeCause::Timer),
            MockNetwork::serving(b"<html>oops</html>".to_vec()),
            configured(),
        );
        scheduler.sink.fail = true;

        let report = scheduler.run_cycle();
        assert_eq!(
            report.status.fetch,
            FetchStatus::Failed(FetchFailure::Decode(DecodeError::BadSignature))
        );
        assert_eq!(report.status.panel, PanelStatus::NotAttempted);
        assert_eq!(scheduler.network().disconnects, 1);
        assert!(scheduler.platform().slept);
    }

    #[test]
    fn test_timer_arm_failure_falls_back() {
        let mut platform = MockPlatform::new(WakeCause::Timer);
        platform.timer_failures = 1;
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert_eq!(scheduler.platform().timers, [900_000, 3_600_000]);
        assert_eq!(report.sleep_ms, 3_600_000);
        assert!(scheduler.platform().slept);
    }

    #[test]
    fn test_button_arm_failure_still_arms_timer() {
        let mut platform = MockPlatform::new(WakeCause::Timer);
        platform.fail_arm_buttons = true;
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert!(!report.buttons_armed);
        assert_eq!(report.sleep_ms, 900_000);
        let platform = scheduler.platform();
        assert!(!platform.buttons_armed);
        assert_eq!(platform.timers, [900_000]);
        assert!(platform.slept);
    }

    #[test]
    fn test_wall_clock_refresh_anchors_next_wake() {
        let mut platform = MockPlatform::new(WakeCause::Timer);
        platform.wall_clock = true;
        let mut scheduler = scheduler(platform, MockNetwork::serving(white_png()), configured());

        let report = scheduler.run_cycle();
        assert_eq!(report.sleep_ms, 900_000);
        assert_eq!(
            scheduler.platform().retained_state().last_refresh_ms,
            Some(WALL_BASE)
        );
    }

    #[test]
    fn test_rejects_watchdog_shorter_than_refresh() {
        let config = Builder::new().watchdog_timeout_ms(1_000).build().unwrap();
        let result = WakeScheduler::new(
            config,
            MockPlatform::new(WakeCause::Timer),
            PanelDriver::with_spec(PanelBus::default(), &PANEL),
            SensorSampler::new(NoSensor, NoSensor),
            MockNetwork::serving(Vec::new()),
            configured(),
            MockPortal::default(),
            RecordingSink::default(),
        );
        assert!(matches!(
            result,
            Err(BuilderError::WatchdogBudget {
                watchdog_ms: 1_000,
                refresh_budget_ms: 5_203,
            })
        ));
    }

    #[test]
    fn test_select_mode() {
        assert_eq!(select_mode(WakeReason::ColdBoot, true), Mode::Provisioning);
        assert_eq!(
            select_mode(WakeReason::ButtonRefreshLong, true),
            Mode::Provisioning
        );
        assert_eq!(select_mode(WakeReason::TimerExpired, false), Mode::Provisioning);
        assert_eq!(select_mode(WakeReason::ButtonRightShort, true), Mode::Normal);
    }

    #[test]
    fn test_next_sleep_ms() {
        // Uptime subtracted, floor applied
        assert_eq!(next_sleep_ms(900_000, 30_000, None, None, 12_000), 888_000);
        assert_eq!(next_sleep_ms(60_000, 30_000, None, None, 45_000), 30_000);
        // Anchored to the last refresh
        assert_eq!(
            next_sleep_ms(900_000, 30_000, Some(1_000_000), Some(700_000), 0),
            600_000
        );
        // Overdue refresh still sleeps the minimum
        assert_eq!(
            next_sleep_ms(900_000, 30_000, Some(5_000_000), Some(700_000), 0),
            30_000
        );
        // Clock jumped backwards
        assert_eq!(
            next_sleep_ms(900_000, 30_000, Some(100_000), Some(700_000), 0),
            900_000
        );
    }
}
