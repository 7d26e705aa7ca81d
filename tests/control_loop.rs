//! Cross-module behaviour of the control core, driven through the public API.

use core::cell::Cell;

use embassy_futures::block_on;
use embassy_futures::join::{join, join3};
use embassy_time::{Duration, Instant, Timer};
use time::{Date, Month};

use solar_tracker::clock::{date_start, UnixSeconds};
use solar_tracker::config::{Location, TrackerConfig, CONTROL_PERIOD, STARTUP_DELAY, WATCHDOG_PERIOD};
use solar_tracker::estimator::{self, PositionEstimator};
use solar_tracker::hal::{
    AccelTransport, Ephemeris, LoadReading, LoadSense, MotorLines, OutputGroup, Outputs, Reply, StatusLeds, SunTimes,
};
use solar_tracker::motor::{self, MotorController};
use solar_tracker::scheduler::{self, Phase, Scheduler};
use solar_tracker::shutdown;
use solar_tracker::state::{Angle, Direction, FaultReason, FaultState, MotorState, SensorFault, TargetMode};
use solar_tracker::watchdog::{self, Watchdog};
use solar_tracker::{Error, Tracker};

#[derive(Debug, Default)]
struct Lines {
    left: bool,
    right: bool,
    overlapped: bool,
}

impl Outputs for Lines {
    fn deactivate_all(&mut self) {
        self.left = false;
        self.right = false;
    }
}

impl MotorLines for Lines {
    fn set_line(&mut self, line: Direction, active: bool) {
        match line {
            Direction::Left => self.left = active,
            Direction::Right => self.right = active,
        }
        self.overlapped |= self.left && self.right;
    }
}

#[derive(Debug, Default)]
struct Leds {
    ok: bool,
    fault: bool,
}

impl Outputs for Leds {
    fn deactivate_all(&mut self) {
        self.ok = false;
        self.fault = false;
    }
}

impl StatusLeds for Leds {
    fn show(&mut self, ok: bool, fault: bool) {
        self.ok = ok;
        self.fault = fault;
    }
}

/// Sunrise 06:00 UTC, sunset 16:00 UTC (36 000 s of daylight).
struct TenHourDays;

impl Ephemeris for TenHourDays {
    fn sun_times(&self, _location: Location, date: Date) -> solar_tracker::Result<SunTimes> {
        let midnight = date_start(date).as_i64();
        Ok(SunTimes {
            sunrise: UnixSeconds(midnight + 6 * 3600),
            sunset: UnixSeconds(midnight + 16 * 3600),
        })
    }
}

/// Nominal (1.0, 1.0) until `overloaded` is set, then (4.5, 1.0).
struct SwitchedLoad<'a> {
    overloaded: &'a Cell<bool>,
}

impl LoadSense for SwitchedLoad<'_> {
    async fn read(&mut self) -> solar_tracker::Result<LoadReading> {
        let channel0 = if self.overloaded.get() { 4.5 } else { 1.0 };
        Ok(LoadReading { channel0, channel1: 1.0 })
    }
}

/// Accelerometer that always answers with a truncated frame.
struct TruncatedReplies;

impl AccelTransport for TruncatedReplies {
    async fn transfer(&mut self, _request: &[u8]) -> solar_tracker::Result<Reply> {
        Ok(Reply::from_slice(&[0xF2, 0x10]).unwrap())
    }
}

/// Polls `done` every millisecond; false if it is still unmet after `limit`.
async fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > limit {
            return false;
        }
        Timer::after_millis(1).await;
    }
    true
}

fn installed<T: Outputs + Default>() -> OutputGroup<T> {
    let group = OutputGroup::new();
    group.install(T::default());
    group
}

fn current_step(tracker: &Tracker, motor: &mut MotorController<'_, Lines>, now: Instant) -> MotorState {
    let state = motor.step(now, tracker.position(), tracker.target().get().target, tracker.fault().get());
    tracker.publish_motor(state);
    state
}

#[test]
fn overload_stops_the_motor_within_the_same_cycle() {
    let tracker = Tracker::default();
    let lines = installed::<Lines>();
    let mut motor = MotorController::new(&lines, tracker.config());
    let mut watchdog = Watchdog::new(tracker.config());

    tracker.publish_position(Angle::clamped(-30.0, 62));
    let t0 = Instant::from_secs(10);
    assert!(current_step(&tracker, &mut motor, t0).is_active());

    // Watchdog cycle sees (4.5, 1.0); the stop request makes the controller act at once.
    let now = t0 + Duration::from_millis(100);
    let fault = watchdog.step(&tracker, now, Ok(LoadReading { channel0: 4.5, channel1: 1.0 }));
    assert!(matches!(fault, Some(FaultReason::Overload { load, angle: Some(_) }) if load == 4.5));
    assert_eq!(current_step(&tracker, &mut motor, now), MotorState::Idle);
    assert_eq!(lines.with(|lines| (lines.left, lines.right)), Some((false, false)));
    assert!(!tracker.status().motor_active);

    // Nominal readings afterwards do not clear the latch or restart the motor.
    for tick in 1..20 {
        let now = now + Duration::from_millis(200 * tick);
        assert_eq!(watchdog.step(&tracker, now, Ok(LoadReading { channel0: 1.0, channel1: 1.0 })), None);
        assert_eq!(current_step(&tracker, &mut motor, now), MotorState::Idle);
    }
    assert!(tracker.fault().get().is_latched());
}

#[test]
fn malformed_accelerometer_reply_blocks_motor_starts() {
    let tracker = Tracker::default();
    let lines = installed::<Lines>();
    let mut motor = MotorController::new(&lines, tracker.config());
    let mut watchdog = Watchdog::new(tracker.config());
    let mut estimator = PositionEstimator::new(tracker.config());

    let good = [0xF2, 0x00, 0x00, 0, 0, 0, 0];
    tracker.publish_position(estimator.ingest(&good).unwrap());

    let err = estimator.ingest(&[0xF2, 0x10]).unwrap_err();
    assert_eq!(err, Error::MalformedReply { len: 2 });
    tracker.report_sensor_error(err);
    watchdog.step(&tracker, Instant::from_secs(1), Ok(LoadReading { channel0: 1.0, channel1: 1.0 }));
    assert_eq!(
        tracker.fault().get(),
        FaultState::Latched(FaultReason::Sensor(SensorFault::Accelerometer))
    );

    tracker.target().set_manual_mode();
    tracker.target().set_manual_position(30).unwrap();
    assert_eq!(current_step(&tracker, &mut motor, Instant::from_secs(2)), MotorState::Idle);
    assert!(motor.cooldown_until().is_some());

    tracker.fault().reset();
    let after_cooldown = Instant::from_secs(2 + 61);
    assert_eq!(
        current_step(&tracker, &mut motor, after_cooldown).direction(),
        Some(Direction::Right)
    );
    assert!(!lines.with(|lines| lines.overlapped).unwrap());
}

#[test]
fn auto_schedule_sweeps_the_full_range() {
    let config = TrackerConfig { utc_offset_minutes: 0, ..TrackerConfig::DEFAULT };
    let tracker = Tracker::new(config);
    let mut scheduler = Scheduler::new(tracker.config(), TenHourDays);
    let day = Date::from_calendar_date(2024, Month::May, 10).unwrap();
    let sunrise = date_start(day).as_i64() + 6 * 3600;

    for (elapsed, expected) in [(0, -62.0), (18_000, 0.0), (36_000, 62.0)] {
        let plan = scheduler.plan(UnixSeconds(sunrise + elapsed), tracker.location()).unwrap();
        assert_eq!(plan.phase, Phase::Daylight);
        tracker.target().apply_auto(plan.target, plan.day);
        assert_eq!(tracker.target().get().target.degrees(), expected);
    }
    assert_eq!(tracker.status().day, Some(day));

    // Operator setpoints are refused while the schedule owns the target.
    assert_eq!(tracker.target().set_manual_position(5), Err(Error::NotInManualMode));
    assert_eq!(tracker.target().get().target.degrees(), 62.0);
}

#[test]
fn shutdown_drains_a_running_motor_loop() {
    let tracker = Tracker::default();
    let lines = installed::<Lines>();
    let leds = installed::<Leds>();

    tracker.publish_position(Angle::clamped(-20.0, 62));
    tracker.target().set_manual_mode();
    tracker.target().set_manual_position(10).unwrap();

    let control = motor::run(&tracker, &lines);
    let operator = async {
        // Past the start-up delay and at least one control cycle.
        Timer::after(Duration::from_millis(1_500)).await;
        let was_driving = tracker.motor().is_active();
        let parked = shutdown::drain(&tracker, &lines, &leds).await;
        (was_driving, parked)
    };

    let ((), (was_driving, (parked_lines, parked_leds))) = block_on(join(control, operator));

    assert!(was_driving);
    assert!(tracker.is_shutting_down());
    assert_eq!(tracker.motor(), MotorState::Idle);
    let parked_lines = parked_lines.unwrap();
    assert!(!parked_lines.left && !parked_lines.right && !parked_lines.overlapped);
    assert!(parked_leds.is_some());
    assert!(lines.is_released() && leds.is_released());
}

#[test]
fn watchdog_overload_wakes_the_running_motor_loop() {
    let tracker = Tracker::default();
    let lines = installed::<Lines>();
    let leds = installed::<Leds>();
    let overloaded = Cell::new(false);
    let mut load = SwitchedLoad { overloaded: &overloaded };

    tracker.publish_position(Angle::clamped(-20.0, 62));
    tracker.target().set_manual_mode();
    tracker.target().set_manual_position(10).unwrap();

    let energized = || lines.with(|lines| lines.left || lines.right).unwrap_or(false);
    let operator = async {
        assert!(wait_until(STARTUP_DELAY + CONTROL_PERIOD * 2, energized).await);
        assert!(!tracker.fault().get().is_latched());

        overloaded.set(true);
        let overloaded_at = Instant::now();
        assert!(wait_until(WATCHDOG_PERIOD * 3, || tracker.fault().get().is_latched()).await);
        let latched_at = Instant::now();
        assert!(wait_until(CONTROL_PERIOD, || !energized()).await);
        let stopped_at = Instant::now();

        // Stopped by the watchdog's request, not by the motor loop's own next tick.
        assert!(stopped_at - latched_at < Duration::from_millis(50));
        assert!(stopped_at - overloaded_at <= WATCHDOG_PERIOD + Duration::from_millis(50));

        // Overload persists; several control cycles later nothing has restarted.
        Timer::after(CONTROL_PERIOD * 3).await;
        let still_off = !energized();
        let fault = tracker.fault().get();
        tracker.begin_shutdown();
        (still_off, fault)
    };

    let ((), (), (still_off, fault)) = block_on(join3(
        motor::run(&tracker, &lines),
        watchdog::run(&tracker, &mut load, &leds),
        operator,
    ));

    assert!(still_off);
    assert!(matches!(
        fault,
        FaultState::Latched(FaultReason::Overload { load, angle: Some(_) }) if load == 4.5
    ));
    assert_eq!(tracker.motor(), MotorState::Idle);
}

#[test]
fn truncated_accelerometer_replies_latch_a_sensor_fault() {
    let tracker = Tracker::default();
    let leds = installed::<Leds>();
    let overloaded = Cell::new(false);
    let mut load = SwitchedLoad { overloaded: &overloaded };
    let mut accel = TruncatedReplies;

    let operator = async {
        let latched = wait_until(WATCHDOG_PERIOD * 5, || tracker.fault().get().is_latched()).await;
        tracker.begin_shutdown();
        latched
    };

    let ((), (), latched) = block_on(join3(
        estimator::run(&tracker, &mut accel),
        watchdog::run(&tracker, &mut load, &leds),
        operator,
    ));

    assert!(latched);
    assert_eq!(
        tracker.fault().get(),
        FaultState::Latched(FaultReason::Sensor(SensorFault::Accelerometer))
    );
    assert_eq!(tracker.position(), None);
}

#[test]
fn manual_mode_scheduler_tracks_the_day_but_leaves_the_target() {
    let config = TrackerConfig { utc_offset_minutes: 0, ..TrackerConfig::DEFAULT };
    let tracker = Tracker::new(config);
    let day = Date::from_calendar_date(2024, Month::May, 10).unwrap();
    // 12:00 UTC: six hours into a ten-hour day.
    tracker.clock().sync(UnixSeconds(date_start(day).as_i64() + 12 * 3600), Instant::now());
    tracker.target().set_manual_mode();
    tracker.target().set_manual_position(-40).unwrap();

    let operator = async {
        let day_seen = wait_until(STARTUP_DELAY * 2, || tracker.status().day == Some(day)).await;
        let manual = tracker.target().get();

        tracker.target().set_auto_mode();
        let swept = wait_until(Duration::from_millis(500), || tracker.target().get().target.degrees() == 12.0).await;
        tracker.begin_shutdown();
        (day_seen, manual, swept)
    };

    let ((), (day_seen, manual, swept)) = block_on(join(scheduler::run(&tracker, TenHourDays), operator));

    assert!(day_seen);
    assert_eq!(manual.mode, TargetMode::Manual);
    assert_eq!(manual.target.degrees(), -40.0);
    assert!(swept);
    assert_eq!(tracker.target().get().mode, TargetMode::Auto);
}
