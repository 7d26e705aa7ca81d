//! Safety watchdog: latched faults and the status LEDs.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Instant, Ticker};

use crate::config::{TrackerConfig, MANUAL_BLINK_PERIOD, STALL_CHECK_INTERVAL, STALL_EPSILON_DEG, WATCHDOG_PERIOD};
use crate::error::Result;
use crate::hal::{LoadReading, LoadSense, OutputGroup, StatusLeds};
use crate::state::{Angle, FaultReason, FaultState, MotorState, SensorFault, StatusIndicator};
use crate::supervisor::Tracker;

/// Fault state. Latched by the watchdog, cleared only by an operator reset.
pub struct FaultLatch {
    state: Mutex<CriticalSectionRawMutex, Cell<FaultState>>,
}

impl FaultLatch {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(FaultState::Ok)),
        }
    }

    pub fn get(&self) -> FaultState {
        self.state.lock(Cell::get)
    }

    /// Latches `reason` unless a fault is already latched; the first reason wins.
    /// Returns whether this call latched.
    pub fn latch(&self, reason: FaultReason) -> bool {
        let latched = self.state.lock(|cell| {
            if cell.get().is_latched() {
                return false;
            }
            cell.set(FaultState::Latched(reason));
            true
        });
        if latched {
            error!("fault latched: {}", reason);
        }
        latched
    }

    /// Clears the latch, returning the reason that was latched.
    pub fn reset(&self) -> Option<FaultReason> {
        let previous = self.state.lock(|cell| cell.replace(FaultState::Ok));
        match previous {
            FaultState::Latched(reason) => {
                info!("fault cleared by operator: {}", reason.label());
                Some(reason)
            }
            FaultState::Ok => None,
        }
    }
}

impl Default for FaultLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct StallAnchor {
    /// `start_timestamp` of the activation this anchor belongs to.
    activation: Instant,
    at: Instant,
    angle: Angle,
}

/// Detects a motor that is energized but not moving.
#[derive(Debug, Default)]
pub struct StallMonitor {
    anchor: Option<StallAnchor>,
}

impl StallMonitor {
    pub const fn new() -> Self {
        Self { anchor: None }
    }

    pub fn check(&mut self, now: Instant, motor: MotorState, current: Option<Angle>) -> Option<FaultReason> {
        let Some(start) = motor.drive_start() else {
            self.anchor = None;
            return None;
        };

        let mut anchor = match self.anchor {
            Some(anchor) if anchor.activation == start.at => anchor,
            _ => StallAnchor {
                activation: start.at,
                at: start.at,
                angle: start.angle,
            },
        };

        let mut fault = None;
        if let Some(angle) = current {
            if now.saturating_duration_since(anchor.at) >= STALL_CHECK_INTERVAL {
                if angle.distance_to(anchor.angle) < STALL_EPSILON_DEG {
                    fault = Some(FaultReason::Stall { angle });
                } else {
                    anchor.at = now;
                    anchor.angle = angle;
                }
            }
        }
        self.anchor = Some(anchor);
        fault
    }
}

pub struct Watchdog {
    overload_threshold: f32,
    stall: StallMonitor,
}

impl Watchdog {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            overload_threshold: config.overload_threshold,
            stall: StallMonitor::new(),
        }
    }

    pub fn check_load(&self, reading: Result<LoadReading>, angle: Option<Angle>) -> Option<FaultReason> {
        let reading = match reading {
            Ok(reading) => reading,
            Err(err) => {
                warn!("load sense: {}", err);
                return Some(FaultReason::Sensor(SensorFault::LoadSense));
            }
        };
        if reading.channel0 > self.overload_threshold || reading.channel1 > self.overload_threshold {
            return Some(FaultReason::Overload {
                load: reading.max(),
                angle,
            });
        }
        if reading.channel0 == 0.0 && reading.channel1 == 0.0 {
            return Some(FaultReason::Sensor(SensorFault::ZeroLoad));
        }
        None
    }

    /// One watchdog cycle against the tracker's current state.
    ///
    /// Any detected fault is latched and the motor controller is asked to act at
    /// once. Returns the first fault detected this cycle.
    pub fn step(&mut self, tracker: &Tracker, now: Instant, reading: Result<LoadReading>) -> Option<FaultReason> {
        let position = tracker.position();
        let accel = tracker
            .take_sensor_error()
            .map(|_| FaultReason::Sensor(SensorFault::Accelerometer));
        let load = self.check_load(reading, position);
        let stall = self.stall.check(now, tracker.motor(), position);

        let detected = accel.or(load).or(stall);
        for reason in [accel, load, stall].into_iter().flatten() {
            tracker.fault().latch(reason);
        }
        if detected.is_some() {
            tracker.request_stop();
        }
        detected
    }

    /// `(ok, fault)` LED levels for this instant.
    pub fn indicator(&self, tracker: &Tracker, now: Instant) -> (bool, bool) {
        let mode = tracker.target().get().mode;
        StatusIndicator::derive(tracker.fault().get(), mode).channels(blink_phase(now))
    }
}

fn blink_phase(now: Instant) -> bool {
    (now.as_millis() / MANUAL_BLINK_PERIOD.as_millis()) % 2 == 0
}

/// Watchdog loop. Owns the load-sense ADC and the status LEDs.
pub async fn run<S: LoadSense, D: StatusLeds>(tracker: &Tracker, load: &mut S, leds: &OutputGroup<D>) {
    let mut watchdog = Watchdog::new(tracker.config());
    let mut ticker = Ticker::every(WATCHDOG_PERIOD);

    while !tracker.is_shutting_down() {
        let reading = load.read().await;
        let now = Instant::now();
        watchdog.step(tracker, now, reading);
        let (ok, fault) = watchdog.indicator(tracker, now);
        leds.with(|leds| leds.show(ok, fault));
        ticker.next().await;
    }
    debug!("watchdog stopped");
}
