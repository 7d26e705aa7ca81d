//! Control supervisor: the shared state every control task reads and writes.
//!
//! One blocking mutex per field set; each field has exactly one writer task.
//! No lock is ever held across an `.await`.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::clock::WallClock;
use crate::config::{Location, TrackerConfig};
use crate::error::Error;
use crate::scheduler::TargetSlot;
use crate::state::{Angle, MotorState, StatusReport, TargetMode};
use crate::watchdog::FaultLatch;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PositionState {
    angle: Option<Angle>,
    /// Accelerometer error not yet seen by the watchdog.
    pending_error: Option<Error>,
}

pub struct Tracker {
    config: TrackerConfig,
    clock: WallClock,
    location: Mutex<CriticalSectionRawMutex, Cell<Location>>,
    position: Mutex<CriticalSectionRawMutex, Cell<PositionState>>,
    target: TargetSlot,
    motor: Mutex<CriticalSectionRawMutex, Cell<MotorState>>,
    fault: FaultLatch,
    stop_request: Signal<CriticalSectionRawMutex, ()>,
    shutdown: AtomicBool,
}

impl Tracker {
    pub const fn new(config: TrackerConfig) -> Self {
        Self {
            clock: WallClock::new(),
            location: Mutex::new(Cell::new(config.location)),
            position: Mutex::new(Cell::new(PositionState {
                angle: None,
                pending_error: None,
            })),
            target: TargetSlot::new(config.position_limit_deg),
            motor: Mutex::new(Cell::new(MotorState::Idle)),
            fault: FaultLatch::new(),
            stop_request: Signal::new(),
            shutdown: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn clock(&self) -> &WallClock {
        &self.clock
    }

    pub fn location(&self) -> Location {
        self.location.lock(Cell::get)
    }

    /// GPS task only.
    pub fn set_location(&self, location: Location) {
        self.location.lock(|cell| cell.set(location));
    }

    // ── position (estimator) ──

    /// Latest smoothed angle; `None` until the first good sample.
    pub fn position(&self) -> Option<Angle> {
        self.position.lock(|cell| cell.get().angle)
    }

    pub fn publish_position(&self, angle: Angle) {
        self.position.lock(|cell| {
            let mut state = cell.get();
            state.angle = Some(angle);
            cell.set(state);
        });
    }

    pub fn report_sensor_error(&self, err: Error) {
        self.position.lock(|cell| {
            let mut state = cell.get();
            state.pending_error = Some(err);
            cell.set(state);
        });
    }

    /// Takes the accelerometer error reported since the last call.
    pub fn take_sensor_error(&self) -> Option<Error> {
        self.position.lock(|cell| {
            let mut state = cell.get();
            let err = state.pending_error.take();
            cell.set(state);
            err
        })
    }

    // ── target (scheduler + operator) ──

    pub fn target(&self) -> &TargetSlot {
        &self.target
    }

    // ── motor (controller) ──

    pub fn motor(&self) -> MotorState {
        self.motor.lock(Cell::get)
    }

    pub fn publish_motor(&self, state: MotorState) {
        self.motor.lock(|cell| cell.set(state));
    }

    // ── fault (watchdog + operator reset) ──

    pub fn fault(&self) -> &FaultLatch {
        &self.fault
    }

    /// Asks the motor controller to run a cycle now.
    pub fn request_stop(&self) {
        self.stop_request.signal(());
    }

    pub async fn stop_requested(&self) {
        self.stop_request.wait().await;
    }

    // ── shutdown ──

    /// Raises the cooperative shutdown flag and wakes sleeping tasks.
    ///
    /// Returns `false` if the flag was already raised.
    pub fn begin_shutdown(&self) -> bool {
        let first = !self.shutdown.swap(true, Ordering::AcqRel);
        if first {
            self.target.wake();
            self.stop_request.signal(());
        }
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn status(&self) -> StatusReport {
        let target = self.target.get();
        StatusReport {
            day: target.day,
            fault: self.fault.get(),
            position: self.position(),
            target: target.target,
            motor_active: self.motor().is_active(),
            auto_position: target.mode == TargetMode::Auto,
        }
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::DEFAULT)
    }
}
