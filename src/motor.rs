//! Bang-bang motor controller.
//!
//! `Idle → Driving{Left,Right} → Idle`. A reversal always spends one control cycle in
//! `Idle` with both lines off, and a start is refused while a fault is latched.

use embassy_futures::select::select;
use embassy_time::{Instant, Timer};

use crate::config::{TrackerConfig, CONTROL_PERIOD, FAULT_COOLDOWN, STARTUP_DELAY};
use crate::hal::{MotorLines, OutputGroup};
use crate::state::{Angle, Direction, DriveStart, FaultState, MotorState};
use crate::supervisor::Tracker;

pub struct MotorController<'a, L> {
    lines: &'a OutputGroup<L>,
    state: MotorState,
    tolerance_deg: f32,
    /// No start is considered before this instant.
    cooldown_until: Option<Instant>,
}

impl<'a, L: MotorLines> MotorController<'a, L> {
    pub fn new(lines: &'a OutputGroup<L>, config: &TrackerConfig) -> Self {
        Self {
            lines,
            state: MotorState::Idle,
            tolerance_deg: config.tolerance_deg,
            cooldown_until: None,
        }
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// One control decision. Returns the state to publish.
    pub fn step(
        &mut self,
        now: Instant,
        current: Option<Angle>,
        target: Angle,
        fault: FaultState,
    ) -> MotorState {
        if fault.is_latched() && self.state.is_active() {
            warn!("motor: fault latched, stopping");
            self.stop(current);
            return self.state;
        }

        let Some(current) = current else {
            if self.state.is_active() {
                self.stop(None);
            }
            return self.state;
        };

        if current.within(target, self.tolerance_deg) {
            if self.state.is_active() {
                self.stop(Some(current));
            }
            return self.state;
        }

        let desired = if current > target {
            Direction::Left
        } else {
            Direction::Right
        };

        match self.state.direction() {
            Some(direction) if direction == desired => {}
            Some(_) => {
                debug!("motor: reversing, idling one cycle");
                self.stop(Some(current));
            }
            None => self.try_start(now, current, desired, fault),
        }
        self.state
    }

    fn try_start(&mut self, now: Instant, current: Angle, direction: Direction, fault: FaultState) {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return;
            }
            self.cooldown_until = None;
        }

        if let FaultState::Latched(reason) = fault {
            warn!("motor: start refused ({}), cooling down", reason.label());
            self.lines.deactivate();
            self.cooldown_until = Some(now + FAULT_COOLDOWN);
            return;
        }

        let energized = self.lines.with(|lines| {
            lines.set_line(direction.opposite(), false);
            lines.set_line(direction, true);
        });
        if energized.is_none() {
            // Lines already released by shutdown.
            return;
        }

        info!("motor: start {} at {}", direction, current.degrees());
        self.state = MotorState::driving(direction, DriveStart { at: now, angle: current });
    }

    /// Both lines off, state `Idle`.
    pub fn stop(&mut self, current: Option<Angle>) {
        self.lines.deactivate();
        if let Some(start) = self.state.drive_start() {
            match current {
                Some(angle) => info!("motor: stop, travelled {} deg", angle.distance_to(start.angle)),
                None => info!("motor: stop"),
            }
        }
        self.state = MotorState::Idle;
    }
}

/// Control loop. Sole writer of the motor state.
pub async fn run<L: MotorLines>(tracker: &Tracker, lines: &OutputGroup<L>) {
    let mut controller = MotorController::new(lines, tracker.config());
    Timer::after(STARTUP_DELAY).await;

    while !tracker.is_shutting_down() {
        let state = controller.step(
            Instant::now(),
            tracker.position(),
            tracker.target().get().target,
            tracker.fault().get(),
        );
        tracker.publish_motor(state);
        select(Timer::after(CONTROL_PERIOD), tracker.stop_requested()).await;
    }

    controller.stop(tracker.position());
    tracker.publish_motor(controller.state());
    debug!("motor controller stopped");
}
