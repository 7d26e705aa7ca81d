//! Target scheduler: desired angle from the sunrise/sunset schedule or the operator.

use core::cell::Cell;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use time::Date;

use crate::clock::{UnixSeconds, SECONDS_PER_DAY};
use crate::config::{Location, TrackerConfig, CLOCK_RETRY, SCHEDULE_PERIOD, STARTUP_DELAY};
use crate::error::{Error, Result};
use crate::hal::{Ephemeris, SunTimes};
use crate::state::{Angle, TargetMode, TargetState};
use crate::supervisor::Tracker;

/// Schedule for one local calendar day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleContext {
    pub day: Date,
    pub sunrise: UnixSeconds,
    pub sunset: UnixSeconds,
    pub day_length: i64,
}

impl ScheduleContext {
    pub fn new(day: Date, sun: SunTimes) -> Self {
        Self {
            day,
            sunrise: sun.sunrise,
            sunset: sun.sunset,
            day_length: sun.sunset.as_i64() - sun.sunrise.as_i64(),
        }
    }

    /// Seconds since sunrise; negative before dawn.
    pub fn elapsed(&self, now: UnixSeconds) -> i64 {
        now.as_i64() - self.sunrise.as_i64()
    }
}

/// Linear sweep from `-limit` at sunrise to `+limit` at sunset, park (0) outside.
///
/// `floor(c / (day_length / 2·limit))` is evaluated as `c·2·limit / day_length` so the
/// step boundaries are exact.
pub fn auto_target(elapsed: i64, day_length: i64, limit_deg: i32) -> Angle {
    if day_length <= 0 || elapsed < 0 || elapsed > day_length {
        return Angle::ZERO;
    }
    let limit = i64::from(limit_deg);
    let steps = elapsed * 2 * limit / day_length;
    Angle::clamped((steps - limit) as f32, limit_deg)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    BeforeSunrise,
    Daylight,
    AfterSunset,
    /// No sunrise or sunset today.
    NoSchedule,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoPlan {
    pub target: Angle,
    pub phase: Phase,
    pub day: Date,
    /// How long the scheduler may sleep before the next decision.
    pub sleep: Duration,
}

pub struct Scheduler<E> {
    ephemeris: E,
    config: TrackerConfig,
    context: Option<ScheduleContext>,
}

impl<E: Ephemeris> Scheduler<E> {
    pub fn new(config: &TrackerConfig, ephemeris: E) -> Self {
        Self {
            ephemeris,
            config: *config,
            context: None,
        }
    }

    pub fn context(&self) -> Option<ScheduleContext> {
        self.context
    }

    /// Recomputes the schedule when the local date differs from the cached one.
    ///
    /// Returns the local date; the context stays `None` on polar days.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDate`] if `now` cannot be mapped to a calendar date.
    pub fn refresh_day(&mut self, now: UnixSeconds, location: Location) -> Result<Date> {
        let day = now.local_date(self.config.utc_offset_minutes)?;
        if self.context.map(|context| context.day) == Some(day) {
            return Ok(day);
        }
        match self.ephemeris.sun_times(location, day) {
            Ok(sun) => {
                let context = ScheduleContext::new(day, sun);
                info!(
                    "day {}-{}-{}: sunrise {} sunset {} ({} s of daylight)",
                    day.year(),
                    u8::from(day.month()),
                    day.day(),
                    context.sunrise.as_i64(),
                    context.sunset.as_i64(),
                    context.day_length
                );
                self.context = Some(context);
            }
            Err(err) => {
                warn!("no schedule for {}-{}-{}: {}", day.year(), u8::from(day.month()), day.day(), err);
                self.context = None;
            }
        }
        Ok(day)
    }

    /// Auto-mode decision for wall time `now`.
    ///
    /// # Errors
    ///
    /// Propagates [`Scheduler::refresh_day`] failures.
    pub fn plan(&mut self, now: UnixSeconds, location: Location) -> Result<AutoPlan> {
        let day = self.refresh_day(now, location)?;
        let until_midnight = secs(now.until_local_midnight(self.config.utc_offset_minutes));

        let Some(context) = self.context.filter(|context| context.day == day) else {
            return Ok(AutoPlan {
                target: Angle::ZERO,
                phase: Phase::NoSchedule,
                day,
                sleep: until_midnight,
            });
        };

        let elapsed = context.elapsed(now);
        let limit = self.config.position_limit_deg;
        let target = auto_target(elapsed, context.day_length, limit);
        let (phase, sleep) = if elapsed < 0 {
            (Phase::BeforeSunrise, secs(-elapsed))
        } else if elapsed > context.day_length {
            (Phase::AfterSunset, until_midnight)
        } else {
            (Phase::Daylight, SCHEDULE_PERIOD)
        };
        Ok(AutoPlan { target, phase, day, sleep })
    }
}

fn secs(seconds: i64) -> Duration {
    Duration::from_secs(seconds.clamp(1, SECONDS_PER_DAY) as u64)
}

// ── Target slot ───────────────────────────────────────────────────────────────

/// Mode and target angle. Every write checks the mode inside the lock, so a
/// scheduler write can never land on top of a manual setpoint.
pub struct TargetSlot {
    state: Mutex<CriticalSectionRawMutex, Cell<TargetState>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
    limit_deg: i32,
}

impl TargetSlot {
    pub const fn new(limit_deg: i32) -> Self {
        Self {
            state: Mutex::new(Cell::new(TargetState::PARKED)),
            wake: Signal::new(),
            limit_deg,
        }
    }

    pub fn get(&self) -> TargetState {
        self.state.lock(Cell::get)
    }

    fn update<R>(&self, f: impl FnOnce(&mut TargetState) -> R) -> R {
        self.state.lock(|cell| {
            let mut state = cell.get();
            let result = f(&mut state);
            cell.set(state);
            result
        })
    }

    /// Scheduler write. Ignored in Manual mode; returns whether the target changed.
    pub fn apply_auto(&self, target: Angle, day: Date) -> bool {
        self.update(|state| {
            state.day = Some(day);
            if state.mode != TargetMode::Auto || state.target == target {
                return false;
            }
            state.target = target;
            true
        })
    }

    pub fn set_day(&self, day: Date) {
        self.update(|state| state.day = Some(day));
    }

    /// Operator switch to Manual. The current target is held until a setpoint arrives.
    pub fn set_manual_mode(&self) {
        let changed = self.update(|state| core::mem::replace(&mut state.mode, TargetMode::Manual) != TargetMode::Manual);
        if changed {
            info!("target mode: manual");
            self.wake.signal(());
        }
    }

    /// Operator switch to Auto. Discards the manual setpoint and wakes the scheduler.
    pub fn set_auto_mode(&self) {
        let changed = self.update(|state| {
            state.manual_setpoint = None;
            core::mem::replace(&mut state.mode, TargetMode::Auto) != TargetMode::Auto
        });
        if changed {
            info!("target mode: auto");
        }
        self.wake.signal(());
    }

    /// Operator setpoint, accepted only in Manual mode and within the travel limit.
    ///
    /// # Errors
    ///
    /// [`Error::NotInManualMode`] or [`Error::PositionOutOfRange`]; the target is
    /// left unchanged in both cases.
    pub fn set_manual_position(&self, position: i32) -> Result<Angle> {
        let limit = self.limit_deg;
        let result = self.update(|state| {
            if state.mode != TargetMode::Manual {
                return Err(Error::NotInManualMode);
            }
            if position.unsigned_abs() > limit.unsigned_abs() {
                return Err(Error::PositionOutOfRange { position, limit });
            }
            let target = Angle::clamped(position as f32, limit);
            state.target = target;
            state.manual_setpoint = Some(target);
            Ok(target)
        });
        match result {
            Ok(target) => info!("manual target {}", target.degrees()),
            Err(err) => warn!("manual target {} rejected: {}", position, err),
        }
        result
    }

    /// Wakes the scheduler early.
    pub fn wake(&self) {
        self.wake.signal(());
    }

    /// Resolves on the next mode change or explicit wake.
    pub async fn changed(&self) {
        self.wake.wait().await;
    }
}

/// Scheduler loop. Sole writer of the auto target and schedule day.
pub async fn run<E: Ephemeris>(tracker: &Tracker, ephemeris: E) {
    let mut scheduler = Scheduler::new(tracker.config(), ephemeris);
    Timer::after(STARTUP_DELAY).await;

    while !tracker.is_shutting_down() {
        let sleep = match step(tracker, &mut scheduler) {
            Ok(sleep) => sleep,
            Err(Error::ClockUnset) => {
                debug!("scheduler: waiting for wall clock");
                CLOCK_RETRY
            }
            Err(err) => {
                error!("scheduler: {}", err);
                CLOCK_RETRY
            }
        };
        select(Timer::after(sleep), tracker.target().changed()).await;
    }
    debug!("target scheduler stopped");
}

fn step<E: Ephemeris>(tracker: &Tracker, scheduler: &mut Scheduler<E>) -> Result<Duration> {
    let now = tracker.clock().now()?;
    let location = tracker.location();
    let slot = tracker.target();

    if slot.get().mode == TargetMode::Manual {
        let day = scheduler.refresh_day(now, location)?;
        slot.set_day(day);
        return Ok(SCHEDULE_PERIOD);
    }

    let plan = scheduler.plan(now, location)?;
    if slot.apply_auto(plan.target, plan.day) {
        info!("auto target {} ({})", plan.target.degrees(), plan.phase);
    }
    Ok(plan.sleep)
}
