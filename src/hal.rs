//! Hardware collaborator interfaces.
//!
//! The control core only talks to hardware through these traits. Board
//! implementations live in the firmware's `drivers` module; tests use fakes.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use time::Date;

use crate::clock::UnixSeconds;
use crate::config::Location;
use crate::error::Result;
use crate::state::Direction;

/// Accelerometer request/reply length.
pub const FRAME_LEN: usize = 7;

/// Bytes received from one accelerometer transfer. Sized above [`FRAME_LEN`] so a
/// transport can hand back whatever it got and let the estimator judge it.
pub type Reply = heapless::Vec<u8, 16>;

/// Outputs that can always be forced to their safe (inactive) level.
pub trait Outputs {
    fn deactivate_all(&mut self);
}

/// Two-line reversible motor driver. The caller guarantees both lines are never
/// requested active together.
pub trait MotorLines: Outputs {
    fn set_line(&mut self, line: Direction, active: bool);
}

/// Two-channel status indicator.
pub trait StatusLeds: Outputs {
    fn show(&mut self, ok: bool, fault: bool);
}

#[allow(async_fn_in_trait)]
pub trait AccelTransport {
    async fn transfer(&mut self, request: &[u8]) -> Result<Reply>;
}

/// Load-sense voltages, rounded to 2 decimals.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadReading {
    pub channel0: f32,
    pub channel1: f32,
}

impl LoadReading {
    pub fn max(&self) -> f32 {
        self.channel0.max(self.channel1)
    }
}

#[allow(async_fn_in_trait)]
pub trait LoadSense {
    async fn read(&mut self) -> Result<LoadReading>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: UnixSeconds,
    pub sunset: UnixSeconds,
}

pub trait Ephemeris {
    /// Sunrise and sunset for the given local calendar date.
    ///
    /// # Errors
    ///
    /// [`crate::Error::PolarDayOrNight`] when the sun does not cross the horizon.
    fn sun_times(&self, location: Location, date: Date) -> Result<SunTimes>;
}

// ── Shared output groups ──────────────────────────────────────────────────────

/// An output group shared between its owning task and the shutdown sequencer.
///
/// The owning task drives it through [`OutputGroup::with`]; shutdown can force it
/// inactive and release it without that task's cooperation.
pub struct OutputGroup<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<T>>>,
}

impl<T: Outputs> OutputGroup<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Hands the hardware to the group, starting from the inactive level.
    pub fn install(&self, mut outputs: T) {
        outputs.deactivate_all();
        self.inner.lock(|cell| *cell.borrow_mut() = Some(outputs));
    }

    /// Runs `f` on the outputs; `None` once the group has been released.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }

    pub fn deactivate(&self) {
        self.with(Outputs::deactivate_all);
    }

    /// Forces the outputs inactive and takes them out of the group.
    pub fn release(&self) -> Option<T> {
        self.inner.lock(|cell| {
            let mut outputs = cell.borrow_mut().take()?;
            outputs.deactivate_all();
            Some(outputs)
        })
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock(|cell| cell.borrow().is_none())
    }
}

impl<T: Outputs> Default for OutputGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeLines;
    use super::*;

    #[test]
    fn release_deactivates_and_empties_the_group() {
        let group = OutputGroup::new();
        group.install(FakeLines::default());
        group.with(|lines| lines.set_line(Direction::Left, true));

        let released = group.release();
        assert!(matches!(released, Some(FakeLines { left: false, right: false, .. })));
        assert!(group.is_released());
        assert_eq!(group.with(|lines| lines.writes), None);
    }
}
