//! Wall-clock time, disciplined from GPS and extrapolated with the monotonic timer.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::error::{Error, Result};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Seconds since 1970-01-01 00:00:00 UTC.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnixSeconds(pub i64);

impl UnixSeconds {
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Local calendar date for a fixed offset from UTC.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDate`] when the timestamp or offset is out of range.
    pub fn local_date(self, utc_offset_minutes: i16) -> Result<Date> {
        let offset = UtcOffset::from_whole_seconds(i32::from(utc_offset_minutes) * 60)?;
        let utc = OffsetDateTime::from_unix_timestamp(self.0)?;
        Ok(utc.to_offset(offset).date())
    }

    /// Seconds until the next local midnight (1..=86400).
    pub fn until_local_midnight(self, utc_offset_minutes: i16) -> i64 {
        let local = self.0 + i64::from(utc_offset_minutes) * 60;
        SECONDS_PER_DAY - local.rem_euclid(SECONDS_PER_DAY)
    }
}

/// Unix time of UTC midnight starting `date`.
pub fn date_start(date: Date) -> UnixSeconds {
    UnixSeconds(date.midnight().assume_utc().unix_timestamp())
}

#[derive(Clone, Copy)]
struct Anchor {
    at: Instant,
    unix: UnixSeconds,
}

/// Wall clock. Written only by the GPS task.
pub struct WallClock {
    anchor: Mutex<CriticalSectionRawMutex, Cell<Option<Anchor>>>,
}

impl WallClock {
    pub const fn new() -> Self {
        Self {
            anchor: Mutex::new(Cell::new(None)),
        }
    }

    /// Records that `unix` was the wall time at monotonic instant `at`.
    pub fn sync(&self, unix: UnixSeconds, at: Instant) {
        let previous = self.anchor.lock(|cell| cell.replace(Some(Anchor { at, unix })));
        if previous.is_none() {
            info!("wall clock set: {}", unix.as_i64());
        }
    }

    pub fn is_set(&self) -> bool {
        self.anchor.lock(|cell| cell.get().is_some())
    }

    /// Wall time at `at`, extrapolated from the last sync.
    ///
    /// # Errors
    ///
    /// [`Error::ClockUnset`] before the first sync.
    pub fn unix_at(&self, at: Instant) -> Result<UnixSeconds> {
        let anchor = self.anchor.lock(Cell::get).ok_or(Error::ClockUnset)?;
        let elapsed = if at >= anchor.at {
            (at - anchor.at).as_secs() as i64
        } else {
            -((anchor.at - at).as_secs() as i64)
        };
        Ok(UnixSeconds(anchor.unix.0 + elapsed))
    }

    pub fn now(&self) -> Result<UnixSeconds> {
        self.unix_at(Instant::now())
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}
