//! Sunrise and sunset from the NOAA sunrise equation.

#[cfg(not(test))]
use micromath::F32Ext;
use time::Date;

use crate::clock::UnixSeconds;
use crate::config::Location;
use crate::error::{Error, Result};
use crate::hal::{Ephemeris, SunTimes};

/// Julian day number of 2000-01-01 (J2000.0 epoch is at noon of that day).
const J2000_JDN: i32 = 2_451_545;
/// Unix time of 2000-01-01 12:00:00 UTC.
const J2000_UNIX: i64 = 946_728_000;
/// Solar depression at sunrise/sunset: refraction plus the solar disc radius.
const HORIZON_DEG: f32 = -0.833;
const OBLIQUITY_DEG: f32 = 23.4397;

#[derive(Clone, Copy, Debug, Default)]
pub struct NoaaEphemeris;

impl Ephemeris for NoaaEphemeris {
    fn sun_times(&self, location: Location, date: Date) -> Result<SunTimes> {
        // Whole days since J2000 stay in integer arithmetic; only the in-day
        // correction goes through f32.
        let days = date.to_julian_day() - J2000_JDN;
        let mean_solar = days as f32 - location.longitude_deg / 360.0;

        let anomaly = (357.5291 + 0.985_600_28 * mean_solar).rem_euclid(360.0).to_radians();
        let center = 1.9148 * anomaly.sin() + 0.0200 * (2.0 * anomaly).sin() + 0.0003 * (3.0 * anomaly).sin();
        let ecliptic_lon = (anomaly.to_degrees() + center + 180.0 + 102.9372)
            .rem_euclid(360.0)
            .to_radians();
        let transit_offset = -location.longitude_deg / 360.0 + 0.0053 * anomaly.sin()
            - 0.0069 * (2.0 * ecliptic_lon).sin();

        let sin_decl = ecliptic_lon.sin() * OBLIQUITY_DEG.to_radians().sin();
        let cos_decl = (1.0 - sin_decl * sin_decl).sqrt();
        let lat = location.latitude_deg.to_radians();
        let cos_hour_angle =
            (HORIZON_DEG.to_radians().sin() - lat.sin() * sin_decl) / (lat.cos() * cos_decl);
        if !(-1.0..=1.0).contains(&cos_hour_angle) {
            return Err(Error::PolarDayOrNight);
        }
        let half_day = cos_hour_angle.acos().to_degrees() / 360.0;

        let noon = J2000_UNIX + i64::from(days) * 86_400;
        let at = |fraction: f32| UnixSeconds(noon + (fraction * 86_400.0).round() as i64);
        Ok(SunTimes {
            sunrise: at(transit_offset - half_day),
            sunset: at(transit_offset + half_day),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    const TOLERANCE_S: i64 = 180;

    fn assert_near(actual: UnixSeconds, expected: i64) {
        let delta = (actual.as_i64() - expected).abs();
        assert!(delta <= TOLERANCE_S, "{} vs {} (off by {} s)", actual.as_i64(), expected, delta);
    }

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    #[test]
    fn midsummer_at_default_site() {
        let sun = NoaaEphemeris
            .sun_times(crate::config::TrackerConfig::DEFAULT.location, date(2024, Month::June, 21))
            .unwrap();
        // 00:38:30 and 17:18:30 UTC
        assert_near(sun.sunrise, 1_718_930_310);
        assert_near(sun.sunset, 1_718_990_310);
    }

    #[test]
    fn midwinter_day_is_short() {
        let sun = NoaaEphemeris
            .sun_times(crate::config::TrackerConfig::DEFAULT.location, date(2024, Month::December, 21))
            .unwrap();
        assert_near(sun.sunrise, 1_734_757_252);
        assert_near(sun.sunset, 1_734_785_332);
        let length = sun.sunset.as_i64() - sun.sunrise.as_i64();
        assert!((27_700..28_500).contains(&length), "day length {length}");
    }

    #[test]
    fn equinox_on_the_equator_is_about_twelve_hours() {
        let here = Location { latitude_deg: 0.0, longitude_deg: 0.0 };
        let sun = NoaaEphemeris.sun_times(here, date(2024, Month::March, 20)).unwrap();
        assert_near(sun.sunrise, 1_710_914_644);
        assert_near(sun.sunset, 1_710_958_243);
    }

    #[test]
    fn polar_day_and_night_are_errors() {
        let svalbard = Location { latitude_deg: 78.2, longitude_deg: 15.6 };
        assert_eq!(
            NoaaEphemeris.sun_times(svalbard, date(2024, Month::June, 21)),
            Err(Error::PolarDayOrNight)
        );
        assert_eq!(
            NoaaEphemeris.sun_times(svalbard, date(2024, Month::December, 21)),
            Err(Error::PolarDayOrNight)
        );
    }
}
