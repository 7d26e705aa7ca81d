//! NMEA 0183 parsing for the wall clock (`RMC`) and observer location (`GGA`).

use core::str::FromStr;

use embassy_time::Instant;
#[cfg(not(test))]
use micromath::F32Ext;
use time::{Date, Month};

use crate::clock::{date_start, UnixSeconds};
use crate::config::Location;
use crate::supervisor::Tracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmeaFrame {
    Gga,
    Rmc,
    Other,
}

/// Receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NmeaStats {
    pub sentences_rx: u16,
    pub checksum_errors: u16,
    /// Buffer overflows and fields that failed to parse.
    pub frame_errors: u16,
    pub gga_count: u16,
    pub rmc_count: u16,
}

pub struct NmeaParser {
    buffer: heapless::String<128>,
    stats: NmeaStats,
    time: Option<UnixSeconds>,
    location: Option<Location>,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self {
            buffer: heapless::String::new(),
            stats: NmeaStats::default(),
            time: None,
            location: None,
        }
    }

    pub fn stats(&self) -> NmeaStats {
        self.stats
    }

    /// UTC time of the last valid `RMC` since the previous call.
    pub fn take_time(&mut self) -> Option<UnixSeconds> {
        self.time.take()
    }

    /// Position of the last `GGA` with a fix since the previous call.
    pub fn take_location(&mut self) -> Option<Location> {
        self.location.take()
    }

    /// Process incoming bytes from the UART.
    pub fn push_data(&mut self, data: &[u8]) {
        for &b in data {
            if b == b'$' {
                self.buffer.clear();
            }

            if self.buffer.push(b as char).is_err() {
                self.stats.frame_errors = self.stats.frame_errors.wrapping_add(1);
                self.buffer.clear();
                continue;
            }

            if b == b'\n' {
                self.parse_sentence();
                self.buffer.clear();
            }
        }
    }

    /// Feeds a UART burst received at `at` and disciplines the tracker's clock
    /// and location from whatever it completed.
    pub fn feed(&mut self, tracker: &Tracker, data: &[u8], at: Instant) {
        self.push_data(data);
        if let Some(unix) = self.take_time() {
            tracker.clock().sync(unix, at);
        }
        if let Some(location) = self.take_location() {
            if tracker.location() != location {
                debug!("gps location {} {}", location.latitude_deg, location.longitude_deg);
            }
            tracker.set_location(location);
        }
    }

    fn parse_sentence(&mut self) {
        let line = core::mem::take(&mut self.buffer);
        let s = line.as_str().trim();

        if s.len() < 6 {
            return;
        }

        if !verify_checksum(s) {
            self.stats.checksum_errors = self.stats.checksum_errors.wrapping_add(1);
            return;
        }

        let frame = match s.get(3..6) {
            Some("GGA") => NmeaFrame::Gga,
            Some("RMC") => NmeaFrame::Rmc,
            _ => NmeaFrame::Other,
        };
        self.stats.sentences_rx = self.stats.sentences_rx.wrapping_add(1);

        // Drop the checksum so the last field parses cleanly.
        let body = s.split_once('*').map_or(s, |(body, _)| body);
        let parsed = match frame {
            NmeaFrame::Gga => {
                self.stats.gga_count = self.stats.gga_count.wrapping_add(1);
                parse_gga(body).map(|fix| {
                    if let Some(location) = fix {
                        self.location = Some(location);
                    }
                })
            }
            NmeaFrame::Rmc => {
                self.stats.rmc_count = self.stats.rmc_count.wrapping_add(1);
                parse_rmc(body).map(|time| {
                    if let Some(time) = time {
                        self.time = Some(time);
                    }
                })
            }
            NmeaFrame::Other => Some(()),
        };
        if parsed.is_none() {
            self.stats.frame_errors = self.stats.frame_errors.wrapping_add(1);
        }
    }
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `$xxGGA,time,lat,NS,lon,EW,qual,...`. `Some(None)` for a well-formed sentence without a fix.
fn parse_gga(s: &str) -> Option<Option<Location>> {
    let mut parts = s.split(',').skip(2);
    let lat_raw = parts.next()?;
    let ns = parts.next()?;
    let lon_raw = parts.next()?;
    let ew = parts.next()?;
    let quality = u8::from_str(parts.next()?).unwrap_or(0);
    if quality == 0 {
        return Some(None);
    }

    let mut latitude = coord_to_degrees(lat_raw)?;
    if ns == "S" {
        latitude = -latitude;
    }
    let mut longitude = coord_to_degrees(lon_raw)?;
    if ew == "W" {
        longitude = -longitude;
    }
    Some(Some(Location {
        latitude_deg: latitude,
        longitude_deg: longitude,
    }))
}

/// `$xxRMC,hhmmss.ss,status,lat,NS,lon,EW,speed,course,ddmmyy,...`.
/// `Some(None)` when the receiver flags the data void.
fn parse_rmc(s: &str) -> Option<Option<UnixSeconds>> {
    let mut parts = s.split(',').skip(1);
    let time_str = parts.next()?;
    if parts.next()? != "A" {
        return Some(None);
    }
    let date_str = parts.nth(6)?;

    let hhmmss = u32::from_str(time_str.get(..6)?).ok()?;
    let ddmmyy = u32::from_str(date_str).ok()?;
    let (hour, minute, second) = (hhmmss / 10_000, hhmmss / 100 % 100, hhmmss % 100);
    if hour > 23 || minute > 59 || second > 60 {
        return None;
    }

    let month = Month::try_from((ddmmyy / 100 % 100) as u8).ok()?;
    let year = 2000 + (ddmmyy % 100) as i32;
    let date = Date::from_calendar_date(year, month, (ddmmyy / 10_000) as u8).ok()?;
    let seconds = i64::from(hour * 3600 + minute * 60 + second);
    Some(Some(UnixSeconds(date_start(date).as_i64() + seconds)))
}

/// `ddmm.mmmm` / `dddmm.mmmm` → decimal degrees.
fn coord_to_degrees(raw: &str) -> Option<f32> {
    let value = f32::from_str(raw).ok()?;
    let degrees = (value / 100.0).floor();
    Some(degrees + (value - degrees * 100.0) / 60.0)
}

fn verify_checksum(s: &str) -> bool {
    if let Some((content, check_str)) = s.split_once('*') {
        let content = content.strip_prefix('$').unwrap_or(content);
        let calc = content.bytes().fold(0u8, |acc, b| acc ^ b);
        let hex = check_str.get(..2).unwrap_or(check_str);
        if let Ok(val) = u8::from_str_radix(hex.trim(), 16) {
            return calc == val;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Appends `*XX\r\n` with the correct checksum.
    fn sentence(body: &str) -> std::string::String {
        let sum = body.bytes().fold(0u8, |acc, b| acc ^ b);
        std::format!("${body}*{sum:02X}\r\n")
    }

    #[test]
    fn rmc_sets_utc_time() {
        let mut parser = NmeaParser::new();
        parser.push_data(sentence("GPRMC,203000.00,A,5139.1326,N,04549.1180,E,0.0,0.0,200624,,,A").as_bytes());
        // 2024-06-20 20:30:00 UTC
        assert_eq!(parser.take_time(), Some(UnixSeconds(1_718_915_400)));
        assert_eq!(parser.take_time(), None);
        assert_eq!(parser.stats().rmc_count, 1);
    }

    #[test]
    fn void_rmc_is_ignored() {
        let mut parser = NmeaParser::new();
        parser.push_data(sentence("GPRMC,203000.00,V,,,,,,,200624,,,N").as_bytes());
        assert_eq!(parser.take_time(), None);
        assert_eq!(parser.stats().frame_errors, 0);
    }

    #[test]
    fn gga_with_fix_sets_location() {
        let mut parser = NmeaParser::new();
        parser.push_data(sentence("GNGGA,203000.00,5139.1326,N,04549.1180,E,1,08,1.0,150.0,M,0.0,M,,").as_bytes());
        let location = parser.take_location().unwrap();
        assert!((location.latitude_deg - 51.652_21).abs() < 1e-3);
        assert!((location.longitude_deg - 45.818_63).abs() < 1e-3);

        parser.push_data(sentence("GNGGA,203001.00,,,,,0,00,99.9,,M,,M,,").as_bytes());
        assert_eq!(parser.take_location(), None);
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() {
        let mut parser = NmeaParser::new();
        parser.push_data(sentence("GPGGA,120000,3352.0000,S,15112.0000,W,1,05,1.2,10.0,M,,M,,").as_bytes());
        let location = parser.take_location().unwrap();
        assert!((location.latitude_deg + 33.866_67).abs() < 1e-3);
        assert!((location.longitude_deg + 151.2).abs() < 1e-3);
    }

    #[test]
    fn bad_checksum_is_counted_and_dropped() {
        let mut parser = NmeaParser::new();
        parser.push_data(b"$GPRMC,203000.00,A,,,,,,,200624,,,A*00\r\n");
        assert_eq!(parser.take_time(), None);
        assert_eq!(parser.stats().checksum_errors, 1);
    }

    #[test]
    fn sentences_split_across_bursts() {
        let line = sentence("GPRMC,000001,A,,,,,,,010170,,,A");
        let (head, tail) = line.as_bytes().split_at(12);
        let mut parser = NmeaParser::new();
        parser.push_data(head);
        assert_eq!(parser.take_time(), None);
        parser.push_data(tail);
        // 2070 under the two-digit-year rule
        assert_eq!(parser.take_time(), Some(UnixSeconds(3_155_760_001)));
    }

    #[test]
    fn feed_disciplines_the_tracker() {
        let tracker = Tracker::default();
        let mut parser = NmeaParser::new();
        let mut burst = sentence("GPRMC,203000.00,A,,,,,,,200624,,,A");
        burst.push_str(&sentence("GPGGA,203000.00,0100.0000,N,00200.0000,E,1,05,1.0,0.0,M,,M,,"));
        parser.feed(&tracker, burst.as_bytes(), Instant::from_secs(50));

        assert_eq!(tracker.clock().unix_at(Instant::from_secs(60)), Ok(UnixSeconds(1_718_915_410)));
        let location = tracker.location();
        assert!((location.latitude_deg - 1.0).abs() < 1e-4);
        assert!((location.longitude_deg - 2.0).abs() < 1e-4);
    }
}
