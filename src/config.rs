//! Tracker constants and configuration.

use embassy_time::Duration;

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Mechanical travel limit either side of level (degrees).
pub const POSITION_LIMIT_DEG: i32 = 62;
/// Half-width of the on-target band (degrees).
pub const TOLERANCE_DEG: f32 = 0.3;

// ── Position estimator ───────────────────────────────────────────────────────

/// Moving-average window length (≈4 s of samples at 10 Hz).
pub const SAMPLE_WINDOW_LEN: usize = 40;
/// Raw accelerometer counts → degrees.
pub const ANGLE_SCALE: f32 = 0.28;

// ── Task cadences ─────────────────────────────────────────────────────────────

pub const SENSOR_PERIOD: Duration = Duration::from_millis(100);
pub const SCHEDULE_PERIOD: Duration = Duration::from_secs(90);
pub const CONTROL_PERIOD: Duration = Duration::from_millis(200);
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(100);
/// Control loops wait this long after boot so the sample window fills a little.
pub const STARTUP_DELAY: Duration = Duration::from_secs(1);
/// Scheduler retry period while the wall clock is still unset.
pub const CLOCK_RETRY: Duration = Duration::from_secs(5);

// ── Safety ────────────────────────────────────────────────────────────────────

/// Load-sense threshold (volts) on either channel.
pub const OVERLOAD_THRESHOLD: f32 = 4.0;
pub const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(10);
/// Smallest angular change that counts as movement between stall checks.
pub const STALL_EPSILON_DEG: f32 = 0.05;
/// Delay after a refused start before the next start is considered.
pub const FAULT_COOLDOWN: Duration = Duration::from_secs(60);
pub const SHUTDOWN_SETTLE: Duration = Duration::from_millis(200);
pub const MANUAL_BLINK_PERIOD: Duration = Duration::from_millis(500);

/// Observer position on the ground.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    pub latitude_deg: f32,
    pub longitude_deg: f32,
}

/// Per-installation parameters. Filled from [`TrackerConfig::DEFAULT`] in firmware.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrackerConfig {
    pub position_limit_deg: i32,
    pub tolerance_deg: f32,
    /// Added to every raw accelerometer sample before averaging.
    pub calibration_correction: i16,
    pub overload_threshold: f32,
    /// Used until the GPS reports a fix.
    pub location: Location,
    /// Offset of the local civil day from UTC; the schedule rolls over at local midnight.
    pub utc_offset_minutes: i16,
}

impl TrackerConfig {
    pub const DEFAULT: Self = Self {
        position_limit_deg: POSITION_LIMIT_DEG,
        tolerance_deg: TOLERANCE_DEG,
        calibration_correction: 0,
        overload_threshold: OVERLOAD_THRESHOLD,
        location: Location {
            latitude_deg: 51.652_21,
            longitude_deg: 45.818_634,
        },
        utc_offset_minutes: 4 * 60,
    };

    pub fn limit_deg(&self) -> f32 {
        self.position_limit_deg as f32
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
