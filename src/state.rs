//! Shared state types exchanged between the control tasks.
//!
//! All types are `Copy` so they can live in `Cell`s behind the tracker's mutexes.
use embassy_time::Instant;
#[cfg(not(test))]
use micromath::F32Ext;
use time::Date;

// ── Angle ─────────────────────────────────────────────────────────────────────

/// Panel tilt in degrees, clamped to the mechanical travel limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Angle(f32);

impl Angle {
    pub const ZERO: Self = Self(0.0);

    pub fn clamped(degrees: f32, limit_deg: i32) -> Self {
        let limit = limit_deg as f32;
        Self(degrees.clamp(-limit, limit))
    }

    pub const fn degrees(self) -> f32 {
        self.0
    }

    /// Absolute angular distance in degrees.
    pub fn distance_to(self, other: Self) -> f32 {
        (self.0 - other.0).abs()
    }

    /// `|self - other| <= tolerance`, compared in whole tenths of a degree.
    ///
    /// Positions are reported to 0.1°, so a plain f32 comparison would put offsets of
    /// exactly the tolerance (10.3 vs 10.0) outside the band.
    pub fn within(self, other: Self, tolerance_deg: f32) -> bool {
        let tenths = ((self.0 - other.0) * 10.0).round().abs();
        tenths <= (tolerance_deg * 10.0).round()
    }
}

// ── Target ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetMode {
    #[default]
    Auto,
    Manual,
}

/// Everything the target slot publishes. Written only through [`crate::scheduler::TargetSlot`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetState {
    pub mode: TargetMode,
    pub target: Angle,
    /// Last operator setpoint; `None` in Auto mode.
    pub manual_setpoint: Option<Angle>,
    /// Local calendar day of the active schedule.
    pub day: Option<Date>,
}

impl TargetState {
    pub const PARKED: Self = Self {
        mode: TargetMode::Auto,
        target: Angle::ZERO,
        manual_setpoint: None,
        day: None,
    };
}

// ── Motor ─────────────────────────────────────────────────────────────────────

/// Drive direction, also the identity of the motor line that produces it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Recorded when a line is energized; identifies one drive activation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveStart {
    pub at: Instant,
    pub angle: Angle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorState {
    #[default]
    Idle,
    DrivingLeft(DriveStart),
    DrivingRight(DriveStart),
}

impl MotorState {
    pub const fn driving(direction: Direction, start: DriveStart) -> Self {
        match direction {
            Direction::Left => Self::DrivingLeft(start),
            Direction::Right => Self::DrivingRight(start),
        }
    }

    pub const fn direction(&self) -> Option<Direction> {
        match self {
            Self::Idle => None,
            Self::DrivingLeft(_) => Some(Direction::Left),
            Self::DrivingRight(_) => Some(Direction::Right),
        }
    }

    pub const fn drive_start(&self) -> Option<DriveStart> {
        match self {
            Self::Idle => None,
            Self::DrivingLeft(start) | Self::DrivingRight(start) => Some(*start),
        }
    }

    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

// ── Faults ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorFault {
    /// Both load channels read exactly zero together.
    ZeroLoad,
    /// Accelerometer transfer failed or returned a malformed frame.
    Accelerometer,
    /// Load-sense ADC could not be read.
    LoadSense,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultReason {
    Overload { load: f32, angle: Option<Angle> },
    Sensor(SensorFault),
    Stall { angle: Angle },
}

impl FaultReason {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Overload { .. } => "overload",
            Self::Sensor(SensorFault::ZeroLoad) => "sensor-zero",
            Self::Sensor(SensorFault::Accelerometer) => "sensor-accelerometer",
            Self::Sensor(SensorFault::LoadSense) => "sensor-load",
            Self::Stall { .. } => "stall",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultState {
    #[default]
    Ok,
    Latched(FaultReason),
}

impl FaultState {
    pub const fn is_latched(&self) -> bool {
        matches!(self, Self::Latched(_))
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// What the two status LEDs should show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusIndicator {
    Ok,
    Fault,
    /// Manual mode blink takes precedence over the fault indication.
    ManualBlink,
}

impl StatusIndicator {
    pub const fn derive(fault: FaultState, mode: TargetMode) -> Self {
        match (mode, fault) {
            (TargetMode::Manual, _) => Self::ManualBlink,
            (TargetMode::Auto, FaultState::Ok) => Self::Ok,
            (TargetMode::Auto, FaultState::Latched(_)) => Self::Fault,
        }
    }

    /// `(ok, fault)` channel levels; `blink_on` is the current blink phase.
    pub const fn channels(self, blink_on: bool) -> (bool, bool) {
        match self {
            Self::Ok => (true, false),
            Self::Fault => (false, true),
            Self::ManualBlink => (blink_on, false),
        }
    }
}

/// Snapshot served by the console `status` command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusReport {
    pub day: Option<Date>,
    pub fault: FaultState,
    pub position: Option<Angle>,
    pub target: Angle,
    pub motor_active: bool,
    pub auto_position: bool,
}
