use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors raised by the control core and its collaborators.
///
/// Latched hardware faults are not errors; see [`crate::state::FaultReason`].
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    #[display("accelerometer reply malformed ({len} bytes)")]
    MalformedReply { len: usize },

    #[display("accelerometer bus transfer failed")]
    AccelBus,

    #[display("load-sense read failed")]
    LoadSenseBus,

    #[display("not in manual mode")]
    NotInManualMode,

    #[display("position {position} outside +/-{limit}")]
    PositionOutOfRange { position: i32, limit: i32 },

    #[display("shutdown already in progress")]
    ShutdownInProgress,

    #[display("termination queue full")]
    TerminationQueueFull,

    #[display("wall clock not set")]
    ClockUnset,

    #[display("invalid calendar date")]
    InvalidDate,

    #[display("sun does not rise or set on this date")]
    PolarDayOrNight,

    #[display("unknown command")]
    UnknownCommand,

    #[display("invalid argument")]
    InvalidArgument,

    #[display("task spawn failed")]
    TaskSpawn,

    #[display("peripheral configuration rejected")]
    PeripheralConfig,
}

impl From<time::error::ComponentRange> for Error {
    fn from(_: time::error::ComponentRange) -> Self {
        Self::InvalidDate
    }
}
