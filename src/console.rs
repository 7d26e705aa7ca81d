//! Operator console: a line protocol for the control and status surface.
//!
//! ```text
//! status        -> ok day=2024-06-21 error=none position=-12.4 target=-12.0 motor_active=1 auto_position=1
//! auto | manual -> ok mode=auto | ok mode=manual
//! pos <int>     -> ok target=<deg> | err <reason>
//! reset         -> ok cleared=<fault|none>
//! shutdown      -> ok shutting down | err shutdown already in progress | err termination queue full
//! ```

use core::fmt::Write;

use crate::error::{Error, Result};
use crate::shutdown::{Termination, TerminationChannel};
use crate::state::{FaultState, StatusReport};
use crate::supervisor::Tracker;

pub const LINE_LEN: usize = 64;

pub type Line = heapless::String<LINE_LEN>;
pub type Reply = heapless::String<128>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Status,
    Auto,
    Manual,
    Position(i32),
    Reset,
    Shutdown,
}

impl Command {
    /// # Errors
    ///
    /// [`Error::UnknownCommand`] for an unrecognised verb, [`Error::InvalidArgument`]
    /// for a missing, extra or non-integer argument.
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_ascii_whitespace();
        let verb = words.next().ok_or(Error::UnknownCommand)?;
        let command = match verb {
            "status" => Self::Status,
            "auto" => Self::Auto,
            "manual" => Self::Manual,
            "reset" => Self::Reset,
            "shutdown" => Self::Shutdown,
            "pos" => {
                let arg = words.next().ok_or(Error::InvalidArgument)?;
                Self::Position(arg.parse().map_err(|_| Error::InvalidArgument)?)
            }
            _ => return Err(Error::UnknownCommand),
        };
        if words.next().is_some() {
            return Err(Error::InvalidArgument);
        }
        Ok(command)
    }
}

/// Runs `command` against the tracker and renders the reply line (without terminator).
pub fn execute(tracker: &Tracker, signals: &TerminationChannel, command: Command) -> Result<Reply> {
    let mut reply = Reply::new();
    match command {
        Command::Status => {
            reply.push_str("ok ").map_err(|_| Error::InvalidArgument)?;
            render_status(&mut reply, &tracker.status());
        }
        Command::Auto => {
            tracker.target().set_auto_mode();
            let _ = reply.push_str("ok mode=auto");
        }
        Command::Manual => {
            tracker.target().set_manual_mode();
            let _ = reply.push_str("ok mode=manual");
        }
        Command::Position(position) => {
            let target = tracker.target().set_manual_position(position)?;
            let _ = write!(reply, "ok target={:.1}", target.degrees());
        }
        Command::Reset => {
            let cleared = tracker.fault().reset();
            let _ = write!(reply, "ok cleared={}", cleared.map_or("none", |reason| reason.label()));
        }
        Command::Shutdown => {
            // Still forwarded so repeated requests escalate the sequencer.
            let already = tracker.is_shutting_down();
            signals
                .try_send(Termination::Console)
                .map_err(|_| Error::TerminationQueueFull)?;
            if already {
                return Err(Error::ShutdownInProgress);
            }
            let _ = reply.push_str("ok shutting down");
        }
    }
    Ok(reply)
}

/// `day=… error=… position=… target=… motor_active=… auto_position=…`
pub fn render_status(out: &mut Reply, report: &StatusReport) {
    let _ = match report.day {
        Some(day) => write!(out, "day={:04}-{:02}-{:02}", day.year(), u8::from(day.month()), day.day()),
        None => write!(out, "day=-"),
    };
    let _ = match report.fault {
        FaultState::Ok => write!(out, " error=none"),
        FaultState::Latched(reason) => write!(out, " error={}", reason.label()),
    };
    let _ = match report.position {
        Some(angle) => write!(out, " position={:.1}", angle.degrees()),
        None => write!(out, " position=-"),
    };
    let _ = write!(
        out,
        " target={:.1} motor_active={} auto_position={}",
        report.target.degrees(),
        u8::from(report.motor_active),
        u8::from(report.auto_position)
    );
}

/// Parses and executes one line; failures become `err <reason>`.
pub fn handle_line(tracker: &Tracker, signals: &TerminationChannel, line: &str) -> Reply {
    let result = Command::parse(line).and_then(|command| execute(tracker, signals, command));
    result.unwrap_or_else(|err| {
        debug!("console: {}", err);
        let mut reply = Reply::new();
        let _ = write!(reply, "err {}", err);
        reply
    })
}

/// Splits a byte stream into `\r`/`\n` terminated lines.
#[derive(Default)]
pub struct LineReader {
    buffer: heapless::Vec<u8, LINE_LEN>,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buffer: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Returns a completed line; blank lines are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a line that overflowed the buffer or is not UTF-8.
    pub fn push(&mut self, byte: u8) -> Option<Result<Line>> {
        if byte != b'\r' && byte != b'\n' {
            if self.buffer.push(byte).is_err() {
                self.overflowed = true;
            }
            return None;
        }

        let overflowed = core::mem::take(&mut self.overflowed);
        let bytes = core::mem::take(&mut self.buffer);
        if overflowed {
            return Some(Err(Error::InvalidArgument));
        }
        if bytes.is_empty() {
            return None;
        }
        Some(Line::from_utf8(bytes).map_err(|_| Error::InvalidArgument))
    }
}

/// Console session state for one connection.
#[derive(Default)]
pub struct Console {
    reader: LineReader,
}

impl Console {
    pub const fn new() -> Self {
        Self {
            reader: LineReader::new(),
        }
    }

    /// Feeds one received byte; returns the reply once a line completes.
    pub fn push_byte(&mut self, tracker: &Tracker, signals: &TerminationChannel, byte: u8) -> Option<Reply> {
        match self.reader.push(byte)? {
            Ok(line) => Some(handle_line(tracker, signals, line.trim())),
            Err(err) => {
                let mut reply = Reply::new();
                let _ = write!(reply, "err {}", err);
                Some(reply)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Angle, FaultReason, SensorFault};

    fn run(console: &mut Console, tracker: &Tracker, signals: &TerminationChannel, input: &str) -> std::vec::Vec<std::string::String> {
        input
            .bytes()
            .filter_map(|byte| console.push_byte(tracker, signals, byte))
            .map(|reply| std::string::String::from(reply.as_str()))
            .collect()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("status"), Ok(Command::Status));
        assert_eq!(Command::parse("  pos   -12 "), Ok(Command::Position(-12)));
        assert_eq!(Command::parse("pos"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("pos 1.5"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("auto now"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("fly"), Err(Error::UnknownCommand));
    }

    #[test]
    fn status_line_format() {
        let mut out = Reply::new();
        render_status(
            &mut out,
            &StatusReport {
                day: Some(time::Date::from_calendar_date(2024, time::Month::June, 1).unwrap()),
                fault: FaultState::Latched(FaultReason::Stall { angle: Angle::clamped(3.0, 62) }),
                position: Some(Angle::clamped(-12.4, 62)),
                target: Angle::clamped(-12.0, 62),
                motor_active: true,
                auto_position: false,
            },
        );
        assert_eq!(
            out.as_str(),
            "day=2024-06-01 error=stall position=-12.4 target=-12.0 motor_active=1 auto_position=0"
        );
    }

    #[test]
    fn manual_position_flow() {
        let tracker = Tracker::default();
        let signals = TerminationChannel::new();
        let mut console = Console::new();

        let replies = run(&mut console, &tracker, &signals, "pos 10\r\nmanual\r\npos 10\npos 63\n");
        assert_eq!(
            replies,
            [
                "err not in manual mode",
                "ok mode=manual",
                "ok target=10.0",
                "err position 63 outside +/-62",
            ]
        );
        assert_eq!(tracker.target().get().target, Angle::clamped(10.0, 62));

        let replies = run(&mut console, &tracker, &signals, "status\n");
        assert_eq!(replies, ["ok day=- error=none position=- target=10.0 motor_active=0 auto_position=0"]);
    }

    #[test]
    fn reset_clears_latched_fault() {
        let tracker = Tracker::default();
        let signals = TerminationChannel::new();
        let mut console = Console::new();
        tracker.fault().latch(FaultReason::Sensor(SensorFault::ZeroLoad));

        assert_eq!(run(&mut console, &tracker, &signals, "reset\nreset\n"), ["ok cleared=sensor-zero", "ok cleared=none"]);
        assert!(!tracker.fault().get().is_latched());
    }

    #[test]
    fn shutdown_is_forwarded_every_time() {
        let tracker = Tracker::default();
        let signals = TerminationChannel::new();
        let mut console = Console::new();

        assert_eq!(run(&mut console, &tracker, &signals, "shutdown\n"), ["ok shutting down"]);
        tracker.begin_shutdown();
        assert_eq!(
            run(&mut console, &tracker, &signals, "shutdown\n"),
            ["err shutdown already in progress"]
        );
        assert_eq!(signals.try_receive(), Ok(Termination::Console));
        assert_eq!(signals.try_receive(), Ok(Termination::Console));
    }

    #[test]
    fn shutdown_reports_a_full_termination_queue() {
        let tracker = Tracker::default();
        let signals = TerminationChannel::new();
        let mut console = Console::new();
        while signals.try_send(Termination::StopButton).is_ok() {}

        assert_eq!(run(&mut console, &tracker, &signals, "shutdown\n"), ["err termination queue full"]);

        assert_eq!(signals.try_receive(), Ok(Termination::StopButton));
        assert_eq!(run(&mut console, &tracker, &signals, "shutdown\n"), ["ok shutting down"]);
    }

    #[test]
    fn overlong_line_is_rejected_and_reader_recovers() {
        let tracker = Tracker::default();
        let signals = TerminationChannel::new();
        let mut console = Console::new();
        let mut input = "x".repeat(LINE_LEN + 10);
        input.push_str("\r\n\r\nauto\r\n");
        assert_eq!(run(&mut console, &tracker, &signals, &input), ["err invalid argument", "ok mode=auto"]);
    }
}
