//! Shutdown sequencer: `Running → Draining → ForceExit`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Timer;

use crate::config::SHUTDOWN_SETTLE;
use crate::error::Error;
use crate::hal::{MotorLines, OutputGroup, StatusLeds};
use crate::supervisor::Tracker;

/// Where a termination request came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Termination {
    StopButton,
    Console,
}

pub type TerminationChannel = Channel<CriticalSectionRawMutex, Termination, 4>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShutdownPhase {
    #[default]
    Running,
    Draining,
    ForceExit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalAction {
    BeginDrain,
    /// Reported as [`Error::ShutdownInProgress`]; nothing else happens.
    AlreadyDraining,
    ForceExit,
}

#[derive(Debug, Default)]
pub struct ShutdownSequencer {
    phase: ShutdownPhase,
    repeats: u8,
}

impl ShutdownSequencer {
    pub const fn new() -> Self {
        Self {
            phase: ShutdownPhase::Running,
            repeats: 0,
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    pub fn on_signal(&mut self) -> SignalAction {
        match self.phase {
            ShutdownPhase::Running => {
                self.phase = ShutdownPhase::Draining;
                SignalAction::BeginDrain
            }
            ShutdownPhase::Draining if self.repeats == 0 => {
                self.repeats += 1;
                SignalAction::AlreadyDraining
            }
            ShutdownPhase::Draining | ShutdownPhase::ForceExit => {
                self.phase = ShutdownPhase::ForceExit;
                SignalAction::ForceExit
            }
        }
    }
}

/// Cooperative drain: raise the flag, force outputs off, settle, release.
///
/// The released outputs are handed back so the caller can keep them parked.
pub async fn drain<L: MotorLines, D: StatusLeds>(
    tracker: &Tracker,
    lines: &OutputGroup<L>,
    leds: &OutputGroup<D>,
) -> (Option<L>, Option<D>) {
    tracker.begin_shutdown();
    lines.deactivate();
    leds.deactivate();
    Timer::after(SHUTDOWN_SETTLE).await;
    let parked = (lines.release(), leds.release());
    info!("shutdown: outputs released");
    parked
}

/// Last-resort deactivation of every output in one critical section.
pub fn force_off<L: MotorLines, D: StatusLeds>(lines: &OutputGroup<L>, leds: &OutputGroup<D>) {
    critical_section::with(|_| {
        lines.deactivate();
        leds.deactivate();
    });
}

/// Shutdown loop. `halt` must stop the CPU; it is called on the third signal.
///
/// On the board this runs on an interrupt-priority executor, so it is still polled
/// when a thread-mode task never yields.
pub async fn run<L: MotorLines, D: StatusLeds>(
    tracker: &Tracker,
    lines: &OutputGroup<L>,
    leds: &OutputGroup<D>,
    signals: &TerminationChannel,
    halt: fn() -> !,
) -> ! {
    let mut sequencer = ShutdownSequencer::new();
    let mut _parked = (None, None);

    loop {
        let source = signals.receive().await;
        match sequencer.on_signal() {
            SignalAction::BeginDrain => {
                info!("shutdown requested ({}): draining", source);
                _parked = drain(tracker, lines, leds).await;
            }
            SignalAction::AlreadyDraining => {
                warn!("{}", Error::ShutdownInProgress);
            }
            SignalAction::ForceExit => {
                error!("shutdown: forced exit");
                force_off(lines, leds);
                halt();
            }
        }
    }
}
