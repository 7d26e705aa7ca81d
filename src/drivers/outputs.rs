use embassy_stm32::gpio::{AnyPin, Level, Output, Speed};

use solar_tracker::hal::{MotorLines, Outputs, StatusLeds};
use solar_tracker::state::Direction;

/// H-bridge enable lines. High drives the motor in that direction.
pub struct MotorDriver {
    left: Output<'static, AnyPin>,
    right: Output<'static, AnyPin>,
}

impl MotorDriver {
    pub fn new(left: AnyPin, right: AnyPin) -> Self {
        Self {
            left: Output::new(left, Level::Low, Speed::Low),
            right: Output::new(right, Level::Low, Speed::Low),
        }
    }
}

impl Outputs for MotorDriver {
    fn deactivate_all(&mut self) {
        self.left.set_low();
        self.right.set_low();
    }
}

impl MotorLines for MotorDriver {
    fn set_line(&mut self, line: Direction, active: bool) {
        let pin = match line {
            Direction::Left => &mut self.left,
            Direction::Right => &mut self.right,
        };
        pin.set_level(Level::from(active));
    }
}

/// Green "ok" and red "fault" lamps, active high.
pub struct StatusLamps {
    ok: Output<'static, AnyPin>,
    fault: Output<'static, AnyPin>,
}

impl StatusLamps {
    pub fn new(ok: AnyPin, fault: AnyPin) -> Self {
        Self {
            ok: Output::new(ok, Level::Low, Speed::Low),
            fault: Output::new(fault, Level::Low, Speed::Low),
        }
    }
}

impl Outputs for StatusLamps {
    fn deactivate_all(&mut self) {
        self.ok.set_low();
        self.fault.set_low();
    }
}

impl StatusLeds for StatusLamps {
    fn show(&mut self, ok: bool, fault: bool) {
        self.ok.set_level(Level::from(ok));
        self.fault.set_level(Level::from(fault));
    }
}
