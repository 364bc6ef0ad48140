// src/hardware/mod.rs - Hardware boundary: GPIO outputs and the monotonic clock
pub mod serial;
pub mod sim;

pub use sim::{ManualClock, MonotonicClock, SimulatedBoard};

/// Minimum high time of a step pulse, in microseconds.
pub const STEP_PULSE_WIDTH_US: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn from_letter(letter: u8) -> Option<Axis> {
        match letter {
            b'X' => Some(Axis::X),
            b'Y' => Some(Axis::Y),
            b'Z' => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

/// Monotonic microsecond time source polled by the control loop.
pub trait Clock {
    fn now_micros(&self) -> u64;
    /// Busy-wait; only used for the step pulse width.
    fn delay_micros(&self, us: u32);
}

/// The controller's outputs: six step/direction lines, the tool and the status LED.
///
/// Implementations drive pins only; polarity inversion and pulse timing are
/// handled by the caller.
pub trait Board {
    fn set_direction(&mut self, axis: Axis, high: bool);
    fn set_step(&mut self, axis: Axis, high: bool);
    /// Engage `tool` at `speed` (spindle speed, laser power or servo angle, tool dependent).
    fn tool_on(&mut self, tool: u8, speed: u32);
    fn tool_off(&mut self, tool: u8);
    fn set_status_led(&mut self, on: bool);
}
