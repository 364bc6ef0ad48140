// src/hardware/sim.rs - Simulated board and clocks for dry runs and tests
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use super::{Axis, Board, Clock};

/// Wall-clock time since creation, backed by the operating system.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    created_at: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { created_at: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.created_at.elapsed().as_micros() as u64
    }

    fn delay_micros(&self, us: u32) {
        let until = self.now_micros() + u64::from(us);
        while self.now_micros() < until {
            std::hint::spin_loop();
        }
    }
}

/// A clock that only moves when told to. Clones share the same time, so a
/// test can keep a handle while the machine owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }

    pub fn set(&self, us: u64) {
        self.now.set(us);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.get()
    }

    fn delay_micros(&self, us: u32) {
        self.advance(u64::from(us));
    }
}

/// Records every pin transition instead of driving hardware.
///
/// Position is counted from rising step edges: a high direction line counts
/// +1, a low one -1.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    direction: [bool; 3],
    step: [bool; 3],
    pulses: [u64; 3],
    position: [i64; 3],
    tool: Option<(u8, u32)>,
    tool_switches: u32,
    led: bool,
    led_toggles: u32,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(&self, axis: Axis) -> bool {
        self.direction[axis.index()]
    }

    pub fn pulses(&self, axis: Axis) -> u64 {
        self.pulses[axis.index()]
    }

    pub fn total_pulses(&self) -> u64 {
        self.pulses.iter().sum()
    }

    pub fn position(&self) -> [i64; 3] {
        self.position
    }

    /// The engaged tool and its speed, if any.
    pub fn tool(&self) -> Option<(u8, u32)> {
        self.tool
    }

    pub fn tool_switches(&self) -> u32 {
        self.tool_switches
    }

    pub fn led(&self) -> bool {
        self.led
    }

    pub fn led_toggles(&self) -> u32 {
        self.led_toggles
    }
}

impl Board for SimulatedBoard {
    fn set_direction(&mut self, axis: Axis, high: bool) {
        self.direction[axis.index()] = high;
    }

    fn set_step(&mut self, axis: Axis, high: bool) {
        let i = axis.index();
        if high && !self.step[i] {
            self.pulses[i] += 1;
            self.position[i] += if self.direction[i] { 1 } else { -1 };
            tracing::trace!("{} step -> {}", axis.letter(), self.position[i]);
        }
        self.step[i] = high;
    }

    fn tool_on(&mut self, tool: u8, speed: u32) {
        if self.tool != Some((tool, speed)) {
            self.tool_switches += 1;
            tracing::debug!("Tool {} on at {}", tool, speed);
        }
        self.tool = Some((tool, speed));
    }

    fn tool_off(&mut self, tool: u8) {
        if self.tool.is_some() {
            self.tool_switches += 1;
            tracing::debug!("Tool {} off", tool);
        }
        self.tool = None;
    }

    fn set_status_led(&mut self, on: bool) {
        if on != self.led {
            self.led_toggles += 1;
        }
        self.led = on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_edges_count_position() {
        let mut board = SimulatedBoard::new();
        board.set_direction(Axis::Y, true);
        for _ in 0..3 {
            board.set_step(Axis::Y, true);
            board.set_step(Axis::Y, false);
        }
        board.set_direction(Axis::Y, false);
        board.set_step(Axis::Y, true);
        // Holding the line high is not a second edge.
        board.set_step(Axis::Y, true);
        assert_eq!(board.pulses(Axis::Y), 4);
        assert_eq!(board.position(), [0, 2, 0]);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(250);
        clock.delay_micros(10);
        assert_eq!(handle.now_micros(), 260);
    }
}
