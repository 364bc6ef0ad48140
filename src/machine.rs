// src/machine.rs - Machine state and the cooperative control loop
use std::collections::VecDeque;

use crate::communication::Outbound;
use crate::config::Config;
use crate::gcode::interpreter::Dispatch;
use crate::gcode::{CommandQueue, Immediate, Interpreter, Tokenizer};
use crate::hardware::{Board, Clock};
use crate::motion::{MotionDescriptor, StepExecutor};

/// Tool 0 is the laser; its output follows the move type.
pub const LASER_TOOL: u8 = 0;
pub const DEFAULT_TOOL: u8 = 1;

/// LED half-periods: 1 Hz blink while idle, 10 Hz while moving.
const IDLE_BLINK_US: u64 = 500_000;
const WORKING_BLINK_US: u64 = 50_000;

/// Active motion mode, G0 or G1. G92 is a one-line action and never stays active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    Rapid,
    Cut,
}

impl MotionMode {
    pub fn g_code(self) -> u8 {
        match self {
            MotionMode::Rapid => 0,
            MotionMode::Cut => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Running,
    Paused,
}

/// Everything that lives from power-on to the next reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    pub tool: u8,
    pub mode: MotionMode,
    /// M-code applied when the current move completes.
    pub pending_m_code: Option<i64>,
    pub feed_rate: u32,
    pub cut_feed_rate: u32,
    pub rapid_feed_rate: u32,
    /// Microseconds between dominant-axis steps for the move being executed.
    pub feed_interval: u64,
    pub cut_interval: u64,
    pub rapid_interval: u64,
    /// Authoritative position in steps.
    pub position: [i64; 3],
    pub pause: PauseState,
    pub spindle_speed: u32,
    pub motion: MotionDescriptor,
}

impl MachineState {
    /// The power-on state.
    pub fn new(config: &Config) -> Self {
        let machine = &config.machine;
        let rapid_interval = machine.interval_for(machine.rapid_feed_rate);
        Self {
            tool: DEFAULT_TOOL,
            mode: MotionMode::Rapid,
            pending_m_code: Some(5),
            feed_rate: machine.rapid_feed_rate,
            cut_feed_rate: machine.cut_feed_rate,
            rapid_feed_rate: machine.rapid_feed_rate,
            feed_interval: rapid_interval,
            cut_interval: machine.interval_for(machine.cut_feed_rate),
            rapid_interval,
            position: [0; 3],
            pause: PauseState::Running,
            spindle_speed: 0,
            motion: MotionDescriptor::default(),
        }
    }

    pub fn g_code(&self) -> u8 {
        self.mode.g_code()
    }

    pub fn status(&self) -> &'static str {
        if self.pause == PauseState::Paused {
            "paused"
        } else if self.motion.is_active() {
            "working"
        } else {
            "idle"
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Heartbeat {
    last_toggle: u64,
    on: bool,
}

impl Heartbeat {
    fn poll<B: Board>(&mut self, now: u64, working: bool, board: &mut B) {
        let half_period = if working { WORKING_BLINK_US } else { IDLE_BLINK_US };
        if now.saturating_sub(self.last_toggle) >= half_period {
            self.on = !self.on;
            self.last_toggle = now;
            board.set_status_led(self.on);
        }
    }
}

/// The controller: owns the state and runs tokenizer, interpreter and
/// executor in turn on every [`Machine::poll`].
///
/// Nothing here blocks. Bytes arrive through [`Machine::receive`] and
/// responses leave through [`Machine::take_output`].
pub struct Machine<B: Board, C: Clock> {
    config: Config,
    state: MachineState,
    inbound: VecDeque<u8>,
    queue: CommandQueue,
    tokenizer: Tokenizer,
    interpreter: Interpreter,
    executor: StepExecutor,
    heartbeat: Heartbeat,
    out: Outbound,
    board: B,
    clock: C,
}

impl<B: Board, C: Clock> Machine<B, C> {
    pub fn new(config: Config, board: B, clock: C) -> Self {
        tracing::info!(
            "Machine ready: {} steps/mm, queue {} tokens",
            config.machine.steps_per_mm,
            config.queue.capacity
        );
        Self {
            state: MachineState::new(&config),
            inbound: VecDeque::with_capacity(config.flow_control.rx_buffer_size),
            queue: CommandQueue::new(config.queue.capacity),
            tokenizer: Tokenizer::new(&config),
            interpreter: Interpreter::new(&config),
            executor: StepExecutor::new(&config),
            heartbeat: Heartbeat::default(),
            out: Outbound::new(),
            config,
            board,
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    /// Free space in the inbound byte buffer.
    pub fn rx_space(&self) -> usize {
        self.config.flow_control.rx_buffer_size.saturating_sub(self.inbound.len())
    }

    pub fn rx_backlog(&self) -> usize {
        self.inbound.len()
    }

    /// True while the sender has been sent XOFF and not yet XON.
    pub fn sender_held(&self) -> bool {
        self.tokenizer.sender_held()
    }

    /// Bytes a local feeder may hand over now. Zero while the sender is held.
    ///
    /// Otherwise the intake is capped so that the buffered bytes cannot
    /// overflow the queue between the next XOFF and the queue draining: every
    /// token costs at least one byte, so the cap is the slot count left above
    /// the XOFF fill level. A held sender with nothing runnable queued still
    /// gets one byte at a time, or a line longer than the XON level would
    /// never complete.
    pub fn intake_space(&self) -> usize {
        let capacity = self.queue.capacity();
        let xoff_at = (capacity * self.config.flow_control.xoff_queue_percent).div_ceil(100);
        let headroom = capacity.saturating_sub(1).saturating_sub(xoff_at).max(1);
        let limit = if !self.tokenizer.sender_held() {
            headroom.saturating_sub(self.inbound.len())
        } else if self.inbound.is_empty() && !self.queue.has_complete_line() && self.state.motion.is_idle() {
            1
        } else {
            0
        };
        limit.min(self.rx_space())
    }

    /// Buffer inbound bytes. Accepts at most [`Machine::rx_space`] bytes and
    /// returns how many were taken; the caller keeps the rest.
    pub fn receive(&mut self, bytes: &[u8]) -> usize {
        let accepted = bytes.len().min(self.rx_space());
        self.inbound.extend(&bytes[..accepted]);
        accepted
    }

    /// Bytes emitted since the last call: responses, XON and XOFF.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.out.take()
    }

    /// Nothing buffered, nothing queued, no move in flight.
    pub fn is_quiescent(&self) -> bool {
        self.inbound.is_empty()
            && self.queue.is_empty()
            && self.state.motion.is_idle()
            && !self.tokenizer.mid_line()
    }

    /// One control-loop iteration.
    pub fn poll(&mut self) {
        if let Some(immediate) = self.tokenizer.poll(&mut self.inbound, &mut self.queue, &mut self.out) {
            self.handle_immediate(immediate);
        }

        let dispatch = self
            .interpreter
            .poll(&mut self.state, &mut self.queue, &mut self.board, &mut self.out);
        if dispatch == Dispatch::Reset {
            tracing::info!("Program end, resetting");
            self.reset();
        }

        self.executor.poll(&mut self.state, &mut self.board, &self.clock);

        let now = self.clock.now_micros();
        let working = self.state.motion.is_active();
        self.heartbeat.poll(now, working, &mut self.board);
    }

    fn handle_immediate(&mut self, immediate: Immediate) {
        match immediate {
            Immediate::Reset => {
                tracing::info!("Reset requested");
                self.reset();
                self.out.ok();
            }
            Immediate::Pause => {
                tracing::info!("Paused with {} steps remaining", self.state.motion.remaining());
                self.state.pause = PauseState::Paused;
            }
            Immediate::Resume => {
                tracing::info!("Resumed");
                self.state.pause = PauseState::Running;
                self.out.ok();
            }
            Immediate::Status => self.report_status(),
        }
    }

    fn report_status(&mut self) {
        self.out.line(format!("$ Status: {}", self.state.status()));
        if self.state.tool == LASER_TOOL {
            self.out.line("$ Tool: laser");
        } else {
            self.out.line(format!("$ Tool: {}", self.state.tool));
        }
    }

    /// Discard all machine and motion state and start over as at power-on.
    /// Bytes still waiting in the inbound buffer are kept.
    pub fn reset(&mut self) {
        self.tokenizer.release_sender(&mut self.out);
        self.board.tool_off(self.state.tool);
        self.state = MachineState::new(&self.config);
        self.queue.clear();
        self.tokenizer = Tokenizer::new(&self.config);
        self.interpreter = Interpreter::new(&self.config);
        self.executor = StepExecutor::new(&self.config);
        self.heartbeat = Heartbeat::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{ManualClock, SimulatedBoard};

    #[test]
    fn test_power_on_state() {
        let state = MachineState::new(&Config::default());
        assert_eq!(state.tool, DEFAULT_TOOL);
        assert_eq!(state.g_code(), 0);
        assert_eq!(state.pending_m_code, Some(5));
        assert_eq!(state.pause, PauseState::Running);
        assert_eq!(state.position, [0, 0, 0]);
        assert_eq!(state.rapid_interval, 500);
        assert_eq!(state.cut_interval, 2500);
        assert_eq!(state.feed_interval, state.rapid_interval);
        assert_eq!(state.status(), "idle");
    }

    #[test]
    fn test_receive_respects_buffer_size() {
        let mut machine = Machine::new(Config::default(), SimulatedBoard::new(), ManualClock::new());
        let accepted = machine.receive(&[b' '; 100]);
        assert_eq!(accepted, 64);
        assert_eq!(machine.rx_space(), 0);
        machine.poll();
        assert_eq!(machine.rx_backlog(), 63);
    }

    #[test]
    fn test_intake_stops_while_sender_held() {
        let machine = Machine::new(Config::default(), SimulatedBoard::new(), ManualClock::new());
        // 63 usable slots, XOFF at 48.
        assert_eq!(machine.intake_space(), 15);

        let mut config = Config::default();
        config.queue.capacity = 8;
        let clock = ManualClock::new();
        let mut machine = Machine::new(config, SimulatedBoard::new(), clock.clone());
        assert_eq!(machine.intake_space(), 1);
        machine.receive(b"G1 X10\nX1 Y1 Z1 S1 T1\n");
        for _ in 0..100 {
            if machine.sender_held() {
                break;
            }
            machine.poll();
            clock.advance(50);
        }
        assert!(machine.sender_held());
        assert!(machine.state().motion.is_active());
        assert_eq!(machine.intake_space(), 0);
    }

    #[test]
    fn test_heartbeat_blinks_at_idle_rate() {
        let clock = ManualClock::new();
        let mut machine = Machine::new(Config::default(), SimulatedBoard::new(), clock.clone());
        for _ in 0..20 {
            clock.advance(100_000);
            machine.poll();
        }
        // Two seconds idle: a toggle every half second.
        assert_eq!(machine.board().led_toggles(), 4);
    }
}
