//! Line interpreter: turns one queued line at a time into machine-state
//! changes and a planned move.
//!
//! A line is only taken off the queue once its terminator has arrived and no
//! move is in flight, so the queue is always drained a whole line at a time.

use crate::communication::Outbound;
use crate::config::{Config, MachineConfig};
use crate::hardware::{Axis, Board};
use crate::machine::{LASER_TOOL, MachineState, MotionMode, PauseState};
use crate::motion::{plan_line, MoveState};

use super::{CommandQueue, Token};

/// What the control loop has to do after an interpreter pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Dispatch {
    Continue,
    /// `M30` finished: reinitialize everything.
    Reset,
}

/// Words collected from one line.
#[derive(Debug, Clone)]
struct Line {
    target: [i64; 3],
    axis_given: [bool; 3],
    feed_given: bool,
    set_position: bool,
}

#[derive(Debug, Clone)]
pub struct Interpreter {
    machine: MachineConfig,
    echo: bool,
}

impl Interpreter {
    pub fn new(config: &Config) -> Self {
        Self {
            machine: config.machine.clone(),
            echo: config.output.echo,
        }
    }

    /// One interpreter pass: end-of-move bookkeeping, then at most one line.
    pub fn poll<B: Board>(
        &mut self,
        state: &mut MachineState,
        queue: &mut CommandQueue,
        board: &mut B,
        out: &mut Outbound,
    ) -> Dispatch {
        if state.motion.state == MoveState::JustCompleted {
            state.motion.state = MoveState::Idle;
            if let Some(m_code) = state.pending_m_code.take() {
                if self.finish_m_code(m_code, state, board) == Dispatch::Reset {
                    return Dispatch::Reset;
                }
            }
        }

        if state.motion.is_active() || !queue.has_complete_line() {
            return Dispatch::Continue;
        }
        self.dispatch_line(state, queue, board, out);
        Dispatch::Continue
    }

    /// M-codes that take effect once the move of their line is done.
    fn finish_m_code<B: Board>(&self, m_code: i64, state: &mut MachineState, board: &mut B) -> Dispatch {
        match m_code {
            0 => {
                tracing::info!("M0: pausing");
                state.pause = PauseState::Paused;
            }
            5 => {
                if state.tool != LASER_TOOL {
                    board.tool_off(state.tool);
                }
            }
            30 => return Dispatch::Reset,
            _ => {}
        }
        Dispatch::Continue
    }

    fn dispatch_line<B: Board>(
        &mut self,
        state: &mut MachineState,
        queue: &mut CommandQueue,
        board: &mut B,
        out: &mut Outbound,
    ) {
        let mut line = Line {
            target: state.position,
            axis_given: [false; 3],
            feed_given: false,
            set_position: false,
        };

        while let Some(Token::Word { letter, value }) = queue.pop() {
            self.apply_word(letter, value, &mut line, state, board, out);
        }
        out.ok();

        if line.set_position {
            for axis in Axis::ALL {
                let i = axis.index();
                if line.axis_given[i] {
                    state.position[i] = line.target[i];
                }
            }
            tracing::debug!("G92: position is now {:?}", state.position);
            return;
        }

        match state.mode {
            MotionMode::Rapid => {
                if line.feed_given {
                    state.rapid_feed_rate = state.feed_rate;
                    state.rapid_interval = state.feed_interval;
                } else {
                    state.feed_rate = state.rapid_feed_rate;
                    state.feed_interval = state.rapid_interval;
                }
            }
            MotionMode::Cut => {
                if line.feed_given {
                    state.cut_feed_rate = state.feed_rate;
                    state.cut_interval = state.feed_interval;
                } else {
                    state.feed_rate = state.cut_feed_rate;
                    state.feed_interval = state.cut_interval;
                }
            }
        }

        if state.tool == LASER_TOOL {
            line.target[Axis::Z.index()] = state.position[Axis::Z.index()];
            match state.mode {
                MotionMode::Cut => board.tool_on(LASER_TOOL, state.spindle_speed),
                MotionMode::Rapid => board.tool_off(LASER_TOOL),
            }
        }

        state.motion = plan_line(state.position, line.target);
        for axis in Axis::ALL {
            let i = axis.index();
            let forward = state.motion.direction[i] > 0;
            board.set_direction(axis, forward ^ self.machine.invert_direction[i]);
        }
    }

    fn apply_word<B: Board>(
        &self,
        letter: u8,
        value: i64,
        line: &mut Line,
        state: &mut MachineState,
        board: &mut B,
        out: &mut Outbound,
    ) {
        match letter {
            b'G' => {
                match value {
                    0 => state.mode = MotionMode::Rapid,
                    1 => state.mode = MotionMode::Cut,
                    92 => {}
                    _ => {
                        tracing::debug!("Ignoring unsupported G{}", value);
                        return;
                    }
                }
                line.set_position = value == 92;
                line.axis_given = [false; 3];
                line.feed_given = false;
            }
            b'X' | b'Y' | b'Z' => {
                if let Some(axis) = Axis::from_letter(letter) {
                    line.target[axis.index()] = value;
                    line.axis_given[axis.index()] = true;
                }
            }
            b'F' => {
                let feed = value.clamp(1, i64::from(u32::MAX)) as u32;
                state.feed_rate = feed;
                state.feed_interval = self.machine.interval_for(feed);
                line.feed_given = true;
            }
            b'S' => state.spindle_speed = value.clamp(0, i64::from(u32::MAX)) as u32,
            b'T' => state.tool = value.clamp(0, 255) as u8,
            b'M' => {
                state.pending_m_code = Some(value);
                if value == 3 && state.tool != LASER_TOOL {
                    board.tool_on(state.tool, state.spindle_speed);
                }
            }
            _ => {
                tracing::debug!("Ignoring word {}{}", letter as char, value);
                return;
            }
        }

        tracing::debug!("{} set to {}", letter as char, value);
        if self.echo {
            out.line(format!("{} set to {}", letter as char, value));
        }
    }
}
