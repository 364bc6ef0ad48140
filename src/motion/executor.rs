//! Real-time step generation.
//!
//! [`StepExecutor::poll`] runs once per loop pass and emits at most one
//! synchronized step tick across the three axes. It never blocks beyond the
//! step pulse width.

use crate::config::{Config, RampConfig};
use crate::hardware::{Axis, Board, Clock, STEP_PULSE_WIDTH_US};
use crate::machine::{MachineState, PauseState};

use super::planner::{MotionDescriptor, MoveState};

impl MotionDescriptor {
    /// Advance the line by one dominant-axis step and report which axes step.
    ///
    /// A subordinate axis steps when its error term is non-negative (paying
    /// back `distance`), then always accrues its own travel. Axes that do not
    /// move never step.
    pub fn next_step(&mut self) -> [bool; 3] {
        let MoveState::Active { remaining } = self.state else {
            return [false; 3];
        };
        let mut stepping = [false; 3];
        for i in 0..3 {
            if i == self.dominant {
                stepping[i] = true;
                continue;
            }
            if self.abs_delta[i] == 0 {
                continue;
            }
            if self.error[i] >= 0 {
                stepping[i] = true;
                self.error[i] -= self.distance as i64;
            }
            self.error[i] += self.abs_delta[i] as i64;
        }
        self.completed += 1;
        self.state = match remaining - 1 {
            0 => MoveState::JustCompleted,
            remaining => MoveState::Active { remaining },
        };
        stepping
    }
}

#[derive(Debug, Clone)]
pub struct StepExecutor {
    ramp: RampConfig,
    last_step_at: u64,
}

impl StepExecutor {
    pub fn new(config: &Config) -> Self {
        Self {
            ramp: config.ramp.clone(),
            last_step_at: 0,
        }
    }

    /// Extra delay before the next step. Largest on the first and last step,
    /// zero once `window_steps` steps separate the tick from both ends.
    pub fn ramp_us(&self, completed: u64, remaining: u64) -> u64 {
        let from_edge = completed.min(remaining.saturating_sub(1));
        self.ramp.window_steps.saturating_sub(from_edge) * self.ramp.scale_us
    }

    /// Emit one step tick if it is due. Returns true when a tick was emitted.
    pub fn poll<B: Board, C: Clock>(&mut self, state: &mut MachineState, board: &mut B, clock: &C) -> bool {
        let now = clock.now_micros();
        if state.pause == PauseState::Paused || !state.motion.is_active() {
            // A resumed or fresh move waits one full interval before its first step.
            self.last_step_at = now;
            return false;
        }

        let due = state.feed_interval + self.ramp_us(state.motion.completed, state.motion.remaining());
        if now.saturating_sub(self.last_step_at) <= due {
            return false;
        }
        self.last_step_at = now;

        let stepping = state.motion.next_step();
        for axis in Axis::ALL {
            if stepping[axis.index()] {
                board.set_step(axis, true);
            }
        }
        clock.delay_micros(STEP_PULSE_WIDTH_US);
        for axis in Axis::ALL {
            let i = axis.index();
            if stepping[i] {
                board.set_step(axis, false);
                state.position[i] += i64::from(state.motion.direction[i]);
            }
        }
        tracing::trace!(
            "step {}/{} at {}us -> {:?}",
            state.motion.completed,
            state.motion.distance,
            now,
            state.position
        );
        if state.motion.state == MoveState::JustCompleted {
            tracing::debug!("Move complete at {:?}", state.position);
        }
        true
    }
}
