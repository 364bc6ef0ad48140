// src/motion/planner.rs - Per-line move planning on the integer step grid
use crate::hardware::Axis;

/// Lifecycle of the single move in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveState {
    #[default]
    Idle,
    Active { remaining: u64 },
    /// Set for exactly one loop pass after the last step (or immediately for a
    /// zero-length move) so end-of-move M-codes run once.
    JustCompleted,
}

/// Everything the step executor needs to trace one straight line.
///
/// Deltas, directions and error terms are fixed when the move is planned;
/// only the executor's per-step update changes the error terms afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotionDescriptor {
    pub target: [i64; 3],
    pub delta: [i64; 3],
    pub abs_delta: [u64; 3],
    pub direction: [i8; 3],
    pub error: [i64; 3],
    pub dominant: usize,
    /// Step count of the dominant axis.
    pub distance: u64,
    pub completed: u64,
    pub state: MoveState,
}

impl MotionDescriptor {
    pub fn is_active(&self) -> bool {
        matches!(self.state, MoveState::Active { .. })
    }

    pub fn is_idle(&self) -> bool {
        self.state == MoveState::Idle
    }

    pub fn remaining(&self) -> u64 {
        match self.state {
            MoveState::Active { remaining } => remaining,
            _ => 0,
        }
    }

    pub fn dominant_axis(&self) -> Axis {
        Axis::ALL[self.dominant]
    }
}

/// Plan a straight move from `current` to `target`, both in steps.
///
/// The dominant axis is the one with the largest travel, ties going to X,
/// then Y, then Z. It steps on every tick; the others follow a midpoint
/// error term seeded with `abs_delta - distance / 2`.
pub fn plan_line(current: [i64; 3], target: [i64; 3]) -> MotionDescriptor {
    let mut delta = [0i64; 3];
    let mut abs_delta = [0u64; 3];
    let mut direction = [0i8; 3];
    for i in 0..3 {
        delta[i] = target[i] - current[i];
        abs_delta[i] = delta[i].unsigned_abs();
        direction[i] = delta[i].signum() as i8;
    }

    let mut dominant = 0;
    for i in 1..3 {
        if abs_delta[i] > abs_delta[dominant] {
            dominant = i;
        }
    }
    let distance = abs_delta[dominant];

    let mut error = [0i64; 3];
    for i in 0..3 {
        if i != dominant {
            error[i] = abs_delta[i] as i64 - (distance >> 1) as i64;
        }
    }

    let state = if distance == 0 {
        MoveState::JustCompleted
    } else {
        MoveState::Active { remaining: distance }
    };

    tracing::debug!(
        "Planned move {:?} -> {:?}: dominant {}, {} steps",
        current,
        target,
        Axis::ALL[dominant].letter(),
        distance
    );

    MotionDescriptor {
        target,
        delta,
        abs_delta,
        direction,
        error,
        dominant,
        distance,
        completed: 0,
        state,
    }
}
