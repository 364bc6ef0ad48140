// src/motion/mod.rs
pub mod executor;
pub mod planner;

pub use executor::StepExecutor;
pub use planner::{plan_line, MotionDescriptor, MoveState};
