// src/lib.rs - Three-axis G-code motion controller for laser engravers and small mills
pub mod communication;
pub mod config;
pub mod gcode;
pub mod hardware;
pub mod machine;
pub mod motion;

pub use config::{load_config, Config, ConfigError};
pub use machine::{Machine, MachineState, MotionMode, PauseState};
