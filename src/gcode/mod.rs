// src/gcode/mod.rs
pub mod interpreter;
pub mod queue;
pub mod tokenizer;

pub use interpreter::Interpreter;
pub use queue::{CommandQueue, QueueError};
pub use tokenizer::{Immediate, Tokenizer};

/// One decoded word, or the end of a line.
///
/// Axis words carry their value already converted to steps; every other
/// letter carries a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Token {
    Word { letter: u8, value: i64 },
    #[default]
    EndOfLine,
}

impl Token {
    pub fn word(letter: char, value: i64) -> Self {
        Token::Word { letter: letter as u8, value }
    }
}
