//! Byte-at-a-time G-code tokenizer with XON/XOFF flow control.
//!
//! Each call to [`Tokenizer::poll`] consumes at most one inbound byte, so the
//! step executor never waits on the serial link. Comments are stripped,
//! letters are upper-cased and the text following a letter is turned into a
//! [`Token`] when the next letter or the end of the line arrives.
//!
//! `%`, `!`, `~` and `?` bypass the queue entirely and are returned to the
//! caller as an [`Immediate`], even inside a comment.

use std::collections::VecDeque;

use crate::communication::Outbound;
use crate::config::{Config, FlowControlConfig};

use super::{CommandQueue, Token};

/// Digits kept after the decimal point of an axis value.
const MAX_FRACTION_DIGITS: u32 = 6;
/// Longest numeric text accumulated for one word; the rest is ignored.
const MAX_NUMBER_LEN: usize = 24;
/// Largest axis magnitude in steps. The difference of any two positions
/// stays well inside `i64`.
pub const MAX_AXIS_STEPS: i64 = 1 << 53;

/// Single-character commands acted on as soon as they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    /// `%`: reinitialize everything as at power-on.
    Reset,
    /// `!`
    Pause,
    /// `~`
    Resume,
    /// `?`
    Status,
}

impl Immediate {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'%' => Some(Immediate::Reset),
            b'!' => Some(Immediate::Pause),
            b'~' => Some(Immediate::Resume),
            b'?' => Some(Immediate::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comment {
    None,
    ToEndOfLine,
    Parenthesized,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    steps_per_mm: f64,
    flow: FlowControlConfig,
    comment: Comment,
    last_terminator: Option<u8>,
    letter: Option<u8>,
    number: String,
    dropping_line: bool,
    sender_held: bool,
}

impl Tokenizer {
    pub fn new(config: &Config) -> Self {
        Self {
            steps_per_mm: config.machine.steps_per_mm,
            flow: config.flow_control.clone(),
            comment: Comment::None,
            last_terminator: None,
            letter: None,
            number: String::with_capacity(MAX_NUMBER_LEN),
            dropping_line: false,
            sender_held: false,
        }
    }

    /// True while an XOFF is outstanding.
    pub fn sender_held(&self) -> bool {
        self.sender_held
    }

    /// True when part of a line has been consumed but its terminator has not.
    pub fn mid_line(&self) -> bool {
        self.letter.is_some() || self.dropping_line || self.comment != Comment::None
    }

    /// One tokenizer pass: update flow control, then consume at most one byte.
    pub fn poll(
        &mut self,
        inbound: &mut VecDeque<u8>,
        queue: &mut CommandQueue,
        out: &mut Outbound,
    ) -> Option<Immediate> {
        self.update_flow_control(inbound.len(), queue, out);
        let byte = inbound.pop_front()?;
        self.feed(byte, queue, out)
    }

    /// Send XON if the sender is currently held off. Used before a reset
    /// replaces this tokenizer.
    pub fn release_sender(&mut self, out: &mut Outbound) {
        if self.sender_held {
            out.xon();
            self.sender_held = false;
        }
    }

    fn update_flow_control(&mut self, backlog: usize, queue: &CommandQueue, out: &mut Outbound) {
        let fill = queue.len() * 100;
        let capacity = queue.capacity();
        if !self.sender_held {
            if backlog > self.flow.xoff_rx_threshold || fill >= capacity * self.flow.xoff_queue_percent {
                tracing::debug!("XOFF: backlog {} bytes, queue {}/{}", backlog, queue.len(), capacity);
                out.xoff();
                self.sender_held = true;
            }
        } else if backlog < self.flow.xon_rx_threshold && fill < capacity * self.flow.xon_queue_percent {
            tracing::debug!("XON: backlog {} bytes, queue {}/{}", backlog, queue.len(), capacity);
            out.xon();
            self.sender_held = false;
        }
    }

    /// Consume one byte.
    pub fn feed(&mut self, byte: u8, queue: &mut CommandQueue, out: &mut Outbound) -> Option<Immediate> {
        if let Some(immediate) = Immediate::from_byte(byte) {
            return Some(immediate);
        }

        if byte == b'\r' || byte == b'\n' {
            match self.last_terminator {
                // Second half of a CR LF / LF CR pair.
                Some(previous) if previous != byte => self.last_terminator = None,
                _ => {
                    self.end_line(queue, out);
                    self.last_terminator = Some(byte);
                }
            }
            return None;
        }
        self.last_terminator = None;

        match self.comment {
            Comment::ToEndOfLine => return None,
            Comment::Parenthesized => {
                if byte == b')' {
                    self.comment = Comment::None;
                }
                return None;
            }
            Comment::None => {}
        }

        match byte.to_ascii_uppercase() {
            b'*' | b';' => self.comment = Comment::ToEndOfLine,
            b'(' => self.comment = Comment::Parenthesized,
            letter @ b'A'..=b'Z' => {
                self.finish_word(queue, out);
                self.letter = Some(letter);
            }
            c @ (b'0'..=b'9' | b'-' | b'.') => {
                if self.letter.is_some() && self.number.len() < MAX_NUMBER_LEN {
                    self.number.push(c as char);
                }
            }
            _ => {}
        }
        None
    }

    fn end_line(&mut self, queue: &mut CommandQueue, out: &mut Outbound) {
        self.finish_word(queue, out);
        if !self.dropping_line {
            self.push(Token::EndOfLine, queue, out);
        }
        self.dropping_line = false;
        self.comment = Comment::None;
    }

    fn finish_word(&mut self, queue: &mut CommandQueue, out: &mut Outbound) {
        let Some(letter) = self.letter.take() else {
            return;
        };
        let value = match letter {
            b'X' | b'Y' | b'Z' => parse_axis_value(&self.number, self.steps_per_mm),
            _ => parse_integer(&self.number),
        };
        self.number.clear();
        if !self.dropping_line {
            tracing::trace!("token {}={}", letter as char, value);
            self.push(Token::Word { letter, value }, queue, out);
        }
    }

    fn push(&mut self, token: Token, queue: &mut CommandQueue, out: &mut Outbound) {
        if queue.push(token).is_err() {
            let removed = queue.discard_open_line();
            tracing::warn!("Command queue full, dropping line ({} queued tokens discarded)", removed);
            out.line("error: command queue full, line dropped");
            self.dropping_line = true;
        }
    }
}

struct Decimal {
    negative: bool,
    whole: i64,
    fraction: i64,
    fraction_digits: u32,
}

fn parse_decimal(text: &str) -> Decimal {
    let mut bytes = text.bytes().peekable();
    let negative = bytes.next_if_eq(&b'-').is_some();
    let mut decimal = Decimal { negative, whole: 0, fraction: 0, fraction_digits: 0 };
    let mut seen_point = false;
    for b in bytes {
        match b {
            b'0'..=b'9' if !seen_point => {
                decimal.whole = decimal.whole.saturating_mul(10).saturating_add(i64::from(b - b'0'));
            }
            b'0'..=b'9' => {
                if decimal.fraction_digits < MAX_FRACTION_DIGITS {
                    decimal.fraction = decimal.fraction * 10 + i64::from(b - b'0');
                    decimal.fraction_digits += 1;
                }
            }
            b'.' if !seen_point => seen_point = true,
            _ => break,
        }
    }
    decimal
}

/// Convert decimal millimetre text to whole steps, rounding half away from zero.
///
/// Integral `steps_per_mm` values convert exactly; others go through a
/// floating-point scale. Magnitudes are clamped to [`MAX_AXIS_STEPS`].
pub fn parse_axis_value(text: &str, steps_per_mm: f64) -> i64 {
    let decimal = parse_decimal(text);
    let magnitude = if steps_per_mm.fract() == 0.0 && steps_per_mm <= 1_000_000.0 {
        let scale = 10i128.pow(decimal.fraction_digits);
        let numerator = i128::from(decimal.whole) * scale + i128::from(decimal.fraction);
        let steps = (numerator * steps_per_mm as i128 * 2 + scale) / (scale * 2);
        steps.min(i128::from(MAX_AXIS_STEPS)) as i64
    } else {
        let mm = decimal.whole as f64 + decimal.fraction as f64 / 10f64.powi(decimal.fraction_digits as i32);
        ((mm * steps_per_mm).round() as i64).min(MAX_AXIS_STEPS)
    };
    if decimal.negative { -magnitude } else { magnitude }
}

/// Leading signed integer of `text`; anything from the first non-digit on is ignored.
pub fn parse_integer(text: &str) -> i64 {
    let mut bytes = text.bytes().peekable();
    let negative = bytes.next_if_eq(&b'-').is_some();
    let magnitude = bytes
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, b| acc.saturating_mul(10).saturating_add(i64::from(b - b'0')));
    if negative { -magnitude } else { magnitude }
}
