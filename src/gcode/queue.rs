// src/gcode/queue.rs - Fixed-capacity circular token queue between tokenizer and interpreter
use thiserror::Error;

use super::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("command queue full")]
    Full,
}

/// Circular buffer of tokens. `head` is the next write slot, `tail` the next
/// unread one; the queue is empty when they are equal, so one slot always
/// stays free.
///
/// The consumer only drains whole lines. `line_start` marks where the line
/// being written began, which lets the producer roll back a line that did
/// not fit.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    slots: Box<[Token]>,
    head: usize,
    tail: usize,
    line_start: usize,
    complete_lines: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            slots: vec![Token::EndOfLine; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            line_start: 0,
            complete_lines: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    pub fn len(&self) -> usize {
        (self.head + self.capacity() - self.tail) % self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.advance(self.head) == self.tail
    }

    /// Number of queued lines whose terminator has arrived.
    pub fn complete_lines(&self) -> usize {
        self.complete_lines
    }

    pub fn has_complete_line(&self) -> bool {
        self.complete_lines > 0
    }

    /// Append a token. Never overwrites unread slots.
    pub fn push(&mut self, token: Token) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Full);
        }
        self.slots[self.head] = token;
        self.head = self.advance(self.head);
        if token == Token::EndOfLine {
            self.complete_lines += 1;
            self.line_start = self.head;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Token> {
        if self.is_empty() {
            return None;
        }
        let token = self.slots[self.tail];
        self.tail = self.advance(self.tail);
        if token == Token::EndOfLine {
            self.complete_lines -= 1;
        }
        Some(token)
    }

    /// Drop the tokens of the line still being written. Returns how many were removed.
    pub fn discard_open_line(&mut self) -> usize {
        let removed = (self.head + self.capacity() - self.line_start) % self.capacity();
        self.head = self.line_start;
        removed
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.line_start = 0;
        self.complete_lines = 0;
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_in_order() {
        let mut queue = CommandQueue::new(8);
        queue.push(Token::word('G', 1)).unwrap();
        queue.push(Token::word('X', 800)).unwrap();
        queue.push(Token::EndOfLine).unwrap();
        assert_eq!(queue.len(), 3);
        assert!(queue.has_complete_line());
        assert_eq!(queue.pop(), Some(Token::word('G', 1)));
        assert_eq!(queue.pop(), Some(Token::word('X', 800)));
        assert_eq!(queue.pop(), Some(Token::EndOfLine));
        assert_eq!(queue.pop(), None);
        assert!(!queue.has_complete_line());
    }

    #[test]
    fn test_full_queue_rejects_instead_of_overwriting() {
        let mut queue = CommandQueue::new(4);
        for i in 0..3 {
            queue.push(Token::word('S', i)).unwrap();
        }
        assert!(queue.is_full());
        assert_eq!(queue.push(Token::word('S', 99)), Err(QueueError::Full));
        assert_eq!(queue.pop(), Some(Token::word('S', 0)));
    }

    #[test]
    fn test_indices_stay_in_range_across_wraps() {
        let mut queue = CommandQueue::new(5);
        for round in 0..40 {
            queue.push(Token::word('T', round)).unwrap();
            queue.push(Token::EndOfLine).unwrap();
            assert!(queue.head() < queue.capacity() && queue.tail() < queue.capacity());
            assert_eq!(queue.pop(), Some(Token::word('T', round)));
            assert!(queue.head() < queue.capacity() && queue.tail() < queue.capacity());
            assert_eq!(queue.pop(), Some(Token::EndOfLine));
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn test_discard_open_line_keeps_complete_lines() {
        let mut queue = CommandQueue::new(8);
        queue.push(Token::word('M', 3)).unwrap();
        queue.push(Token::EndOfLine).unwrap();
        queue.push(Token::word('G', 0)).unwrap();
        queue.push(Token::word('X', 5)).unwrap();
        assert_eq!(queue.discard_open_line(), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.complete_lines(), 1);
        assert_eq!(queue.pop(), Some(Token::word('M', 3)));
        assert_eq!(queue.pop(), Some(Token::EndOfLine));
        assert!(queue.is_empty());
    }
}
