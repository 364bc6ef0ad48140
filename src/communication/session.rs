//! Host session: bridges an async byte link to the polled control loop.
//!
//! A reader task forwards inbound chunks over a bounded channel. The loop
//! hands bytes to the machine only while it is not holding the sender off and
//! has room for them, polls it, and writes whatever it emitted back to the
//! link.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::config::ConfigError;
use crate::hardware::{Board, Clock};
use crate::machine::{Machine, PauseState};

const INBOUND_CHANNEL_DEPTH: usize = 16;
const READ_CHUNK: usize = 256;
/// Loop passes between cooperative yields while the machine is busy.
const POLLS_PER_YIELD: u32 = 32;
const IDLE_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Link error: {0}")]
    Link(String),
}

/// Where inbound G-code comes from.
#[async_trait]
pub trait ByteSource: Send + 'static {
    /// Read some bytes; `Ok(0)` means the link is closed.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Where responses go.
#[async_trait]
pub trait ByteSink: Send {
    async fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// Any tokio reader: stdin, files, pipes.
pub struct AsyncSource<R>(pub R);

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> ByteSource for AsyncSource<R> {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf).await
    }
}

/// Any tokio writer: stdout, pipes.
pub struct AsyncSink<W>(pub W);

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ByteSink for AsyncSink<W> {
    async fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.0.write_all(data).await?;
        self.0.flush().await
    }
}

async fn read_loop<S: ByteSource>(mut source: S, tx: mpsc::Sender<Vec<u8>>) -> std::io::Result<()> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = source.read_chunk(&mut buf).await?;
        if n == 0 {
            tracing::info!("Inbound link closed");
            return Ok(());
        }
        if tx.send(buf[..n].to_vec()).await.is_err() {
            return Ok(());
        }
    }
}

enum Received {
    Chunk(Vec<u8>),
    Nothing,
    Closed,
}

/// True when the stream ended in the middle of a line that still needs its terminator.
fn ends_mid_line(last: Option<u8>) -> bool {
    matches!(last, Some(b) if !matches!(b, b'\r' | b'\n' | b'%' | b'!' | b'~' | b'?'))
}

/// Run the control loop against a link until the source closes and the
/// machine has finished everything it received.
pub async fn run_session<B, C, S, W>(machine: &mut Machine<B, C>, source: S, mut sink: W) -> Result<(), SessionError>
where
    B: Board,
    C: Clock,
    S: ByteSource,
    W: ByteSink,
{
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(INBOUND_CHANNEL_DEPTH);
    let reader = tokio::spawn(read_loop(source, tx));

    let mut pending: VecDeque<u8> = VecDeque::new();
    let mut source_open = true;
    let mut last_byte: Option<u8> = None;
    let mut polls: u32 = 0;

    tracing::info!("Session started");
    loop {
        if source_open && pending.is_empty() {
            let received = if machine.is_quiescent() {
                // Nothing to do but blink: wait for input without spinning.
                match tokio::time::timeout(IDLE_WAIT, rx.recv()).await {
                    Ok(Some(chunk)) => Received::Chunk(chunk),
                    Ok(None) => Received::Closed,
                    Err(_) => Received::Nothing,
                }
            } else {
                match rx.try_recv() {
                    Ok(chunk) => Received::Chunk(chunk),
                    Err(TryRecvError::Empty) => Received::Nothing,
                    Err(TryRecvError::Disconnected) => Received::Closed,
                }
            };
            match received {
                Received::Chunk(chunk) => {
                    last_byte = chunk.last().copied().or(last_byte);
                    pending.extend(chunk);
                }
                Received::Nothing => {}
                Received::Closed => {
                    source_open = false;
                    if ends_mid_line(last_byte) {
                        pending.push_back(b'\n');
                    }
                }
            }
        }

        // A file or pipe cannot see XOFF, so the session honors it here.
        let take = pending.len().min(machine.intake_space());
        if take > 0 {
            let bytes: Vec<u8> = pending.drain(..take).collect();
            machine.receive(&bytes);
        }

        machine.poll();

        let output = machine.take_output();
        if !output.is_empty() {
            sink.write_chunk(&output).await?;
        }

        if !source_open {
            if pending.is_empty() && machine.is_quiescent() {
                break;
            }
            let stalled = pending.is_empty() || machine.sender_held();
            if machine.state().pause == PauseState::Paused && machine.rx_backlog() == 0 && stalled {
                tracing::warn!(
                    "Link closed while paused; {} queued tokens and {} bytes left unexecuted",
                    machine.queue().len(),
                    pending.len()
                );
                break;
            }
        }

        polls = polls.wrapping_add(1);
        if polls % POLLS_PER_YIELD == 0 {
            tokio::task::yield_now().await;
        }
    }

    tracing::info!("Session finished at {:?}", machine.state().position);
    match reader.await {
        Ok(result) => result.map_err(SessionError::from),
        Err(e) => Err(SessionError::Link(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ends_mid_line() {
        assert!(ends_mid_line(Some(b'5')));
        assert!(!ends_mid_line(Some(b'\n')));
        assert!(!ends_mid_line(Some(b'?')));
        assert!(!ends_mid_line(None));
    }
}
