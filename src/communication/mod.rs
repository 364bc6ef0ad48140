// src/communication/mod.rs - Outbound stream and host session plumbing
pub mod outbound;
pub mod session;

pub use outbound::{Outbound, XOFF, XON};
pub use session::{run_session, AsyncSink, AsyncSource, ByteSink, ByteSource, SessionError};
