// src/communication/outbound.rs - Bytes waiting to go back to the sender
pub const XON: u8 = 0x11;
pub const XOFF: u8 = 0x13;

/// Line-oriented responses interleaved with XON/XOFF bytes, in emission order.
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    buf: Vec<u8>,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.buf.extend_from_slice(text.as_ref().as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn ok(&mut self) {
        self.line("ok");
    }

    pub fn xon(&mut self) {
        self.buf.push(XON);
    }

    pub fn xoff(&mut self) {
        self.buf.push(XOFF);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Hand over everything emitted so far.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}
