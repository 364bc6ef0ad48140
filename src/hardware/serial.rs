// src/hardware/serial.rs - Serial link to the G-code sender
use std::sync::Arc;

use async_trait::async_trait;
use serial2_tokio::SerialPort;

use crate::communication::{ByteSink, ByteSource};
use crate::config::SerialConfig;

/// An open serial port, shared by a reading and a writing half.
pub struct SerialLink {
    port: Arc<SerialPort>,
    name: String,
}

impl SerialLink {
    pub fn open(config: &SerialConfig) -> std::io::Result<Self> {
        tracing::info!("Opening serial link on {} at {} baud", config.port, config.baud);
        let port = SerialPort::open(&config.port, config.baud).map_err(|e| {
            tracing::error!("Failed to open serial port '{}': {}", config.port, e);
            e
        })?;
        Ok(Self {
            port: Arc::new(port),
            name: config.port.clone(),
        })
    }

    pub fn split(self) -> (SerialReader, SerialWriter) {
        tracing::debug!("Serial link {} split into reader and writer", self.name);
        (SerialReader(self.port.clone()), SerialWriter(self.port))
    }
}

pub struct SerialReader(Arc<SerialPort>);

#[async_trait]
impl ByteSource for SerialReader {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.0.read(buf).await?;
        tracing::trace!("Serial RX: {} bytes", n);
        Ok(n)
    }
}

pub struct SerialWriter(Arc<SerialPort>);

#[async_trait]
impl ByteSink for SerialWriter {
    async fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self.0.write(&data[written..]).await?;
            if n == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "serial port accepted no bytes"));
            }
            written += n;
        }
        tracing::trace!("Serial TX: {} bytes", data.len());
        Ok(())
    }
}
