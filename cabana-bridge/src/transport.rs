//! The write side of the bus.
//!
//! Reads are handled by the engine's codec-driven task; writes go through
//! this trait so the queue can own a real byte stream, the mock bus, or a
//! test stub interchangeably.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[async_trait]
pub trait BusTransport: Send {
    /// Write one encoded frame. Whole-frame writes only: the bus has no
    /// recovery story for a partially flushed frame.
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// A transport over any async byte sink (TCP serial bridge, pty, ...).
pub struct StreamTransport<W> {
    writer: W,
}

impl<W> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> BusTransport for StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}
