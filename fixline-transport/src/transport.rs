/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Transport boundary.
//!
//! A [`Transport`] accepts outbound frames; a [`FrameReader`] yields inbound
//! frames. The two halves are independent so the read loop never contends
//! with writers.

use crate::codec::FixCodec;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use fixline_core::error::TransportError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

/// Outbound half of a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes one complete frame.
    ///
    /// # Errors
    /// Returns `TransportError::Closed` once the transport has been closed.
    async fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Closes the connection. Idempotent.
    async fn close(&self);

    /// Returns true while the connection is usable.
    fn is_open(&self) -> bool;

    /// Peer address, only while open.
    fn remote_endpoint(&self) -> Option<SocketAddr>;

    /// Local address, only while open.
    fn local_endpoint(&self) -> Option<SocketAddr>;
}

/// Boxed byte source feeding a [`FrameReader`].
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Inbound half of a connection: yields framed messages.
pub struct FrameReader {
    io: ByteSource,
    codec: FixCodec,
    buf: BytesMut,
}

impl FrameReader {
    /// Creates a reader framing bytes from `io` with `codec`.
    #[must_use]
    pub fn new(io: ByteSource, codec: FixCodec) -> Self {
        Self {
            io,
            codec,
            buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Returns the next complete frame, or `None` at end of stream.
    ///
    /// A partial frame left at end of stream is dropped.
    ///
    /// # Errors
    /// Returns `TransportError` on I/O failure or an unrecoverable framing
    /// error such as an oversized message.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            if let Some(frame) = self
                .codec
                .decode(&mut self.buf)
                .map_err(|e| TransportError::Framing(e.to_string()))?
            {
                return Ok(Some(frame));
            }
            let n = self.io.read_buf(&mut self.buf).await?;
            if n == 0 {
                if !self.buf.is_empty() {
                    debug!(bytes = self.buf.len(), "dropping partial frame at eof");
                }
                return Ok(None);
            }
            trace!(bytes = n, "read");
        }
    }

    /// Returns the number of bytes discarded while resynchronising.
    #[must_use]
    pub fn discarded_bytes(&self) -> u64 {
        self.codec.discarded_bytes()
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("buffered", &self.buf.len())
            .finish_non_exhaustive()
    }
}

/// TCP transport over a split `TcpStream`.
#[derive(Debug)]
pub struct TcpTransport {
    writer: Mutex<Option<OwnedWriteHalf>>,
    open: AtomicBool,
    local: SocketAddr,
    remote: SocketAddr,
}

impl TcpTransport {
    /// Wraps an established stream, returning both halves.
    ///
    /// # Errors
    /// Returns `TransportError` if the socket addresses cannot be read.
    pub fn from_stream(
        stream: TcpStream,
        codec: FixCodec,
    ) -> Result<(Arc<Self>, FrameReader), TransportError> {
        stream.set_nodelay(true)?;
        let local = stream.local_addr()?;
        let remote = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let transport = Arc::new(Self {
            writer: Mutex::new(Some(write_half)),
            open: AtomicBool::new(true),
            local,
            remote,
        });
        Ok((transport, FrameReader::new(Box::new(read_half), codec)))
    }

    /// Connects to `addr`.
    ///
    /// # Errors
    /// Returns `TransportError` if the connection cannot be established.
    pub async fn connect(
        addr: SocketAddr,
        codec: FixCodec,
    ) -> Result<(Arc<Self>, FrameReader), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(%addr, "connected");
        Self::from_stream(stream, codec)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        if let Err(e) = writer.write_all(&frame).await {
            self.open.store(false, Ordering::Release);
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
            debug!(remote = %self.remote, "transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.is_open().then_some(self.remote)
    }

    fn local_endpoint(&self) -> Option<SocketAddr> {
        self.is_open().then_some(self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const HEARTBEAT: &[u8] = b"8=FIX.4.4\x019=5\x0135=0\x0110=163\x01";

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (_transport, mut reader) = TcpTransport::from_stream(stream, FixCodec::new()).unwrap();
            reader.next_frame().await.unwrap()
        });

        let (client, _reader) = TcpTransport::connect(addr, FixCodec::new()).await.unwrap();
        assert_eq!(client.remote_endpoint(), Some(addr));
        client.send(Bytes::from_static(HEARTBEAT)).await.unwrap();

        let frame = server.await.unwrap().unwrap();
        assert_eq!(&frame[..], HEARTBEAT);

        client.close().await;
        assert!(!client.is_open());
        assert_eq!(client.remote_endpoint(), None);
        assert_eq!(
            client.send(Bytes::from_static(HEARTBEAT)).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_frame_reader_eof() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(Box::new(rx), FixCodec::new());
        tx.write_all(HEARTBEAT).await.unwrap();
        tx.write_all(b"8=FIX.4.4\x019=").await.unwrap();
        drop(tx);

        assert_eq!(reader.next_frame().await.unwrap().as_deref(), Some(HEARTBEAT));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }
}
