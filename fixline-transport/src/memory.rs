/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory transport for tests and in-process wiring.

use crate::codec::FixCodec;
use crate::transport::{FrameReader, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::TransportError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

/// Transport that captures every outbound frame on a channel.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Bytes>,
    open: AtomicBool,
    remote: SocketAddr,
    local: SocketAddr,
}

/// The far end of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelPeer {
    /// Frames the local side sent.
    pub outbound: mpsc::UnboundedReceiver<Bytes>,
    /// Bytes written here are read by the local side's [`FrameReader`].
    pub inbound: DuplexStream,
}

impl ChannelPeer {
    /// Feeds raw bytes to the local side.
    ///
    /// # Errors
    /// Returns `TransportError` if the local reader was dropped.
    pub async fn push(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inbound.write_all(bytes).await?;
        Ok(())
    }

    /// Drains every frame sent so far.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

impl ChannelTransport {
    /// Creates a connected in-memory transport.
    #[must_use]
    pub fn pair() -> (Arc<Self>, FrameReader, ChannelPeer) {
        Self::pair_with_remote(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    /// Same as [`ChannelTransport::pair`] with a chosen peer address.
    #[must_use]
    pub fn pair_with_remote(remote: SocketAddr) -> (Arc<Self>, FrameReader, ChannelPeer) {
        let (tx, outbound) = mpsc::unbounded_channel();
        let (local_io, inbound) = tokio::io::duplex(64 * 1024);
        let transport = Arc::new(Self {
            tx,
            open: AtomicBool::new(true),
            remote,
            local: SocketAddr::from(([127, 0, 0, 1], 9880)),
        });
        let reader = FrameReader::new(Box::new(local_io), FixCodec::new());
        (transport, reader, ChannelPeer { outbound, inbound })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
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

    #[tokio::test]
    async fn test_channel_transport_captures() {
        let (transport, mut reader, mut peer) = ChannelTransport::pair();

        transport.send(Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(peer.drain(), vec![Bytes::from_static(b"abc")]);

        let frame = b"8=FIX.4.4\x019=5\x0135=0\x0110=163\x01";
        peer.push(frame).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap().as_deref(), Some(&frame[..]));

        transport.close().await;
        assert!(transport.remote_endpoint().is_none());
        assert_eq!(
            transport.send(Bytes::new()).await,
            Err(TransportError::Closed)
        );
    }
}
