/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Server-side connection acceptance.
//!
//! [`accept_loop`] turns accepted sockets into transports and hands them to a
//! [`ConnectionListener`]. [`AllowListListener`] filters by peer IP before any
//! byte is read.

use crate::codec::FixCodec;
use crate::transport::{FrameReader, TcpTransport, Transport};
use async_trait::async_trait;
use fixline_core::error::TransportError;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Receives newly accepted connections.
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    /// Called once per accepted connection.
    async fn on_connect(&self, transport: Arc<dyn Transport>, reader: FrameReader);
}

/// Listener decorator that drops connections from peers outside an allow-list.
#[derive(Debug)]
pub struct AllowListListener<L> {
    inner: L,
    allowed: HashSet<IpAddr>,
}

impl<L> AllowListListener<L> {
    /// Wraps `inner`, admitting only `allowed` peer addresses.
    pub fn new(inner: L, allowed: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            inner,
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Returns true if `ip` may connect.
    #[must_use]
    pub fn is_allowed(&self, ip: &IpAddr) -> bool {
        self.allowed.contains(ip)
    }
}

#[async_trait]
impl<L: ConnectionListener> ConnectionListener for AllowListListener<L> {
    async fn on_connect(&self, transport: Arc<dyn Transport>, reader: FrameReader) {
        match transport.remote_endpoint() {
            Some(addr) if self.is_allowed(&addr.ip()) => {
                self.inner.on_connect(transport, reader).await;
            }
            remote => {
                warn!(?remote, "connection refused by allow-list");
                transport.close().await;
            }
        }
    }
}

/// Accepts connections until `shutdown` is cancelled.
///
/// Each connection is handed to `handler` on its own task.
///
/// # Errors
/// Returns `TransportError` if accepting fails.
pub async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn ConnectionListener>,
    codec: FixCodec,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    info!(addr = ?listener.local_addr().ok(), "accepting connections");
    loop {
        let (stream, addr) = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        let (transport, reader) = match TcpTransport::from_stream(stream, codec.clone()) {
            Ok(halves) => halves,
            Err(e) => {
                warn!(%addr, error = %e, "failed to set up connection");
                continue;
            }
        };
        info!(%addr, "connection accepted");
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            handler.on_connect(transport, reader).await;
        });
    }
    info!("accept loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ChannelTransport;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl ConnectionListener for Arc<Counting> {
        async fn on_connect(&self, _transport: Arc<dyn Transport>, _reader: FrameReader) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_allow_list_filters_by_ip() {
        let counter = Arc::new(Counting::default());
        let listener =
            AllowListListener::new(Arc::clone(&counter), ["10.0.0.1".parse::<IpAddr>().unwrap()]);

        let allowed = SocketAddr::from(([10, 0, 0, 1], 5000));
        let (transport, reader, _peer) = ChannelTransport::pair_with_remote(allowed);
        listener.on_connect(transport.clone(), reader).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(transport.is_open());

        let denied = SocketAddr::from(([10, 0, 0, 2], 5000));
        let (transport, reader, _peer) = ChannelTransport::pair_with_remote(denied);
        listener.on_connect(transport.clone(), reader).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_accept_loop_stops_on_cancel() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let counter = Arc::new(Counting::default());
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(accept_loop(
            tcp,
            Arc::new(Arc::clone(&counter)),
            FixCodec::new(),
            shutdown.clone(),
        ));

        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();
        for _ in 0..50 {
            if counter.0.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
