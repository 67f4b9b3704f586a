/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The running engine.
//!
//! Each bound connection gets two tasks: a read loop feeding frames to the
//! session and a timer task driving heartbeats and timeouts. Both stop on the
//! connection's `CancellationToken`, a child of the engine's shutdown token.

use crate::registry::{SessionFactory, SessionRegistry, UnregisteredPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::{FixError, SessionError, TransportError};
use fixline_core::message::MsgType;
use fixline_core::tags;
use fixline_core::types::{SessionId, Timestamp};
use fixline_session::{OutboundMessage, Role, Session, SessionState, StatsSnapshot};
use fixline_tagvalue::{Decoder, Encoder};
use fixline_transport::{
    AllowListListener, ConnectionListener, FixCodec, FrameReader, TcpTransport, Transport,
    accept_loop,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Engine-wide state shared with connection tasks.
pub(crate) struct Shared {
    pub(crate) registry: SessionRegistry,
    pub(crate) factory: SessionFactory,
    pub(crate) unregistered: UnregisteredPolicy,
    pub(crate) allowed_ips: Option<Vec<IpAddr>>,
    pub(crate) codec: FixCodec,
    pub(crate) timer_interval: Duration,
    pub(crate) logon_timeout: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) shutdown: CancellationToken,
}

/// A FIX engine hosting any number of sessions.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub(crate) fn new(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.shared.registry
    }

    /// Looks up a session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.shared.registry.get(id)
    }

    /// Returns a snapshot of the engine-wide counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.factory.stats.snapshot()
    }

    /// Opens a TCP connection for an initiator session and logs on.
    ///
    /// # Errors
    /// Returns an error if the session is unknown, is not an initiator, is
    /// already connected, or the connection cannot be established.
    pub async fn connect(&self, id: &SessionId, addr: SocketAddr) -> Result<(), FixError> {
        let session = self.initiator(id)?;
        let connect = TcpTransport::connect(addr, self.shared.codec.clone());
        let (transport, reader) = tokio::time::timeout(self.shared.connect_timeout, connect)
            .await
            .map_err(|_| TransportError::Io(format!("connect to {addr} timed out")))??;
        info!(session = %id, %addr, "connected");
        self.bind(session, transport, reader).await
    }

    /// Binds an initiator session to an already established connection and
    /// logs on.
    ///
    /// # Errors
    /// Same as [`Engine::connect`], minus the connection step.
    pub async fn attach(
        &self,
        id: &SessionId,
        transport: Arc<dyn Transport>,
        reader: FrameReader,
    ) -> Result<(), FixError> {
        let session = self.initiator(id)?;
        self.bind(session, transport, reader).await
    }

    fn initiator(&self, id: &SessionId) -> Result<Arc<Session>, SessionError> {
        let session = self
            .session(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        if session.config().role != Role::Initiator {
            return Err(SessionError::Configuration(format!(
                "session {id} is not an initiator"
            )));
        }
        Ok(session)
    }

    async fn bind(
        &self,
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
        reader: FrameReader,
    ) -> Result<(), FixError> {
        let id = session.id().clone();
        if !self.shared.registry.claim(&id) {
            transport.close().await;
            return Err(SessionError::DuplicateSession(id.to_string()).into());
        }
        if let Err(error) = session.start(Arc::clone(&transport), Instant::now()).await {
            self.shared.registry.release(&id);
            transport.close().await;
            return Err(error.into());
        }
        let shared = Arc::clone(&self.shared);
        tokio::spawn(run_connection(shared, session, reader, None));
        Ok(())
    }

    /// Accepts connections on `listener` until shutdown.
    ///
    /// Peers outside the allow-list are dropped before any byte is read; the
    /// first message must be a Logon for a registered session, or one the
    /// unregistered-session policy admits.
    ///
    /// # Errors
    /// Returns `TransportError` if accepting fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), TransportError> {
        let acceptor = Acceptor {
            shared: Arc::clone(&self.shared),
        };
        let handler: Arc<dyn ConnectionListener> = match &self.shared.allowed_ips {
            Some(ips) => Arc::new(AllowListListener::new(acceptor, ips.iter().copied())),
            None => Arc::new(acceptor),
        };
        accept_loop(
            listener,
            handler,
            self.shared.codec.clone(),
            self.shared.shutdown.child_token(),
        )
        .await
    }

    /// Sends an application message on a session.
    ///
    /// # Errors
    /// Returns `SessionError::UnknownSession` for an unknown identity, or the
    /// session's own send error.
    pub async fn send(&self, id: &SessionId, message: OutboundMessage) -> Result<u64, FixError> {
        let session = self
            .session(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        session.send(message).await
    }

    /// Starts an orderly logout of one session.
    ///
    /// # Errors
    /// Returns `SessionError::UnknownSession` for an unknown identity.
    pub async fn logout(&self, id: &SessionId, text: &str) -> Result<(), SessionError> {
        let session = self
            .session(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        session.request_logout(text, Instant::now()).await;
        Ok(())
    }

    /// Logs out every connected session, waits for them to disconnect (at
    /// most `grace`), then stops all connection tasks and the accept loop.
    pub async fn shutdown(&self, text: &str, grace: Duration) {
        info!(text, "engine shutting down");
        let registry = &self.shared.registry;
        for session in registry.sessions() {
            if registry.is_live(session.id()) {
                session.request_logout(text, Instant::now()).await;
            }
        }
        let drained = tokio::time::timeout(grace, async {
            while registry.sessions().iter().any(|s| registry.is_live(s.id())) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("sessions still connected after shutdown grace period");
        }
        self.shared.shutdown.cancel();
    }
}

/// Why an inbound connection was not bound.
struct Refusal {
    reason: String,
    /// Logout to write before closing, when the peer sent a Logon we can
    /// address a reply to.
    reply: Option<Bytes>,
}

impl Refusal {
    fn silent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            reply: None,
        }
    }
}

/// Header fields of a refused Logon.
struct Caller {
    begin_string: String,
    sender: String,
    target: String,
}

impl Caller {
    /// Answers the Logon with a Logout (MsgSeqNum 1) carrying `reason`.
    fn refuse(&self, reason: String) -> Refusal {
        let mut enc = Encoder::new(&self.begin_string);
        enc.put_str(tags::MSG_TYPE, MsgType::Logout.as_str());
        enc.put_str(tags::SENDER_COMP_ID, &self.target);
        enc.put_str(tags::TARGET_COMP_ID, &self.sender);
        enc.put_uint(tags::MSG_SEQ_NUM, 1);
        enc.put_timestamp(tags::SENDING_TIME, Timestamp::now());
        enc.put_str(tags::TEXT, &reason);
        Refusal {
            reason,
            reply: Some(enc.into_frame()),
        }
    }
}

/// Binds inbound connections to sessions on their first Logon.
struct Acceptor {
    shared: Arc<Shared>,
}

impl Acceptor {
    /// Reads the first frame and finds the session it logs on to.
    async fn identify(&self, reader: &mut FrameReader) -> Result<(Arc<Session>, Bytes), Refusal> {
        let first = tokio::select! {
            () = self.shared.shutdown.cancelled() => return Err(Refusal::silent("engine shutting down")),
            first = tokio::time::timeout(self.shared.logon_timeout, reader.next_frame()) => first,
        };
        let frame = match first {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => return Err(Refusal::silent("connection closed before Logon")),
            Ok(Err(error)) => return Err(Refusal::silent(error.to_string())),
            Err(_) => return Err(Refusal::silent("no Logon within logon timeout")),
        };

        let (id, caller) = {
            let raw = Decoder::new(&frame)
                .decode()
                .map_err(|e| Refusal::silent(e.to_string()))?;
            if *raw.msg_type() != MsgType::Logon {
                return Err(Refusal::silent(format!(
                    "first message is {}, not Logon",
                    raw.msg_type()
                )));
            }
            let sender = raw.get_field_str(tags::SENDER_COMP_ID).unwrap_or_default();
            let target = raw.get_field_str(tags::TARGET_COMP_ID).unwrap_or_default();
            let id = SessionId::from_inbound(sender, target).ok_or_else(|| {
                Refusal::silent(format!("invalid CompIDs {sender:?}/{target:?}"))
            })?;
            let caller = Caller {
                begin_string: raw.begin_string().to_string(),
                sender: sender.to_string(),
                target: target.to_string(),
            };
            (id, caller)
        };
        let session = self
            .shared
            .registry
            .resolve(&id, &self.shared.unregistered, &self.shared.factory)
            .await
            .map_err(|e| caller.refuse(e.to_string()))?;
        if session.config().role != Role::Acceptor {
            return Err(caller.refuse(format!("session {id} does not accept connections")));
        }
        Ok((session, frame))
    }
}

#[async_trait]
impl ConnectionListener for Acceptor {
    async fn on_connect(&self, transport: Arc<dyn Transport>, mut reader: FrameReader) {
        let remote = transport.remote_endpoint();
        let (session, logon) = match self.identify(&mut reader).await {
            Ok(found) => found,
            Err(refusal) => {
                warn!(?remote, reason = %refusal.reason, "connection refused");
                if let Some(reply) = refusal.reply
                    && let Err(error) = transport.send(reply).await
                {
                    debug!(?remote, %error, "refusal not delivered");
                }
                transport.close().await;
                return;
            }
        };
        let id = session.id().clone();
        if !self.shared.registry.claim(&id) {
            warn!(session = %id, ?remote, "session already connected, refusing second connection");
            transport.close().await;
            return;
        }
        if let Err(error) = session.start(Arc::clone(&transport), Instant::now()).await {
            warn!(session = %id, %error, "cannot bind connection");
            self.shared.registry.release(&id);
            transport.close().await;
            return;
        }
        run_connection(Arc::clone(&self.shared), session, reader, Some(logon)).await;
    }
}

/// Drives one bound connection until it ends, then releases the session.
async fn run_connection(
    shared: Arc<Shared>,
    session: Arc<Session>,
    mut reader: FrameReader,
    first: Option<Bytes>,
) {
    let id = session.id().clone();
    let token = shared.shutdown.child_token();
    let timer = tokio::spawn(run_timer(
        Arc::clone(&session),
        shared.timer_interval,
        token.clone(),
    ));

    let mut open = match first {
        Some(frame) => session.on_frame(frame, Instant::now()).await.is_ok(),
        None => true,
    };
    while open {
        let next = tokio::select! {
            () = token.cancelled() => break,
            next = reader.next_frame() => next,
        };
        open = match next {
            Ok(Some(frame)) => session.on_frame(frame, Instant::now()).await.is_ok(),
            Ok(None) => {
                info!(session = %id, "connection closed by counterparty");
                false
            }
            Err(error) => {
                warn!(session = %id, %error, "read failed");
                false
            }
        };
    }

    token.cancel();
    if let Err(error) = timer.await {
        warn!(session = %id, %error, "timer task failed");
    }
    session.on_transport_closed(Instant::now()).await;
    shared.registry.release(&id);
    debug!(session = %id, discarded = reader.discarded_bytes(), "connection finished");
}

async fn run_timer(session: Arc<Session>, period: Duration, token: CancellationToken) {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = tick.tick() => {
                let closed = session.on_timer(Instant::now()).await.is_err()
                    || matches!(
                        session.state().await,
                        SessionState::Disconnecting | SessionState::Disconnected
                    );
                if closed {
                    // Unblocks a read loop waiting on a peer that never closes.
                    token.cancel();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::EngineBuilder;
    use crate::registry::UnregisteredPolicy;
    use fixline_core::types::{CompId, SessionId};
    use fixline_session::{Role, SessionConfig, SessionState};
    use fixline_tagvalue::{Decoder, Encoder};
    use fixline_transport::ChannelTransport;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn config(sender: &str, target: &str, role: Role) -> SessionConfig {
        SessionConfig::new(CompId::new(sender).unwrap(), CompId::new(target).unwrap(), "FIX.4.4")
            .with_role(role)
    }

    fn id(sender: &str, target: &str) -> SessionId {
        SessionId::new(CompId::new(sender).unwrap(), CompId::new(target).unwrap())
    }

    async fn wait_for_state(engine: &crate::Engine, id: &SessionId, state: SessionState) {
        let session = engine.session(id).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while session.state().await != state {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn logon_from(sender: &str, target: &str) -> bytes::Bytes {
        let mut enc = Encoder::new("FIX.4.4");
        enc.put_str(35, "A");
        enc.put_str(49, sender);
        enc.put_str(56, target);
        enc.put_uint(34, 1);
        enc.put_timestamp(52, fixline_core::types::Timestamp::now());
        enc.put_str(98, "0");
        enc.put_str(108, "30");
        enc.into_frame()
    }

    #[tokio::test]
    async fn test_initiator_over_channel() {
        let engine = EngineBuilder::new()
            .add_session(config("CLIENT", "SERVER", Role::Initiator))
            .build()
            .await
            .unwrap();
        let client = id("CLIENT", "SERVER");
        let (transport, reader, mut peer) = ChannelTransport::pair();

        engine.attach(&client, transport, reader).await.unwrap();
        let logon = peer.outbound.recv().await.unwrap();
        let raw = Decoder::new(&logon).decode().unwrap();
        assert_eq!(raw.msg_type().as_str(), "A");

        peer.push(&logon_from("SERVER", "CLIENT")).await.unwrap();
        wait_for_state(&engine, &client, SessionState::Active).await;
        assert!(engine.registry().is_live(&client));
        assert_eq!(engine.stats().logons, 1);

        let (transport, reader, _peer) = ChannelTransport::pair();
        assert!(engine.attach(&client, transport, reader).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_session_refused() {
        let engine = EngineBuilder::new().build().await.unwrap();
        let acceptor = super::Acceptor {
            shared: std::sync::Arc::clone(&engine.shared),
        };
        let (transport, reader, mut peer) = ChannelTransport::pair();
        peer.push(&logon_from("CLIENT", "SERVER")).await.unwrap();

        fixline_transport::ConnectionListener::on_connect(&acceptor, transport.clone(), reader).await;

        assert!(!fixline_transport::Transport::is_open(transport.as_ref()));
        let sent = peer.drain();
        assert_eq!(sent.len(), 1);
        let raw = Decoder::new(&sent[0]).decode().unwrap();
        assert_eq!(raw.msg_type().as_str(), "5");
        assert_eq!(raw.get_field_str(49), Some("SERVER"));
        assert_eq!(raw.get_field_str(56), Some("CLIENT"));
        assert_eq!(raw.get_field_str(34), Some("1"));
        assert!(raw.get_field_str(58).is_some());
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_non_logon_first_frame_closed_silently() {
        let engine = EngineBuilder::new().build().await.unwrap();
        let acceptor = super::Acceptor {
            shared: std::sync::Arc::clone(&engine.shared),
        };
        let (transport, reader, mut peer) = ChannelTransport::pair();
        let mut enc = Encoder::new("FIX.4.4");
        enc.put_str(35, "0");
        enc.put_str(49, "CLIENT");
        enc.put_str(56, "SERVER");
        enc.put_uint(34, 1);
        peer.push(&enc.into_frame()).await.unwrap();

        fixline_transport::ConnectionListener::on_connect(&acceptor, transport.clone(), reader).await;

        assert!(!fixline_transport::Transport::is_open(transport.as_ref()));
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_tcp_logon_and_logout() {
        let template = config("ANY", "ANY", Role::Acceptor);
        let server = EngineBuilder::new()
            .with_unregistered_policy(UnregisteredPolicy::Admit {
                template: Box::new(template),
            })
            .with_timer_interval(Duration::from_millis(50))
            .build()
            .await
            .unwrap();
        let client = EngineBuilder::new()
            .add_session(config("CLIENT", "SERVER", Role::Initiator))
            .with_timer_interval(Duration::from_millis(50))
            .build()
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = server.clone();
        let accept = tokio::spawn(async move { serving.serve(listener).await });

        let client_id = id("CLIENT", "SERVER");
        let server_id = id("SERVER", "CLIENT");
        client.connect(&client_id, addr).await.unwrap();
        wait_for_state(&client, &client_id, SessionState::Active).await;
        wait_for_state(&server, &server_id, SessionState::Active).await;

        let seq = client
            .send(&client_id, fixline_session::OutboundMessage::new("D").with_str(11, "ORD1"))
            .await
            .unwrap();
        assert_eq!(seq, 2);

        client.logout(&client_id, "done").await.unwrap();
        wait_for_state(&client, &client_id, SessionState::Disconnected).await;
        wait_for_state(&server, &server_id, SessionState::Disconnected).await;
        assert_eq!(server.session(&server_id).unwrap().next_inbound(), 4);

        server.shutdown("bye", Duration::from_millis(100)).await;
        assert!(accept.await.unwrap().is_ok());
    }
}
