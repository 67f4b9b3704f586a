/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Shared test fixtures.

use crate::application::{Application, Diagnostic, RejectReason};
use crate::config::SessionConfig;
use crate::exchange::{AppEvent, Exchange, SessionEnv, SessionInner};
use crate::pipeline::{Flow, Inbound, Pipeline};
use crate::pool::BufferPool;
use crate::sequence::SequenceLedger;
use crate::stats::EngineStats;
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::ErrorClass;
use fixline_core::message::OwnedMessage;
use fixline_core::types::{CompId, SessionId, Timestamp};
use fixline_core::error::StoreError;
use fixline_store::{Direction, MemoryStore, MessageStore, SequenceState, StoredMessage};
use fixline_tagvalue::Encoder;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Acceptor BUY talking to SELL over FIX.4.4.
pub(crate) fn config() -> SessionConfig {
    SessionConfig::new(
        CompId::new("BUY").unwrap(),
        CompId::new("SELL").unwrap(),
        "FIX.4.4",
    )
}

/// A frame as the counterparty SELL would send it.
pub(crate) fn frame(msg_type: &str, seq: u64, fields: &[(u32, &str)]) -> Bytes {
    frame_with("FIX.4.4", msg_type, seq, fields)
}

pub(crate) fn frame_with(begin_string: &str, msg_type: &str, seq: u64, fields: &[(u32, &str)]) -> Bytes {
    let mut enc = Encoder::new(begin_string);
    enc.put_str(35, msg_type);
    enc.put_str(49, "SELL");
    enc.put_str(56, "BUY");
    enc.put_uint(34, seq);
    enc.put_timestamp(52, Timestamp::now());
    for (tag, value) in fields {
        enc.put_str(*tag, value);
    }
    enc.into_frame()
}

pub(crate) fn logon(seq: u64, heart_bt_int: u64) -> Bytes {
    frame("A", seq, &[(98, "0"), (108, &heart_bt_int.to_string())])
}

/// Session state for driving stages directly.
pub(crate) struct Harness {
    pub(crate) env: SessionEnv,
    pub(crate) inner: SessionInner,
    pub(crate) events: Vec<AppEvent>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let config = config();
        let inner = SessionInner::new(&config, Instant::now());
        Self {
            env: SessionEnv {
                id: config.session_id(),
                config,
                store: Arc::new(MemoryStore::new()),
                stats: Arc::new(EngineStats::new()),
                pool: Arc::new(BufferPool::default()),
                ledger: SequenceLedger::new(),
            },
            inner,
            events: Vec::new(),
        }
    }

    pub(crate) async fn run(&mut self, pipeline: &Pipeline, msg: &mut Inbound) -> Flow {
        let mut cx = Exchange::new(&self.env, &mut self.inner, &mut self.events, Instant::now());
        pipeline.run(msg, &mut cx).await.unwrap()
    }
}

/// Application recording every callback.
#[derive(Default)]
pub(crate) struct Recorder {
    logons: Mutex<usize>,
    logouts: Mutex<usize>,
    delivered: Mutex<Vec<u64>>,
    rejects: Mutex<Vec<ErrorClass>>,
}

impl Recorder {
    pub(crate) fn logons(&self) -> usize {
        *self.logons.lock()
    }

    pub(crate) fn logouts(&self) -> usize {
        *self.logouts.lock()
    }

    /// MsgSeqNum of every application message delivered, in order.
    pub(crate) fn delivered(&self) -> Vec<u64> {
        self.delivered.lock().clone()
    }

    pub(crate) fn reject_classes(&self) -> Vec<ErrorClass> {
        self.rejects.lock().clone()
    }
}

#[async_trait]
impl Application for Recorder {
    async fn on_logon(&self, _session_id: &SessionId) {
        *self.logons.lock() += 1;
    }

    async fn on_logout(&self, _session_id: &SessionId) {
        *self.logouts.lock() += 1;
    }

    async fn from_app(&self, message: &OwnedMessage, _session_id: &SessionId) -> Result<(), RejectReason> {
        self.delivered.lock().push(message.seq_num().unwrap_or_default());
        Ok(())
    }

    async fn on_reject(&self, diagnostic: &Diagnostic, _session_id: &SessionId) {
        self.rejects.lock().push(diagnostic.class);
    }
}

/// Memory store whose outbound appends fail from a chosen sequence number.
pub(crate) struct FlakyStore {
    pub(crate) memory: Arc<MemoryStore>,
    fail_from: AtomicU64,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            memory: Arc::new(MemoryStore::new()),
            fail_from: AtomicU64::new(u64::MAX),
        }
    }

    pub(crate) fn fail_outbound_from(&self, seq: u64) {
        self.fail_from.store(seq, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn append(
        &self,
        session: &SessionId,
        direction: Direction,
        seq: u64,
        raw: Bytes,
    ) -> Result<(), StoreError> {
        if direction == Direction::Outbound && seq >= self.fail_from.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".into()));
        }
        self.memory.append(session, direction, seq, raw).await
    }

    async fn range(
        &self,
        session: &SessionId,
        direction: Direction,
        from: u64,
        to: u64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.memory.range(session, direction, from, to).await
    }

    async fn last_seq(&self, session: &SessionId, direction: Direction) -> Result<Option<u64>, StoreError> {
        self.memory.last_seq(session, direction).await
    }

    async fn sequences(&self, session: &SessionId) -> Result<SequenceState, StoreError> {
        self.memory.sequences(session).await
    }

    async fn save_sequences(&self, session: &SessionId, state: SequenceState) -> Result<(), StoreError> {
        self.memory.save_sequences(session, state).await
    }

    async fn reset(&self, session: &SessionId) -> Result<(), StoreError> {
        self.memory.reset(session).await
    }
}
