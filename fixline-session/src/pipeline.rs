/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Inbound message handler pipeline.
//!
//! Every inbound frame that passes the state gate runs through a fixed,
//! ordered list of [`Stage`]s. A stage either lets the message continue or
//! stops it; nothing after a `Stop` sees the message.
//!
//! The standard chain is:
//! 1. [`GarbledStage`]: framing, BodyLength, CheckSum, MsgSeqNum
//! 2. [`DataLengthStage`]: length-prefixed data fields
//! 3. [`PerTypeStage`]: sequencing and session message handling
//! 4. [`PostProcessStage`]: inbound log and statistics
//! 5. [`DeliveryStage`]: hand-off to the application

use crate::application::{Diagnostic, RejectReason};
use crate::exchange::{AppEvent, Exchange};
pub use crate::handlers::PerTypeStage;
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::{ErrorClass, SessionError};
use fixline_core::message::{MsgType, OwnedMessage};
use fixline_core::tags::reject_reason;
use fixline_store::Direction;
use fixline_tagvalue::{Decoder, data_tag_for, length_tag_for};
use tracing::{error, trace};

/// Outcome of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Hand the message to the next stage.
    Continue,
    /// Processing of this message ends here.
    Stop,
}

/// An inbound message travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct Inbound {
    frame: Bytes,
    pub(crate) message: Option<OwnedMessage>,
    pub(crate) seq: u64,
    pub(crate) rejection: Option<RejectReason>,
    /// Processed but not logged again, e.g. a redelivered duplicate.
    pub(crate) skip_store: bool,
}

impl Inbound {
    /// Wraps a raw frame fresh off the transport.
    #[must_use]
    pub fn new(frame: Bytes) -> Self {
        Self {
            frame,
            message: None,
            seq: 0,
            rejection: None,
            skip_store: false,
        }
    }

    /// Wraps a message that already passed the framing stages, e.g. one
    /// released after a gap closed.
    #[must_use]
    pub(crate) fn parsed(message: OwnedMessage, seq: u64) -> Self {
        Self {
            frame: message.bytes(),
            message: Some(message),
            seq,
            rejection: None,
            skip_store: false,
        }
    }

    /// Returns the original frame.
    #[must_use]
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    /// Returns the decoded message once the garbled stage has run.
    #[must_use]
    pub fn message(&self) -> Option<&OwnedMessage> {
        self.message.as_ref()
    }

    /// Returns the MsgType once decoded.
    #[must_use]
    pub fn msg_type(&self) -> Option<&MsgType> {
        self.message.as_ref().map(OwnedMessage::msg_type)
    }

    /// Returns MsgSeqNum once decoded.
    #[must_use]
    pub fn seq(&self) -> Option<u64> {
        self.message.as_ref().map(|_| self.seq)
    }

    /// Returns true if an earlier stage marked the message rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }

    /// Marks the message rejected; it still counts for sequencing.
    pub fn reject(&mut self, reason: RejectReason) {
        if self.rejection.is_none() {
            self.rejection = Some(reason);
        }
    }
}

/// A pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Processes one message.
    ///
    /// # Errors
    /// An error is fatal for the session: it is logged out and disconnected.
    async fn process(&self, msg: &mut Inbound, cx: &mut Exchange<'_>) -> Result<Flow, SessionError>;
}

/// Fixed ordered chain of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Creates a pipeline from `stages`, run in order.
    #[must_use]
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The standard five-stage chain.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(GarbledStage),
            Box::new(DataLengthStage),
            Box::new(PerTypeStage),
            Box::new(PostProcessStage),
            Box::new(DeliveryStage),
        ])
    }

    /// Returns the stage names in order.
    pub fn stage_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.name())
    }

    /// Runs `msg` through every stage until one stops it.
    ///
    /// # Errors
    /// Returns the first stage error.
    pub async fn run(&self, msg: &mut Inbound, cx: &mut Exchange<'_>) -> Result<Flow, SessionError> {
        for stage in &self.stages {
            if stage.process(msg, cx).await? == Flow::Stop {
                trace!(stage = stage.name(), "message stopped");
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Drops frames whose envelope cannot be trusted.
///
/// Garbled frames are reported and never reach the ledger.
#[derive(Debug, Default, Clone, Copy)]
pub struct GarbledStage;

#[async_trait]
impl Stage for GarbledStage {
    fn name(&self) -> &'static str {
        "garbled"
    }

    async fn process(&self, msg: &mut Inbound, cx: &mut Exchange<'_>) -> Result<Flow, SessionError> {
        if msg.message.is_some() {
            return Ok(Flow::Continue);
        }
        let config = cx.config();
        let decoded = Decoder::new(&msg.frame)
            .with_checksum_validation(config.validate_checksum)
            .with_length_validation(config.validate_length)
            .decode()
            .and_then(|raw| raw.seq_num().map(|seq| (seq, raw)));

        match decoded {
            Ok((seq, raw)) if seq > 0 => {
                msg.seq = seq;
                msg.message = Some(raw.into_owned(msg.frame.clone()));
                Ok(Flow::Continue)
            }
            Ok(_) => {
                let diagnostic = Diagnostic::new(
                    ErrorClass::Garbled,
                    "MsgSeqNum must be positive",
                    None,
                    msg.frame.clone(),
                );
                cx.report(diagnostic);
                Ok(Flow::Stop)
            }
            Err(error) => {
                let diagnostic =
                    Diagnostic::new(ErrorClass::Garbled, error.to_string(), None, msg.frame.clone());
                cx.report(diagnostic);
                Ok(Flow::Stop)
            }
        }
    }
}

/// Checks that every length-prefixed data field carries the declared byte count.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataLengthStage;

impl DataLengthStage {
    fn check(message: &OwnedMessage) -> Option<RejectReason> {
        let mut fields = message.fields().peekable();
        while let Some(field) = fields.next() {
            if let Some(data_tag) = data_tag_for(field.tag) {
                let Ok(declared) = field.as_u64() else {
                    return Some(
                        RejectReason::new(
                            reject_reason::INCORRECT_DATA_FORMAT,
                            format!("length field {} is not numeric", field.tag),
                        )
                        .with_ref_tag(field.tag),
                    );
                };
                let next = fields.peek();
                let actual = match next {
                    Some(next) if next.tag == data_tag => next.value.len(),
                    _ => {
                        return Some(
                            RejectReason::new(
                                reject_reason::REQUIRED_TAG_MISSING,
                                format!("data field {data_tag} must follow length field {}", field.tag),
                            )
                            .with_ref_tag(data_tag),
                        );
                    }
                };
                if actual as u64 != declared {
                    return Some(
                        RejectReason::new(
                            reject_reason::INCORRECT_DATA_FORMAT,
                            format!("data field {data_tag} declared {declared} bytes, carries {actual}"),
                        )
                        .with_ref_tag(data_tag),
                    );
                }
                fields.next();
            } else if length_tag_for(field.tag).is_some() {
                return Some(
                    RejectReason::new(
                        reject_reason::REQUIRED_TAG_MISSING,
                        format!("data field {} without its length field", field.tag),
                    )
                    .with_ref_tag(field.tag),
                );
            }
        }
        None
    }
}

#[async_trait]
impl Stage for DataLengthStage {
    fn name(&self) -> &'static str {
        "data-length"
    }

    async fn process(&self, msg: &mut Inbound, _cx: &mut Exchange<'_>) -> Result<Flow, SessionError> {
        if let Some(message) = &msg.message
            && let Some(reason) = Self::check(message)
        {
            msg.reject(reason);
        }
        Ok(Flow::Continue)
    }
}

/// Logs accepted messages and persists the ledger.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostProcessStage;

#[async_trait]
impl Stage for PostProcessStage {
    fn name(&self) -> &'static str {
        "post-process"
    }

    async fn process(&self, msg: &mut Inbound, cx: &mut Exchange<'_>) -> Result<Flow, SessionError> {
        if msg.skip_store {
            return Ok(Flow::Continue);
        }
        let env = cx.env;
        if let Err(error) = env
            .store
            .append(&env.id, Direction::Inbound, msg.seq, msg.frame.clone())
            .await
        {
            error!(session = %env.id, seq = msg.seq, %error, "failed to log inbound message");
            cx.report(Diagnostic::new(
                ErrorClass::Store,
                error.to_string(),
                Some(msg.seq),
                msg.frame.clone(),
            ));
        }
        env.persist_sequences().await;
        env.stats.record_accepted();
        Ok(Flow::Continue)
    }
}

/// Queues the message for the application.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeliveryStage;

#[async_trait]
impl Stage for DeliveryStage {
    fn name(&self) -> &'static str {
        "delivery"
    }

    async fn process(&self, msg: &mut Inbound, cx: &mut Exchange<'_>) -> Result<Flow, SessionError> {
        let Some(message) = msg.message.take() else {
            return Ok(Flow::Stop);
        };
        if message.msg_type().is_app() {
            cx.env.stats.record_delivered();
            cx.events.push(AppEvent::App {
                seq: msg.seq,
                message,
            });
        } else {
            cx.events.push(AppEvent::Admin(message));
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, frame};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Terminal stage recording what reaches it.
    #[derive(Default)]
    struct Capture {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl Stage for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }

        async fn process(&self, msg: &mut Inbound, _cx: &mut Exchange<'_>) -> Result<Flow, SessionError> {
            self.seen.lock().push(msg.seq);
            Ok(Flow::Continue)
        }
    }

    #[test]
    fn test_standard_order() {
        let names: Vec<_> = Pipeline::standard().stage_names().collect();
        assert_eq!(
            names,
            vec!["garbled", "data-length", "per-type", "post-process", "delivery"]
        );
    }

    #[tokio::test]
    async fn test_garbled_never_reaches_later_stages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Box::new(GarbledStage),
            Box::new(Capture { seen: seen.clone() }),
        ]);
        let mut harness = Harness::new();

        let good = frame("D", 1, &[]);
        let mut bad = good.to_vec();
        let len = bad.len();
        bad[len - 2] = b'0';
        bad[len - 3] = b'0';
        bad[len - 4] = b'0';

        let mut garbled = Inbound::new(Bytes::from(bad));
        assert_eq!(harness.run(&pipeline, &mut garbled).await, Flow::Stop);
        assert!(seen.lock().is_empty());
        assert_eq!(harness.env.ledger.next_inbound().value(), 1);
        assert_eq!(harness.env.stats.snapshot().garbled, 1);

        let mut no_seq = Inbound::new(Bytes::from_static(
            b"8=FIX.4.4\x019=5\x0135=D\x0110=000\x01",
        ));
        assert_eq!(harness.run(&pipeline, &mut no_seq).await, Flow::Stop);
        assert!(seen.lock().is_empty());

        let mut ok = Inbound::new(good);
        assert_eq!(harness.run(&pipeline, &mut ok).await, Flow::Continue);
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_data_length_marks_rejected() {
        let pipeline = Pipeline::new(vec![Box::new(GarbledStage), Box::new(DataLengthStage)]);
        let mut harness = Harness::new();

        let mut msg = Inbound::new(frame("n", 1, &[(212, "10"), (213, "<a/>")]));
        assert_eq!(harness.run(&pipeline, &mut msg).await, Flow::Continue);
        let reason = msg.rejection.clone().unwrap();
        assert_eq!(reason.ref_tag, Some(213));
        assert_eq!(reason.code, reject_reason::INCORRECT_DATA_FORMAT);

        let mut msg = Inbound::new(frame("n", 2, &[(212, "4"), (213, "<a/>")]));
        harness.run(&pipeline, &mut msg).await;
        assert!(!msg.is_rejected());

        let mut msg = Inbound::new(frame("n", 3, &[(213, "<a/>")]));
        harness.run(&pipeline, &mut msg).await;
        assert!(msg.is_rejected());
    }

    #[tokio::test]
    async fn test_embedded_soh_in_data_field() {
        let pipeline = Pipeline::new(vec![Box::new(GarbledStage), Box::new(DataLengthStage)]);
        let mut harness = Harness::new();

        let mut msg = Inbound::new(frame("n", 1, &[(212, "5"), (213, "a\x01b=c")]));
        assert_eq!(harness.run(&pipeline, &mut msg).await, Flow::Continue);
        assert!(!msg.is_rejected());
        let message = msg.message().unwrap();
        assert_eq!(message.get_field(213), Some(&b"a\x01b=c"[..]));
    }
}
