//! FIX initiator example.
//!
//! Connects, logs on, sends a few NewOrderSingle messages, waits for their
//! ExecutionReports and logs out.

use async_trait::async_trait;
use fixline::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tracing::info;

mod common;
use common::{ExampleConfig, init_logging};

const ORDERS: usize = 3;

struct Trader {
    logged_on: Arc<Notify>,
    reports: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Application for Trader {
    async fn on_logon(&self, session_id: &SessionId) {
        info!(session = %session_id, "logged on");
        self.logged_on.notify_one();
    }

    async fn on_logout(&self, session_id: &SessionId) {
        info!(session = %session_id, "logged out");
    }

    async fn from_app(&self, message: &OwnedMessage, _session_id: &SessionId) -> std::result::Result<(), RejectReason> {
        if message.msg_type().as_str() == "8" {
            let cl_ord_id = message.get_field_str(11).unwrap_or_default().to_string();
            let _ = self.reports.send(cl_ord_id);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::client();
    let config = cfg.session(Role::Initiator)?;
    let id = config.session_id();
    let logged_on = Arc::new(Notify::new());
    let (tx, mut reports) = mpsc::unbounded_channel();

    let engine = EngineBuilder::new()
        .with_application(Trader {
            logged_on: Arc::clone(&logged_on),
            reports: tx,
        })
        .add_session(config)
        .build()
        .await?;

    let addr: SocketAddr = cfg.addr().parse()?;
    engine.connect(&id, addr).await?;
    tokio::time::timeout(Duration::from_secs(10), logged_on.notified()).await?;

    for n in 1..=ORDERS {
        let order = OutboundMessage::new("D")
            .with_str(11, &format!("CL{n}"))
            .with_str(55, "EURUSD")
            .with_str(54, "1")
            .with_uint(38, 1_000_000)
            .with_str(40, "1")
            .with_str(60, Timestamp::now().format_millis().as_str());
        let seq = engine.send(&id, order).await?;
        info!(seq, "order sent");
    }

    for _ in 0..ORDERS {
        match tokio::time::timeout(Duration::from_secs(5), reports.recv()).await {
            Ok(Some(cl_ord_id)) => info!(%cl_ord_id, "execution report received"),
            _ => break,
        }
    }

    engine.logout(&id, "done").await?;
    engine.shutdown("client done", Duration::from_secs(5)).await;
    info!(stats = ?engine.stats(), "initiator stopped");
    Ok(())
}
