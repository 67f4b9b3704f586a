//! FIX acceptor example.
//!
//! Accepts connections for the configured session, acknowledges every
//! NewOrderSingle with an ExecutionReport and logs the engine statistics on
//! Ctrl-C.

use async_trait::async_trait;
use fixline::prelude::*;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

mod common;
use common::{ExampleConfig, init_logging};

/// Forwards received orders to the main task, which answers them.
struct OrderDesk {
    orders: mpsc::UnboundedSender<(SessionId, String)>,
}

#[async_trait]
impl Application for OrderDesk {
    async fn on_logon(&self, session_id: &SessionId) {
        info!(session = %session_id, "counterparty logged on");
    }

    async fn on_logout(&self, session_id: &SessionId) {
        info!(session = %session_id, "counterparty logged out");
    }

    async fn from_app(&self, message: &OwnedMessage, session_id: &SessionId) -> std::result::Result<(), RejectReason> {
        if message.msg_type().as_str() != "D" {
            return Ok(());
        }
        let Some(cl_ord_id) = message.get_field_str(11) else {
            return Err(RejectReason::new(1, "ClOrdID missing").with_ref_tag(11));
        };
        let _ = self.orders.send((session_id.clone(), cl_ord_id.to_string()));
        Ok(())
    }

    async fn on_reject(&self, diagnostic: &Diagnostic, session_id: &SessionId) {
        warn!(session = %session_id, class = %diagnostic.class, reason = %diagnostic.reason, "message not accepted");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::server();
    let (tx, mut orders) = mpsc::unbounded_channel();

    let engine = EngineBuilder::new()
        .with_application(OrderDesk { orders: tx })
        .add_session(cfg.session(Role::Acceptor)?)
        .build()
        .await?;

    let listener = TcpListener::bind(cfg.addr()).await?;
    info!(addr = %cfg.addr(), version = %cfg.begin_string, "acceptor listening");
    let serving = engine.clone();
    let server = tokio::spawn(async move { serving.serve(listener).await });

    let mut next_exec_id = 1u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some((session, cl_ord_id)) = orders.recv() => {
                let report = OutboundMessage::new("8")
                    .with_str(37, &format!("ORD{next_exec_id}"))
                    .with_str(17, &format!("EXEC{next_exec_id}"))
                    .with_str(11, &cl_ord_id)
                    .with_str(150, "0")
                    .with_str(39, "0");
                next_exec_id += 1;
                match engine.send(&session, report).await {
                    Ok(seq) => info!(%session, seq, %cl_ord_id, "order acknowledged"),
                    Err(error) => warn!(%session, %error, "cannot acknowledge order"),
                }
            }
        }
    }

    engine.shutdown("server shutting down", Duration::from_secs(5)).await;
    server.await??;
    info!(stats = ?engine.stats(), "acceptor stopped");
    Ok(())
}
