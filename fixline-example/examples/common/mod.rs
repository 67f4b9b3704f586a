//! Settings and logging shared by the acceptor and initiator demos.
//!
//! Every setting can be overridden from the environment: `FIX_HOST`,
//! `FIX_PORT`, `FIX_SENDER`, `FIX_TARGET`, `FIX_HEARTBEAT` (seconds) and
//! `FIX_VERSION`.

#![allow(dead_code)]

use fixline::prelude::*;
use std::env;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9876;
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct ExampleConfig {
    pub host: String,
    pub port: u16,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    /// Seconds.
    pub heartbeat_interval: u64,
    pub begin_string: String,
}

impl ExampleConfig {
    fn from_env(sender: &str, target: &str) -> Self {
        Self {
            host: env::var("FIX_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var("FIX_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            sender_comp_id: env::var("FIX_SENDER").unwrap_or_else(|_| sender.to_string()),
            target_comp_id: env::var("FIX_TARGET").unwrap_or_else(|_| target.to_string()),
            heartbeat_interval: env::var("FIX_HEARTBEAT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30),
            begin_string: env::var("FIX_VERSION").unwrap_or_else(|_| "FIX.4.4".to_string()),
        }
    }

    /// The initiator side: CLIENT talking to SERVER.
    #[must_use]
    pub fn client() -> Self {
        Self::from_env("CLIENT", "SERVER")
    }

    #[must_use]
    pub fn server() -> Self {
        Self::from_env("SERVER", "CLIENT")
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the session configuration for `role`.
    pub fn session(&self, role: Role) -> anyhow::Result<SessionConfig> {
        let config = SessionConfigBuilder::new()
            .sender_comp_id(
                CompId::new(&self.sender_comp_id)
                    .ok_or_else(|| anyhow::anyhow!("invalid sender {}", self.sender_comp_id))?,
            )
            .target_comp_id(
                CompId::new(&self.target_comp_id)
                    .ok_or_else(|| anyhow::anyhow!("invalid target {}", self.target_comp_id))?,
            )
            .begin_string(self.begin_string.as_str())
            .role(role)
            .heartbeat_interval(Duration::from_secs(self.heartbeat_interval))
            .build()?;
        Ok(config)
    }
}

/// Logs at INFO unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}
