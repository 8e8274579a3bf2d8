//! Server configuration (command line flags + `IRORI_*` environment variables).

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::{ui::ConnectionConfig, usecase::HubConfig};

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("outbound capacity must be at least 1")]
    ZeroOutboundCapacity,

    #[error("pong wait ({pong_wait_secs}s) must be longer than the ping interval ({ping_interval_secs}s)")]
    PongWaitTooShort {
        ping_interval_secs: u64,
        pong_wait_secs: u64,
    },

    #[error("max message size must be at least 1 byte")]
    ZeroMaxMessageSize,

    #[error("write wait must be at least 1 second")]
    ZeroWriteWait,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "irori-server")]
#[command(about = "Real-time chat hub with room fan-out over WebSocket", long_about = None)]
pub struct ServerConfig {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "IRORI_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "IRORI_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Outbound queue slots per connection; a full queue disconnects the client
    #[arg(long, env = "IRORI_OUTBOUND_CAPACITY", default_value_t = 256)]
    pub outbound_capacity: usize,

    /// Seconds between liveness pings on an idle connection
    #[arg(long, env = "IRORI_PING_INTERVAL_SECS", default_value_t = 54)]
    pub ping_interval_secs: u64,

    /// Read deadline in seconds
    #[arg(long, env = "IRORI_PONG_WAIT_SECS", default_value_t = 60)]
    pub pong_wait_secs: u64,

    /// Write deadline in seconds for one outbound batch, ping or close frame
    #[arg(long, env = "IRORI_WRITE_WAIT_SECS", default_value_t = 10)]
    pub write_wait_secs: u64,

    /// Largest inbound frame accepted, in bytes
    #[arg(long, env = "IRORI_MAX_MESSAGE_SIZE", default_value_t = 64 * 1024)]
    pub max_message_size: usize,

    /// Ask the membership authority before accepting JOIN_ROOM
    #[arg(long, env = "IRORI_VERIFY_MEMBERSHIP", default_value_t = false)]
    pub verify_membership: bool,

    /// Timeout for one membership lookup, in milliseconds
    #[arg(long, env = "IRORI_COLLABORATOR_TIMEOUT_MS", default_value_t = 2000)]
    pub collaborator_timeout_ms: u64,

    /// Messages that may wait for persistence before new ones are dropped
    #[arg(long, env = "IRORI_PERSISTENCE_QUEUE_CAPACITY", default_value_t = 1024)]
    pub persistence_queue_capacity: usize,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "IRORI_LOG_LEVEL", default_value = "debug")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            outbound_capacity: 256,
            ping_interval_secs: 54,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            max_message_size: 64 * 1024,
            verify_membership: false,
            collaborator_timeout_ms: 2000,
            persistence_queue_capacity: 1024,
            log_level: "debug".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ZeroOutboundCapacity);
        }
        if self.pong_wait_secs <= self.ping_interval_secs {
            return Err(ConfigError::PongWaitTooShort {
                ping_interval_secs: self.ping_interval_secs,
                pong_wait_secs: self.pong_wait_secs,
            });
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroMaxMessageSize);
        }
        if self.write_wait_secs == 0 {
            return Err(ConfigError::ZeroWriteWait);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            verify_membership: self.verify_membership,
            collaborator_timeout: Duration::from_millis(self.collaborator_timeout_ms),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            outbound_capacity: self.outbound_capacity,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            write_wait: Duration::from_secs(self.write_wait_secs),
            max_message_size: self.max_message_size,
        }
    }
}
