//! Configuration types

use crate::classifier::{MitigationPolicy, DEFAULT_BLOCK_PRIORITY, DEFAULT_THRESHOLD};
use crate::command::{ServerOptions, DEFAULT_MAX_MESSAGE_BYTES};
use crate::firewall::TargetPolicy;
use crate::flow::{RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command protocol port
pub const DEFAULT_LISTEN: &str = "0.0.0.0:20000";

/// Where the switch agent connects
pub const DEFAULT_BRIDGE_LISTEN: &str = "127.0.0.1:6699";

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
    #[serde(default)]
    pub mitigation: MitigationConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub logging: Option<LogConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub listen: Option<String>,
    pub read_timeout_secs: Option<u64>,
    pub reply_status: Option<bool>,
    pub max_message_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirewallConfig {
    pub target_policy: Option<TargetPolicy>,
    /// JSON document seeding the rule store
    pub users_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MitigationConfig {
    pub threshold: Option<u64>,
    pub block_priority: Option<u16>,
    pub window_secs: Option<u64>,
    pub block_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
}

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub source_hash: String,
    pub server: ServerLock,
    pub bridge: BridgeLock,
    pub firewall: FirewallLock,
    pub mitigation: MitigationLock,
    pub gateway: GatewayLock,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerLock {
    pub listen: String,
    pub read_timeout_secs: Option<u64>,
    pub reply_status: bool,
    pub max_message_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeLock {
    pub listen: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallLock {
    pub target_policy: TargetPolicy,
    pub users_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationLock {
    pub threshold: u64,
    pub block_priority: u16,
    pub window_secs: Option<u64>,
    pub block_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayLock {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl ConfigLock {
    pub fn from_config(config: &Config, source_hash: String) -> Self {
        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source_hash,
            server: ServerLock {
                listen: config
                    .server
                    .listen
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
                read_timeout_secs: config.server.read_timeout_secs,
                reply_status: config.server.reply_status.unwrap_or(false),
                max_message_bytes: config
                    .server
                    .max_message_bytes
                    .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
            },
            bridge: BridgeLock {
                listen: config
                    .bridge
                    .listen
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BRIDGE_LISTEN.to_string()),
            },
            firewall: FirewallLock {
                target_policy: config.firewall.target_policy.unwrap_or_default(),
                users_file: config.firewall.users_file.clone(),
            },
            mitigation: MitigationLock {
                threshold: config.mitigation.threshold.unwrap_or(DEFAULT_THRESHOLD),
                block_priority: config
                    .mitigation
                    .block_priority
                    .unwrap_or(DEFAULT_BLOCK_PRIORITY),
                window_secs: config.mitigation.window_secs,
                block_ttl_secs: config.mitigation.block_ttl_secs,
            },
            gateway: GatewayLock {
                max_attempts: config.gateway.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                backoff_ms: config
                    .gateway
                    .backoff_ms
                    .unwrap_or(DEFAULT_BACKOFF.as_millis() as u64),
            },
            logging: config.logging.clone().unwrap_or_default(),
        }
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        parse_addr("server.listen", &self.server.listen)
    }

    pub fn bridge_addr(&self) -> Result<SocketAddr> {
        parse_addr("bridge.listen", &self.bridge.listen)
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            read_timeout: self.server.read_timeout_secs.map(Duration::from_secs),
            reply_status: self.server.reply_status,
            max_message_bytes: self.server.max_message_bytes,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.gateway.max_attempts.max(1),
            backoff: Duration::from_millis(self.gateway.backoff_ms),
        }
    }

    pub fn mitigation_policy(&self) -> MitigationPolicy {
        MitigationPolicy {
            threshold: self.mitigation.threshold,
            block_priority: self.mitigation.block_priority,
            window: self.mitigation.window_secs.map(Duration::from_secs),
            block_ttl: self.mitigation.block_ttl_secs.map(Duration::from_secs),
        }
    }
}

pub(crate) fn parse_addr(key: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{}: invalid address {:?}: {}", key, value, e)))
}
