//! Configuration management
//!
//! Handles config.toml (user-defined) and config.lock (generated with all defaults).

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Generate a lock file from config, filling in all defaults.
/// `source` is the text the config was parsed from.
pub fn generate_lock(config: &Config, source: &str) -> ConfigLock {
    ConfigLock::from_config(config, source_hash(source))
}

/// Read a lock file written by `config generate`
pub fn load_lock<P: AsRef<Path>>(path: P) -> Result<ConfigLock> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("invalid lock file: {}", e)))
}

/// Hex SHA-256 of the config source
pub fn source_hash(source: &str) -> String {
    Sha256::digest(source.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::TargetPolicy;
    use crate::telemetry::LogFormat;
    use std::time::Duration;

    #[test]
    fn test_empty_config_resolves_defaults() {
        let lock = generate_lock(&parse("").unwrap(), "");

        assert_eq!(lock.server.listen, DEFAULT_LISTEN);
        assert_eq!(lock.server.read_timeout_secs, None);
        assert!(!lock.server.reply_status);
        assert_eq!(lock.server.max_message_bytes, 1 << 20);
        assert_eq!(lock.bridge.listen, DEFAULT_BRIDGE_LISTEN);
        assert_eq!(lock.firewall.target_policy, TargetPolicy::Broadcast);
        assert_eq!(lock.mitigation.threshold, 3);
        assert_eq!(lock.mitigation.block_priority, 10);
        assert_eq!(lock.gateway.max_attempts, 3);
        assert_eq!(lock.logging.level, "info");
        assert_eq!(
            lock.source_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_lock_roundtrip_and_runtime_values() {
        let source = r#"
            [server]
            listen = "127.0.0.1:20001"
            read_timeout_secs = 30
            reply_status = true
            max_message_bytes = 4096

            [firewall]
            target_policy = "targeted"

            [mitigation]
            threshold = 10
            window_secs = 60
            block_ttl_secs = 300

            [gateway]
            max_attempts = 5
            backoff_ms = 20

            [logging]
            level = "debug"
            format = "json"
        "#;
        let lock = generate_lock(&parse(source).unwrap(), source);
        let text = toml::to_string_pretty(&lock).unwrap();
        let back: ConfigLock = toml::from_str(&text).unwrap();
        assert_eq!(back, lock);

        assert_eq!(back.server_addr().unwrap().port(), 20001);
        let options = back.server_options();
        assert_eq!(options.read_timeout, Some(Duration::from_secs(30)));
        assert!(options.reply_status);
        assert_eq!(options.max_message_bytes, 4096);
        assert_eq!(back.firewall.target_policy, TargetPolicy::Targeted);

        let policy = back.mitigation_policy();
        assert_eq!(policy.threshold, 10);
        assert_eq!(policy.window, Some(Duration::from_secs(60)));
        assert_eq!(policy.block_ttl, Some(Duration::from_secs(300)));

        let retry = back.retry_policy();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.backoff, Duration::from_millis(20));
        assert_eq!(back.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(matches!(parse("[interfaces.eth0]\nrole = \"wan\""), Err(Error::Config(_))));
    }
}
