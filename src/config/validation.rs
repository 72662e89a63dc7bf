//! Configuration validation

use super::types::parse_addr;
use super::Config;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_listeners(config, &mut result);
    validate_firewall(config, &mut result);
    validate_mitigation(config, &mut result);
    validate_gateway(config, &mut result);

    result
}

fn validate_listeners(config: &Config, result: &mut ValidationResult) {
    if let Some(listen) = &config.server.listen {
        if let Err(e) = parse_addr("server.listen", listen) {
            result.error(e.to_string());
        }
    }
    if let Some(listen) = &config.bridge.listen {
        if let Err(e) = parse_addr("bridge.listen", listen) {
            result.error(e.to_string());
        }
    }
    if config.server.listen.is_some() && config.server.listen == config.bridge.listen {
        result.error("server.listen and bridge.listen must differ");
    }

    if config.server.read_timeout_secs.is_none() {
        result.warn(
            "server.read_timeout_secs not specified: a peer that never closes its connection blocks all later commands",
        );
    } else if config.server.read_timeout_secs == Some(0) {
        result.error("server.read_timeout_secs must be greater than 0");
    }
    if config.server.max_message_bytes == Some(0) {
        result.error("server.max_message_bytes must be greater than 0");
    }
}

fn validate_firewall(config: &Config, result: &mut ValidationResult) {
    match &config.firewall.users_file {
        Some(path) if !path.exists() => {
            result.warn(format!(
                "firewall.users_file: {} does not exist, starting with no rules",
                path.display()
            ));
        }
        Some(_) => {}
        None => result.warn("firewall.users_file not specified, starting with no rules"),
    }
}

fn validate_mitigation(config: &Config, result: &mut ValidationResult) {
    let m = &config.mitigation;
    if m.threshold == Some(0) {
        result.error("mitigation.threshold must be greater than 0");
    }
    if m.block_priority == Some(0) {
        result.error("mitigation.block_priority must be greater than 0");
    }
    if m.window_secs == Some(0) {
        result.error("mitigation.window_secs must be greater than 0");
    }
    if m.block_ttl_secs == Some(0) {
        result.error("mitigation.block_ttl_secs must be greater than 0");
    }
    if m.block_ttl_secs.is_some() && m.window_secs.is_none() {
        result.warn(
            "mitigation.block_ttl_secs without window_secs: counts only reset when a block lifts, so slow senders accumulate until blocked and idle sources are never pruned",
        );
    }
}

fn validate_gateway(config: &Config, result: &mut ValidationResult) {
    if config.gateway.max_attempts == Some(0) {
        result.error("gateway.max_attempts must be at least 1");
    }
}
