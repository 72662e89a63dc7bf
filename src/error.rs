use std::io;

use crate::flow::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid firewall rule: {0}")]
    InvalidRule(String),

    #[error("rule not found: user {user_id} rule {rule_no}")]
    RuleNotFound { user_id: String, rule_no: u16 },

    #[error("flow gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("manager error: {0}")]
    Manager(String),
}

pub type Result<T> = std::result::Result<T, Error>;
