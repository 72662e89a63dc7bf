//! Declarative firewall rules and their flow-table form

use crate::flow::FlowMatch;
use crate::protocol::{ip_protocol, EtherType};
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::Ipv4Addr;

/// Rule number whose entries get priority 0
pub const MAX_RULE_NO: u16 = 1000;

/// A user's allow/deny rule, as carried by `FW_CONTROL_*` commands.
///
/// Numeric fields are accepted as JSON numbers or strings; empty strings
/// mean "not set".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(deserialize_with = "de::text")]
    pub user_id: String,
    #[serde(deserialize_with = "de::number")]
    pub rule_no: u16,
    #[serde(default, deserialize_with = "de::flag")]
    pub allow: bool,
    #[serde(default, deserialize_with = "de::opt_ip")]
    pub source_ip_address: Option<Ipv4Addr>,
    #[serde(default, deserialize_with = "de::opt_ip")]
    pub destination_ip_address: Option<Ipv4Addr>,
    #[serde(default, deserialize_with = "de::opt_number")]
    pub source_tcp_port: Option<u16>,
    #[serde(default, deserialize_with = "de::opt_number")]
    pub destination_tcp_port: Option<u16>,
}

/// Identifies a stored rule (`FW_CONTROL_DELETE` payload)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct RuleKey {
    #[serde(deserialize_with = "de::text")]
    pub user_id: String,
    #[serde(deserialize_with = "de::number")]
    pub rule_no: u16,
}

/// Priority and match of a blocking rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub priority: u16,
    pub flow_match: FlowMatch,
}

impl FirewallRule {
    /// Parse and validate a command payload
    pub fn from_field(field: &serde_json::Value) -> Result<Self> {
        let rule: FirewallRule = serde_json::from_value(field.clone())
            .map_err(|e| Error::InvalidRule(e.to_string()))?;
        check_rule_no(rule.rule_no)?;
        Ok(rule)
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            user_id: self.user_id.clone(),
            rule_no: self.rule_no,
        }
    }

    /// Lower rule numbers win: priority = 1000 - rule_no
    pub fn priority(&self) -> u16 {
        MAX_RULE_NO.saturating_sub(self.rule_no)
    }

    /// The match realized on switches. Always IPv4; any port constraint
    /// pins the protocol to TCP.
    pub fn flow_match(&self) -> FlowMatch {
        let has_port = self.source_tcp_port.is_some() || self.destination_tcp_port.is_some();
        FlowMatch {
            ether_type: Some(EtherType::Ipv4 as u16),
            ip_protocol: has_port.then_some(ip_protocol::TCP),
            source_ip: self.source_ip_address,
            destination_ip: self.destination_ip_address,
            transport_source_port: self.source_tcp_port,
            transport_destination_port: self.destination_tcp_port,
        }
    }

    /// Flow-table form of the rule. Allow rules compile to nothing: allowing
    /// is the absence of a blocking entry.
    pub fn compile(&self) -> Option<CompiledRule> {
        if self.allow {
            return None;
        }
        Some(CompiledRule {
            priority: self.priority(),
            flow_match: self.flow_match(),
        })
    }
}

impl RuleKey {
    pub fn from_field(field: &serde_json::Value) -> Result<Self> {
        let key: RuleKey = serde_json::from_value(field.clone())
            .map_err(|e| Error::InvalidRule(e.to_string()))?;
        check_rule_no(key.rule_no)?;
        Ok(key)
    }
}

/// Deny entries must stay above forwarding entries at priority 0
fn check_rule_no(rule_no: u16) -> Result<()> {
    if rule_no >= MAX_RULE_NO {
        return Err(Error::InvalidRule(format!(
            "rule_no {} must be below {}",
            rule_no, MAX_RULE_NO
        )));
    }
    Ok(())
}

/// Lenient field decoders for orchestrator payloads
mod de {
    use super::*;
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Number(u64),
        Flag(bool),
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
        match Scalar::deserialize(d)? {
            Scalar::Text(s) => Ok(s),
            Scalar::Number(n) => Ok(n.to_string()),
            Scalar::Flag(_) => Err(D::Error::custom("expected string or number")),
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u16, D::Error> {
        opt_number(d)?.ok_or_else(|| D::Error::custom("expected a number"))
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<u16>, D::Error> {
        match Option::<Scalar>::deserialize(d)? {
            None => Ok(None),
            Some(Scalar::Number(n)) => u16::try_from(n).map(Some).map_err(D::Error::custom),
            Some(Scalar::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(Scalar::Text(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
            Some(Scalar::Flag(_)) => Err(D::Error::custom("expected a number")),
        }
    }

    pub fn opt_ip<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<Ipv4Addr>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => s.trim().parse().map(Some).map_err(D::Error::custom),
        }
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
        match Option::<Scalar>::deserialize(d)? {
            None => Ok(false),
            Some(Scalar::Flag(b)) => Ok(b),
            Some(Scalar::Text(s)) => match s.as_str() {
                "true" => Ok(true),
                "false" | "" => Ok(false),
                other => Err(D::Error::custom(format!("invalid boolean {other:?}"))),
            },
            Some(Scalar::Number(n)) => Ok(n != 0),
        }
    }
}
