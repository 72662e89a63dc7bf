//! Flow table vocabulary shared by every component that programs switches

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Switch identifier (OpenFlow datapath id)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatapathId(pub u64);

impl fmt::Debug for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Header constraints of a flow entry. `None` fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ether_type: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_protocol: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_source_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_destination_port: Option<u16>,
}

impl FlowMatch {
    /// Match-all pattern
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return write!(f, "*");
        }
        let mut parts = Vec::new();
        if let Some(t) = self.ether_type {
            parts.push(format!("ether_type={t:#06x}"));
        }
        if let Some(p) = self.ip_protocol {
            parts.push(format!("ip_protocol={p}"));
        }
        if let Some(ip) = self.source_ip {
            parts.push(format!("nw_src={ip}"));
        }
        if let Some(ip) = self.destination_ip {
            parts.push(format!("nw_dst={ip}"));
        }
        if let Some(port) = self.transport_source_port {
            parts.push(format!("tp_src={port}"));
        }
        if let Some(port) = self.transport_destination_port {
            parts.push(format!("tp_dst={port}"));
        }
        write!(f, "{}", parts.join(","))
    }
}

/// Flow entry action. An empty action list drops matching packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "port")]
pub enum Action {
    /// Send out a physical port
    Output(u16),
    /// Send out every port except the ingress port
    Flood,
}

/// A flow entry as installed on (or reported by) a switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub priority: u16,
    #[serde(rename = "match")]
    pub flow_match: FlowMatch,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl FlowEntry {
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datapath_id_display() {
        assert_eq!(DatapathId(0xabc).to_string(), "0x0000000000000abc");
    }

    #[test]
    fn test_flow_match_display() {
        let m = FlowMatch {
            ether_type: Some(0x0800),
            ip_protocol: Some(6),
            transport_destination_port: Some(22),
            ..FlowMatch::any()
        };
        assert_eq!(m.to_string(), "ether_type=0x0800,ip_protocol=6,tp_dst=22");
        assert_eq!(FlowMatch::any().to_string(), "*");
        assert!(FlowMatch::any().is_wildcard());
    }

    #[test]
    fn test_flow_match_json_omits_wildcards() {
        let m = FlowMatch {
            ether_type: Some(0x0800),
            source_ip: Some(Ipv4Addr::new(10, 0, 0, 5)),
            ..FlowMatch::any()
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ether_type": 2048, "source_ip": "10.0.0.5"})
        );
    }

    #[test]
    fn test_action_json() {
        let json = serde_json::to_value([Action::Output(3), Action::Flood]).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"type": "output", "port": 3}, {"type": "flood"}])
        );
    }
}
