//! Messages exchanged with the switch agent, one JSON object per line

use crate::classifier::PacketIn;
use crate::flow::{Action, DatapathId, FlowEntry, FlowMatch};
use serde::{Deserialize, Serialize};

/// Switch → controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SwitchEvent {
    SwitchReady {
        dpid: DatapathId,
    },
    SwitchDisconnected {
        dpid: DatapathId,
    },
    PacketIn(PacketIn),
    /// Flow table dump, answered to a stats request
    FlowStats {
        dpid: DatapathId,
        entries: Vec<FlowEntry>,
    },
}

impl SwitchEvent {
    pub fn dpid(&self) -> DatapathId {
        match self {
            SwitchEvent::SwitchReady { dpid }
            | SwitchEvent::SwitchDisconnected { dpid }
            | SwitchEvent::FlowStats { dpid, .. } => *dpid,
            SwitchEvent::PacketIn(packet) => packet.dpid,
        }
    }
}

/// Controller → switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SwitchCommand {
    Install {
        dpid: DatapathId,
        priority: u16,
        #[serde(rename = "match")]
        flow_match: FlowMatch,
        actions: Vec<Action>,
    },
    Remove {
        dpid: DatapathId,
        priority: u16,
        #[serde(rename = "match")]
        flow_match: FlowMatch,
    },
    Flood {
        dpid: DatapathId,
        in_port: u16,
        data: Vec<u8>,
    },
    PacketOut {
        dpid: DatapathId,
        data: Vec<u8>,
        actions: Vec<Action>,
    },
}

impl SwitchCommand {
    pub fn dpid(&self) -> DatapathId {
        match self {
            SwitchCommand::Install { dpid, .. }
            | SwitchCommand::Remove { dpid, .. }
            | SwitchCommand::Flood { dpid, .. }
            | SwitchCommand::PacketOut { dpid, .. } => *dpid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event: SwitchEvent =
            serde_json::from_value(json!({"event": "switch_ready", "dpid": 5})).unwrap();
        assert_eq!(event, SwitchEvent::SwitchReady { dpid: DatapathId(5) });

        let event: SwitchEvent = serde_json::from_value(json!({
            "event": "packet_in", "dpid": 1, "in_port": 2, "data": [1, 2, 3]
        }))
        .unwrap();
        assert_eq!(event.dpid(), DatapathId(1));
        assert!(matches!(event, SwitchEvent::PacketIn(ref p) if p.data == vec![1, 2, 3]));

        let event: SwitchEvent = serde_json::from_value(json!({
            "event": "flow_stats", "dpid": 3,
            "entries": [{"priority": 10, "match": {"ether_type": 2048}, "actions": []}]
        }))
        .unwrap();
        assert!(matches!(event, SwitchEvent::FlowStats { ref entries, .. } if entries[0].is_drop()));
    }

    #[test]
    fn test_command_wire_format() {
        let command = SwitchCommand::Install {
            dpid: DatapathId(2),
            priority: 995,
            flow_match: FlowMatch {
                ether_type: Some(0x0800),
                ip_protocol: Some(6),
                transport_destination_port: Some(22),
                ..FlowMatch::any()
            },
            actions: vec![],
        };
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({
                "command": "install", "dpid": 2, "priority": 995,
                "match": {"ether_type": 2048, "ip_protocol": 6, "transport_destination_port": 22},
                "actions": []
            })
        );
    }
}
