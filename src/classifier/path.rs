//! Forwarding for packets that reach the controller

use super::{PacketHeaders, PacketIn};
use crate::flow::{Action, FlowMatch, FlowProgrammer};
use crate::protocol::EtherType;
use crate::topology::Topology;
use std::sync::Arc;
use tracing::{debug, warn};

/// Priority of forwarding entries installed by [`LearningPathManager`].
/// Firewall rules and automatic blocks all sit above it.
pub const FORWARDING_PRIORITY: u16 = 0;

/// Path-computation collaborator: sees every non-DHCP, non-LLDP packet-in
pub trait PathManager: Send + Sync {
    fn packet_in(&self, event: &PacketIn, headers: &PacketHeaders);
}

/// Single-switch forwarder.
///
/// When the destination address is attached to the switch that raised the
/// packet-in, installs an output entry for that address and sends the packet
/// out of the host's port. Anything else is flooded.
pub struct LearningPathManager {
    topology: Arc<Topology>,
    programmer: Arc<FlowProgrammer>,
}

impl LearningPathManager {
    pub fn new(topology: Arc<Topology>, programmer: Arc<FlowProgrammer>) -> Self {
        Self {
            topology,
            programmer,
        }
    }
}

impl PathManager for LearningPathManager {
    fn packet_in(&self, event: &PacketIn, headers: &PacketHeaders) {
        let local = headers
            .destination_ip()
            .filter(|_| !headers.dst_mac.is_multicast())
            .and_then(|dst| self.topology.resolve(dst).map(|at| (dst, at)))
            .filter(|(_, at)| at.dpid == event.dpid && at.port != event.in_port);

        let Some((dst, at)) = local else {
            if let Err(e) = self.programmer.flood(event.dpid, event.in_port, &event.data) {
                warn!(dpid = %event.dpid, "flood failed: {}", e);
            }
            return;
        };

        let flow_match = FlowMatch {
            ether_type: Some(EtherType::Ipv4 as u16),
            destination_ip: Some(dst),
            ..FlowMatch::any()
        };
        let actions = [Action::Output(at.port)];
        debug!(dpid = %event.dpid, %dst, port = at.port, "forwarding to local host");
        self.programmer
            .install_on(&[event.dpid], FORWARDING_PRIORITY, &flow_match, &actions);
        if let Err(e) = self.programmer.packet_out(event.dpid, &event.data, &actions) {
            warn!(dpid = %event.dpid, "packet out failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::frames;
    use crate::flow::{DatapathId, GatewayCall, RecordingGateway, RetryPolicy};
    use crate::telemetry::ControllerMetrics;
    use crate::topology::Host;
    use std::net::Ipv4Addr;

    fn setup() -> (Arc<RecordingGateway>, LearningPathManager) {
        let gateway = Arc::new(RecordingGateway::new());
        let topology = Arc::new(Topology::with_hosts(vec![Host {
            mac: frames::mac(2),
            ip: Ipv4Addr::new(10, 0, 0, 2),
            dpid: DatapathId(1),
            port: 7,
        }]));
        let programmer = Arc::new(FlowProgrammer::new(
            gateway.clone(),
            RetryPolicy::none(),
            Arc::new(ControllerMetrics::new()),
        ));
        (gateway, LearningPathManager::new(topology, programmer))
    }

    fn feed(manager: &LearningPathManager, dpid: u64, dst: Ipv4Addr) {
        let mut data = frames::tcp(frames::mac(1), Ipv4Addr::new(10, 0, 0, 1), dst, 80);
        // unicast destination MAC
        data[0] = 0x02;
        let event = PacketIn::new(DatapathId(dpid), 3, data);
        let headers = event.headers().unwrap();
        manager.packet_in(&event, &headers);
    }

    #[test]
    fn test_local_destination_installs_output() {
        let (gateway, manager) = setup();
        feed(&manager, 1, Ipv4Addr::new(10, 0, 0, 2));

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            GatewayCall::Install {
                dpid: DatapathId(1),
                priority: FORWARDING_PRIORITY,
                flow_match: FlowMatch {
                    ether_type: Some(0x0800),
                    destination_ip: Some(Ipv4Addr::new(10, 0, 0, 2)),
                    ..FlowMatch::any()
                },
                actions: vec![Action::Output(7)],
            }
        );
        assert_eq!(
            calls[1],
            GatewayCall::PacketOut {
                dpid: DatapathId(1),
                actions: vec![Action::Output(7)],
            }
        );
    }

    #[test]
    fn test_remote_or_unknown_destination_floods() {
        let (gateway, manager) = setup();
        feed(&manager, 2, Ipv4Addr::new(10, 0, 0, 2));
        feed(&manager, 1, Ipv4Addr::new(10, 0, 0, 99));

        assert!(gateway
            .calls()
            .iter()
            .all(|c| matches!(c, GatewayCall::Flood { in_port: 3, .. })));
        assert_eq!(gateway.calls().len(), 2);
    }
}
