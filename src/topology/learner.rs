//! Host learning from packet-in events

use super::{Host, Topology};
use crate::classifier::{PacketHeaders, PacketIn};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Topology-learning collaborator: sees every non-DHCP packet-in
pub trait TopologyLearner: Send + Sync {
    fn packet_in(&self, event: &PacketIn, headers: &PacketHeaders);
}

/// Learns (MAC, IP, switch, port) bindings from IPv4 and ARP senders.
///
/// LLDP frames mark their ingress port as a switch-to-switch link. Nothing
/// is learned on such ports, since frames flooded by a neighbour arrive there
/// from hosts attached elsewhere.
pub struct HostLearner {
    topology: Arc<Topology>,
}

impl HostLearner {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }
}

impl TopologyLearner for HostLearner {
    fn packet_in(&self, event: &PacketIn, headers: &PacketHeaders) {
        if headers.is_lldp() {
            if self.topology.mark_link_port(event.dpid, event.in_port) {
                debug!(dpid = %event.dpid, port = event.in_port, "switch link port discovered");
            }
            return;
        }
        if self.topology.is_link_port(event.dpid, event.in_port) {
            trace!(dpid = %event.dpid, port = event.in_port, "frame on switch link, not learning");
            return;
        }
        if headers.src_mac.is_multicast() {
            return;
        }

        let ip = match (headers.ip, headers.arp_sender) {
            (Some(ip), _) => ip.src,
            (None, Some(sender)) => sender.ip,
            (None, None) => return,
        };
        // DHCP clients and ARP probes have no address yet
        if ip == Ipv4Addr::UNSPECIFIED {
            return;
        }

        let host = Host {
            mac: headers.src_mac,
            ip,
            dpid: event.dpid,
            port: event.in_port,
        };
        if self.topology.learn(host) {
            debug!(%ip, mac = %headers.src_mac, dpid = %event.dpid, port = event.in_port, "learned host");
        }
    }
}
