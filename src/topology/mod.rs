//! Topology view shared by the event loop and the command server
//!
//! Combines the learned host table with the registry of connected switches.
//! Writers are the switch event loop (learning, connect/disconnect); the
//! command server only reads. Readers may observe a table that is a few
//! events behind, which is acceptable for best-effort flow targeting.

mod hosts;
mod learner;
mod switches;

pub use hosts::{Attachment, Host, HostTable};
pub use learner::{HostLearner, TopologyLearner};
pub use switches::SwitchRegistry;

use crate::flow::DatapathId;
use std::net::Ipv4Addr;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct Topology {
    hosts: RwLock<HostTable>,
    switches: RwLock<SwitchRegistry>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a host list supplied by an external topology collaborator
    pub fn with_hosts(hosts: Vec<Host>) -> Self {
        Self {
            hosts: RwLock::new(HostTable::from_hosts(hosts)),
            switches: RwLock::default(),
        }
    }

    /// Snapshot of the host table
    pub fn hosts(&self) -> Vec<Host> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .hosts()
            .to_vec()
    }

    /// Replace the host table with a collaborator's snapshot
    pub fn replace_hosts(&self, hosts: Vec<Host>) {
        *self.hosts.write().unwrap_or_else(|e| e.into_inner()) = HostTable::from_hosts(hosts);
    }

    pub fn learn(&self, host: Host) -> bool {
        self.hosts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .learn(host)
    }

    /// Switch and port serving `ip`, first match wins
    pub fn resolve(&self, ip: Ipv4Addr) -> Option<Attachment> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(ip)
    }

    /// Distinct switches that have at least one learned host
    pub fn host_switches(&self) -> Vec<DatapathId> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .switch_ids()
    }

    /// Every switch the controller knows of: connected switches plus any
    /// switch a host was learned on. Sorted, no duplicates.
    pub fn known_switches(&self) -> Vec<DatapathId> {
        let mut ids = self.host_switches();
        ids.extend(
            self.switches
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .ids(),
        );
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn switch_ready(&self, dpid: DatapathId) -> bool {
        self.switches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .connect(dpid)
    }

    /// Unregister the switch and forget the hosts learned behind it.
    /// Returns the number of hosts forgotten.
    pub fn switch_disconnected(&self, dpid: DatapathId) -> usize {
        self.switches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .disconnect(dpid);
        self.hosts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .forget_switch(dpid)
    }

    /// Record that `port` on `dpid` faces another switch
    pub fn mark_link_port(&self, dpid: DatapathId, port: u16) -> bool {
        self.switches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .mark_link_port(dpid, port)
    }

    pub fn is_link_port(&self, dpid: DatapathId, port: u16) -> bool {
        self.switches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_link_port(dpid, port)
    }

    pub fn is_connected(&self, dpid: DatapathId) -> bool {
        self.switches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(dpid)
    }
}
