//! Registry of connected switches, fed by connect/disconnect events.
//! Also remembers which ports face another switch (LLDP was seen there).

use crate::flow::DatapathId;
use std::collections::BTreeSet;

#[derive(Debug, Default, Clone)]
pub struct SwitchRegistry {
    connected: BTreeSet<DatapathId>,
    link_ports: BTreeSet<(DatapathId, u16)>,
}

impl SwitchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the switch was already registered
    pub fn connect(&mut self, dpid: DatapathId) -> bool {
        self.connected.insert(dpid)
    }

    /// Returns false if the switch was not registered. Its link ports are
    /// forgotten either way.
    pub fn disconnect(&mut self, dpid: DatapathId) -> bool {
        self.link_ports.retain(|(d, _)| *d != dpid);
        self.connected.remove(&dpid)
    }

    /// Record a switch-to-switch port. Returns true when it is new.
    pub fn mark_link_port(&mut self, dpid: DatapathId, port: u16) -> bool {
        self.link_ports.insert((dpid, port))
    }

    pub fn is_link_port(&self, dpid: DatapathId, port: u16) -> bool {
        self.link_ports.contains(&(dpid, port))
    }

    pub fn contains(&self, dpid: DatapathId) -> bool {
        self.connected.contains(&dpid)
    }

    /// Connected switches in ascending order
    pub fn ids(&self) -> impl Iterator<Item = DatapathId> + '_ {
        self.connected.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.connected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }
}
