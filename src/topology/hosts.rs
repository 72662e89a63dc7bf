//! Host table
//!
//! Hosts are kept in insertion order. Learning is last-write-wins per IP
//! address: a host that moves keeps its slot but takes the new location.

use crate::flow::DatapathId;
use crate::protocol::MacAddr;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A host attached to a switch port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub dpid: DatapathId,
    pub port: u16,
}

/// Where a host is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub dpid: DatapathId,
    pub port: u16,
}

#[derive(Debug, Default, Clone)]
pub struct HostTable {
    hosts: Vec<Host>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a host list as delivered by a topology collaborator, verbatim.
    /// Duplicate IPs are kept; resolution returns the first one.
    pub fn from_hosts(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    /// Learn or move a host. Returns true when the table changed.
    pub fn learn(&mut self, host: Host) -> bool {
        match self.hosts.iter_mut().find(|h| h.ip == host.ip) {
            Some(existing) if *existing == host => false,
            Some(existing) => {
                *existing = host;
                true
            }
            None => {
                self.hosts.push(host);
                true
            }
        }
    }

    /// Linear scan for the first host with `ip`
    pub fn resolve(&self, ip: Ipv4Addr) -> Option<Attachment> {
        self.hosts.iter().find(|h| h.ip == ip).map(|h| Attachment {
            dpid: h.dpid,
            port: h.port,
        })
    }

    /// Distinct switch ids appearing in the table, in first-seen order
    pub fn switch_ids(&self) -> Vec<DatapathId> {
        let mut ids: Vec<DatapathId> = Vec::new();
        for host in &self.hosts {
            if !ids.contains(&host.dpid) {
                ids.push(host.dpid);
            }
        }
        ids
    }

    /// Drop every host attached to `dpid`; returns how many were removed
    pub fn forget_switch(&mut self, dpid: DatapathId) -> usize {
        let before = self.hosts.len();
        self.hosts.retain(|h| h.dpid != dpid);
        before - self.hosts.len()
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(last: u8, dpid: u64, port: u16) -> Host {
        Host {
            mac: MacAddr([0, 0, 0, 0, 0, last]),
            ip: Ipv4Addr::new(10, 0, 0, last),
            dpid: DatapathId(dpid),
            port,
        }
    }

    #[test]
    fn test_resolve_found_and_missing() {
        let mut table = HostTable::new();
        table.learn(host(1, 1, 1));
        table.learn(host(2, 2, 3));

        assert_eq!(
            table.resolve(Ipv4Addr::new(10, 0, 0, 2)),
            Some(Attachment {
                dpid: DatapathId(2),
                port: 3
            })
        );
        assert_eq!(table.resolve(Ipv4Addr::new(10, 0, 0, 9)), None);
    }

    #[test]
    fn test_resolve_returns_first_duplicate() {
        let mut second = host(5, 2, 7);
        second.mac = MacAddr([0xaa; 6]);
        let table = HostTable::from_hosts(vec![host(5, 1, 4), second]);

        assert_eq!(
            table.resolve(Ipv4Addr::new(10, 0, 0, 5)),
            Some(Attachment {
                dpid: DatapathId(1),
                port: 4
            })
        );
    }

    #[test]
    fn test_learn_is_last_write_wins() {
        let mut table = HostTable::new();
        assert!(table.learn(host(1, 1, 1)));
        assert!(!table.learn(host(1, 1, 1)));
        assert!(table.learn(host(1, 3, 9)));

        assert_eq!(table.len(), 1);
        assert_eq!(table.hosts()[0].dpid, DatapathId(3));
        assert_eq!(table.hosts()[0].port, 9);
    }

    #[test]
    fn test_switch_ids_are_distinct() {
        let table = HostTable::from_hosts(vec![
            host(1, 2, 1),
            host(2, 1, 1),
            host(3, 2, 2),
            host(4, 1, 5),
        ]);
        assert_eq!(table.switch_ids(), vec![DatapathId(2), DatapathId(1)]);
        assert!(HostTable::new().switch_ids().is_empty());
    }

    #[test]
    fn test_forget_switch() {
        let mut table = HostTable::from_hosts(vec![host(1, 1, 1), host(2, 2, 1), host(3, 1, 2)]);
        assert_eq!(table.forget_switch(DatapathId(1)), 2);
        assert_eq!(table.switch_ids(), vec![DatapathId(2)]);
    }
}
