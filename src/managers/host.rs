//! Host records pushed by the orchestrator

use crate::topology::{Host, Topology};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub trait HostManager: Send + Sync {
    fn update(&self, field: &Value) -> Result<()>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HostUpdate {
    Many { hosts: Vec<Host> },
    One(Host),
}

/// Feeds `HOST_UPDATE` records into the shared topology view.
///
/// Accepts either a single host `{"mac", "ip", "dpid", "port"}` or
/// `{"hosts": [...]}`.
pub struct TopologyHostManager {
    topology: Arc<Topology>,
}

impl TopologyHostManager {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }
}

impl HostManager for TopologyHostManager {
    fn update(&self, field: &Value) -> Result<()> {
        let hosts = match serde_json::from_value::<HostUpdate>(field.clone())
            .map_err(|e| Error::Manager(format!("invalid host update: {}", e)))?
        {
            HostUpdate::Many { hosts } => hosts,
            HostUpdate::One(host) => vec![host],
        };
        let changed = hosts
            .into_iter()
            .map(|host| self.topology.learn(host))
            .filter(|changed| *changed)
            .count();
        info!(changed, "host update applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::DatapathId;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[test]
    fn test_single_and_batch_updates() {
        let topology = Arc::new(Topology::new());
        let hosts = TopologyHostManager::new(topology.clone());

        hosts
            .update(&json!({"mac": "02:00:00:00:00:01", "ip": "10.0.0.1", "dpid": 1, "port": 3}))
            .unwrap();
        hosts
            .update(&json!({"hosts": [
                {"mac": "02:00:00:00:00:02", "ip": "10.0.0.2", "dpid": 2, "port": 1},
                {"mac": "02:00:00:00:00:01", "ip": "10.0.0.1", "dpid": 2, "port": 5}
            ]}))
            .unwrap();

        assert_eq!(topology.hosts().len(), 2);
        let at = topology.resolve(Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        assert_eq!((at.dpid, at.port), (DatapathId(2), 5));
    }

    #[test]
    fn test_invalid_update() {
        let hosts = TopologyHostManager::new(Arc::new(Topology::new()));
        assert!(hosts.update(&json!({"ip": "10.0.0.1"})).is_err());
    }
}
