//! Firewall rule add/modify/delete and automatic source blocks

use super::rule::{CompiledRule, FirewallRule, RuleKey};
use super::store::RuleStore;
use crate::flow::{DatapathId, Distribution, FlowMatch, FlowProgrammer};
use crate::protocol::EtherType;
use crate::topology::Topology;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{info, warn};

/// Which switches receive a user rule's entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPolicy {
    /// Every known switch
    #[default]
    Broadcast,
    /// The switch serving the rule's source (else destination) address,
    /// falling back to every known switch when neither resolves
    Targeted,
}

pub struct FirewallCompiler {
    topology: Arc<Topology>,
    programmer: Arc<FlowProgrammer>,
    store: Arc<dyn RuleStore>,
    policy: TargetPolicy,
}

impl FirewallCompiler {
    pub fn new(
        topology: Arc<Topology>,
        programmer: Arc<FlowProgrammer>,
        store: Arc<dyn RuleStore>,
        policy: TargetPolicy,
    ) -> Self {
        Self {
            topology,
            programmer,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> TargetPolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// Store the rule and, for a deny rule, install its drop entry. A rule
    /// already stored under the same key is replaced, entry included.
    pub fn add(&self, rule: FirewallRule) -> Result<Distribution> {
        let previous = self.store.get(&rule.key());
        if previous.is_some() {
            warn!(user_id = %rule.user_id, rule_no = rule.rule_no, "rule already exists, replacing");
        }
        let report = self.replace(previous.as_ref(), &rule);
        info!(
            user_id = %rule.user_id,
            rule_no = rule.rule_no,
            allow = rule.allow,
            switches = report.attempted(),
            "firewall rule added"
        );
        self.store.put(rule);
        Ok(report)
    }

    /// Replace a stored rule: remove the old entry, then install the new one
    pub fn modify(&self, rule: FirewallRule) -> Result<Distribution> {
        let previous = self.lookup(&rule.key())?;
        let report = self.replace(Some(&previous), &rule);
        info!(
            user_id = %rule.user_id,
            rule_no = rule.rule_no,
            allow = rule.allow,
            "firewall rule modified"
        );
        self.store.put(rule);
        Ok(report)
    }

    /// Remove a stored rule and its entry
    pub fn delete(&self, key: &RuleKey) -> Result<Distribution> {
        let rule = self.lookup(key)?;
        let report = match rule.compile() {
            Some(compiled) => self.uninstall(&compiled),
            None => Distribution::default(),
        };
        info!(user_id = %key.user_id, rule_no = key.rule_no, "firewall rule deleted");
        self.store.remove(key);
        Ok(report)
    }

    /// Drop all IPv4 from `source` on every known switch
    pub fn block_source(&self, source: Ipv4Addr, priority: u16) -> Distribution {
        let flow_match = source_block(source);
        let switches = self.topology.known_switches();
        warn!(%source, priority, switches = switches.len(), "blocking source");
        self.programmer
            .install_on(&switches, priority, &flow_match, &[])
    }

    /// Lift an automatic block wherever it was installed
    pub fn unblock_source(&self, source: Ipv4Addr, priority: u16) -> Distribution {
        let flow_match = source_block(source);
        let mut switches = self.programmer.switches_with(priority, &flow_match);
        if switches.is_empty() {
            switches = self.topology.known_switches();
        }
        info!(%source, priority, "unblocking source");
        self.programmer.remove_on(&switches, priority, &flow_match)
    }

    fn lookup(&self, key: &RuleKey) -> Result<FirewallRule> {
        self.store.get(key).ok_or_else(|| Error::RuleNotFound {
            user_id: key.user_id.clone(),
            rule_no: key.rule_no,
        })
    }

    fn replace(&self, previous: Option<&FirewallRule>, rule: &FirewallRule) -> Distribution {
        let mut report = match previous.and_then(FirewallRule::compile) {
            Some(old) => self.uninstall(&old),
            None => Distribution::default(),
        };
        if let Some(compiled) = rule.compile() {
            let added = self.install(rule, &compiled);
            report.succeeded.extend(added.succeeded);
            report.failed.extend(added.failed);
        }
        report
    }

    fn install(&self, rule: &FirewallRule, compiled: &CompiledRule) -> Distribution {
        let switches = self.install_targets(rule);
        self.programmer
            .install_on(&switches, compiled.priority, &compiled.flow_match, &[])
    }

    fn uninstall(&self, compiled: &CompiledRule) -> Distribution {
        let switches = match self.policy {
            TargetPolicy::Broadcast => self.topology.known_switches(),
            TargetPolicy::Targeted => {
                let recorded = self
                    .programmer
                    .switches_with(compiled.priority, &compiled.flow_match);
                if recorded.is_empty() {
                    self.topology.known_switches()
                } else {
                    recorded
                }
            }
        };
        self.programmer
            .remove_on(&switches, compiled.priority, &compiled.flow_match)
    }

    fn install_targets(&self, rule: &FirewallRule) -> Vec<DatapathId> {
        if self.policy == TargetPolicy::Broadcast {
            return self.topology.known_switches();
        }
        let attachment = rule
            .source_ip_address
            .and_then(|ip| self.topology.resolve(ip))
            .or_else(|| {
                rule.destination_ip_address
                    .and_then(|ip| self.topology.resolve(ip))
            });
        match attachment {
            Some(at) => vec![at.dpid],
            None => {
                info!(
                    user_id = %rule.user_id,
                    rule_no = rule.rule_no,
                    "no attachment for rule addresses, broadcasting"
                );
                self.topology.known_switches()
            }
        }
    }
}

/// Match used by automatic blocks
pub fn source_block(source: Ipv4Addr) -> FlowMatch {
    FlowMatch {
        ether_type: Some(EtherType::Ipv4 as u16),
        source_ip: Some(source),
        ..FlowMatch::any()
    }
}
