//! Flow programming with retries and an intent ledger
//!
//! Every mutation goes through [`FlowProgrammer`], which
//! - retries transient gateway failures with exponential backoff,
//! - records the intended entries per switch so removals can be targeted
//!   and switches can be reconciled against what they report,
//! - never rolls back: a broadcast that fails on some switches leaves the
//!   others programmed and reports the failures to the caller.

use super::{Action, DatapathId, FlowEntry, FlowGateway, FlowMatch, GatewayError};
use crate::telemetry::ControllerMetrics;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of attempts per mutation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(5);

/// Retry policy for gateway mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for every further retry
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << retry.min(10))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Outcome of a mutation spread over several switches
#[derive(Debug, Default)]
pub struct Distribution {
    pub succeeded: Vec<DatapathId>,
    pub failed: Vec<(DatapathId, GatewayError)>,
}

impl Distribution {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Difference between intended and observed flow state of one switch
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Intended entries the switch did not report; re-issued
    pub reinstalled: Vec<FlowEntry>,
    /// Reported entries the controller never asked for; left in place
    pub unexpected: Vec<FlowEntry>,
}

type FlowKey = (u16, FlowMatch);

pub struct FlowProgrammer {
    gateway: Arc<dyn FlowGateway>,
    retry: RetryPolicy,
    /// dpid -> (priority, match) -> actions
    intended: Mutex<HashMap<DatapathId, HashMap<FlowKey, Vec<Action>>>>,
    metrics: Arc<ControllerMetrics>,
}

impl FlowProgrammer {
    pub fn new(
        gateway: Arc<dyn FlowGateway>,
        retry: RetryPolicy,
        metrics: Arc<ControllerMetrics>,
    ) -> Self {
        Self {
            gateway,
            retry,
            intended: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<ControllerMetrics> {
        &self.metrics
    }

    /// Install the same entry on every switch in `switches`
    pub fn install_on(
        &self,
        switches: &[DatapathId],
        priority: u16,
        flow_match: &FlowMatch,
        actions: &[Action],
    ) -> Distribution {
        let mut report = Distribution::default();
        for &dpid in switches {
            self.ledger()
                .entry(dpid)
                .or_default()
                .insert((priority, flow_match.clone()), actions.to_vec());

            debug!(%dpid, priority, %flow_match, ?actions, "install flow");
            match self.with_retry(|| self.gateway.install(dpid, priority, flow_match, actions)) {
                Ok(()) => {
                    self.metrics.flow_installs.inc();
                    report.succeeded.push(dpid);
                }
                Err(e) => {
                    self.metrics.flow_failures.inc();
                    warn!(%dpid, priority, %flow_match, "install failed: {}", e);
                    report.failed.push((dpid, e));
                }
            }
        }
        report
    }

    /// Remove the entry from every switch in `switches`
    pub fn remove_on(
        &self,
        switches: &[DatapathId],
        priority: u16,
        flow_match: &FlowMatch,
    ) -> Distribution {
        let mut report = Distribution::default();
        let key = (priority, flow_match.clone());
        for &dpid in switches {
            if let Some(entries) = self.ledger().get_mut(&dpid) {
                entries.remove(&key);
            }

            debug!(%dpid, priority, %flow_match, "remove flow");
            match self.with_retry(|| self.gateway.remove(dpid, priority, flow_match)) {
                Ok(()) => {
                    self.metrics.flow_removes.inc();
                    report.succeeded.push(dpid);
                }
                Err(e) => {
                    self.metrics.flow_failures.inc();
                    warn!(%dpid, priority, %flow_match, "remove failed: {}", e);
                    report.failed.push((dpid, e));
                }
            }
        }
        report
    }

    /// Switches the ledger says carry this entry, sorted
    pub fn switches_with(&self, priority: u16, flow_match: &FlowMatch) -> Vec<DatapathId> {
        let key = (priority, flow_match.clone());
        let intended = self.ledger();
        let mut switches: Vec<DatapathId> = intended
            .iter()
            .filter(|(_, entries)| entries.contains_key(&key))
            .map(|(dpid, _)| *dpid)
            .collect();
        switches.sort();
        switches
    }

    /// Intended entries for one switch, highest priority first
    pub fn intended_entries(&self, dpid: DatapathId) -> Vec<FlowEntry> {
        let intended = self.ledger();
        let mut entries: Vec<FlowEntry> = intended
            .get(&dpid)
            .map(|entries| {
                entries
                    .iter()
                    .map(|((priority, flow_match), actions)| FlowEntry {
                        priority: *priority,
                        flow_match: flow_match.clone(),
                        actions: actions.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        entries
    }

    /// Re-issue every intended entry of a (re)connected switch
    pub fn replay(&self, dpid: DatapathId) -> Distribution {
        let entries = self.intended_entries(dpid);
        if !entries.is_empty() {
            info!(%dpid, count = entries.len(), "replaying intended flows");
        }
        let mut report = Distribution::default();
        for entry in entries {
            let part = self.install_on(&[dpid], entry.priority, &entry.flow_match, &entry.actions);
            report.succeeded.extend(part.succeeded);
            report.failed.extend(part.failed);
        }
        report
    }

    /// Compare the switch's reported entries against the ledger and
    /// re-install whatever is missing.
    pub fn reconcile(&self, dpid: DatapathId, observed: &[FlowEntry]) -> ReconcileReport {
        let observed_keys: HashSet<FlowKey> = observed
            .iter()
            .map(|e| (e.priority, e.flow_match.clone()))
            .collect();
        let intended = self.intended_entries(dpid);
        let intended_keys: HashSet<FlowKey> = intended
            .iter()
            .map(|e| (e.priority, e.flow_match.clone()))
            .collect();

        let mut report = ReconcileReport {
            unexpected: observed
                .iter()
                .filter(|e| !intended_keys.contains(&(e.priority, e.flow_match.clone())))
                .cloned()
                .collect(),
            ..Default::default()
        };

        let mut restored = 0;
        for entry in intended {
            if observed_keys.contains(&(entry.priority, entry.flow_match.clone())) {
                continue;
            }
            let result =
                self.install_on(&[dpid], entry.priority, &entry.flow_match, &entry.actions);
            if result.is_complete() {
                restored += 1;
            }
            report.reinstalled.push(entry);
        }
        self.metrics.flow_reconciled.add(restored);

        if !report.reinstalled.is_empty() || !report.unexpected.is_empty() {
            info!(
                %dpid,
                reinstalled = report.reinstalled.len(),
                unexpected = report.unexpected.len(),
                unexpected_drops = report.unexpected.iter().filter(|e| e.is_drop()).count(),
                "reconciled flow table"
            );
        }
        report
    }

    /// Drop the ledger of a switch that will not come back
    pub fn forget_switch(&self, dpid: DatapathId) {
        self.ledger().remove(&dpid);
    }

    pub fn flood(&self, dpid: DatapathId, in_port: u16, data: &[u8]) -> Result<(), GatewayError> {
        self.with_retry(|| self.gateway.flood(dpid, in_port, data))
    }

    pub fn packet_out(
        &self,
        dpid: DatapathId,
        data: &[u8],
        actions: &[Action],
    ) -> Result<(), GatewayError> {
        self.with_retry(|| self.gateway.packet_out(dpid, data, actions))
    }

    fn ledger(&self) -> MutexGuard<'_, HashMap<DatapathId, HashMap<FlowKey, Vec<Action>>>> {
        self.intended.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks the calling thread between attempts. Async callers run this
    /// on the blocking pool.
    fn with_retry<F>(&self, mut op: F) -> Result<(), GatewayError>
    where
        F: FnMut() -> Result<(), GatewayError>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut retry = 0;
        loop {
            match op() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && retry + 1 < attempts => {
                    let delay = self.retry.delay(retry);
                    debug!("transient gateway error, retrying in {:?}: {}", delay, e);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{GatewayCall, RecordingGateway};
    use std::net::Ipv4Addr;

    fn setup(retry: RetryPolicy) -> (Arc<RecordingGateway>, FlowProgrammer) {
        let gateway = Arc::new(RecordingGateway::new());
        let programmer =
            FlowProgrammer::new(gateway.clone(), retry, Arc::new(ControllerMetrics::new()));
        (gateway, programmer)
    }

    fn block(src: [u8; 4]) -> FlowMatch {
        FlowMatch {
            ether_type: Some(0x0800),
            source_ip: Some(Ipv4Addr::from(src)),
            ..FlowMatch::any()
        }
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_install_on_each_switch() {
        let (gateway, programmer) = setup(no_wait());
        let m = block([10, 0, 0, 5]);

        let report = programmer.install_on(&[DatapathId(1), DatapathId(2)], 10, &m, &[]);

        assert!(report.is_complete());
        assert_eq!(report.succeeded, vec![DatapathId(1), DatapathId(2)]);
        assert_eq!(gateway.installs().len(), 2);
        assert_eq!(
            programmer.switches_with(10, &m),
            vec![DatapathId(1), DatapathId(2)]
        );
        assert_eq!(programmer.metrics().flow_installs.get(), 2);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let (gateway, programmer) = setup(no_wait());
        gateway.fail_next(GatewayError::Transient {
            dpid: DatapathId(1),
            reason: "busy".into(),
        });

        let report = programmer.install_on(&[DatapathId(1)], 10, &block([10, 0, 0, 5]), &[]);

        assert!(report.is_complete());
        assert_eq!(gateway.installs().len(), 1);
        assert_eq!(programmer.metrics().flow_failures.get(), 0);
    }

    #[test]
    fn test_retries_are_bounded() {
        let (gateway, programmer) = setup(no_wait());
        for _ in 0..3 {
            gateway.fail_next(GatewayError::Transient {
                dpid: DatapathId(1),
                reason: "busy".into(),
            });
        }

        let report = programmer.install_on(&[DatapathId(1)], 10, &block([10, 0, 0, 5]), &[]);

        assert_eq!(report.failed.len(), 1);
        assert!(gateway.installs().is_empty());
        assert_eq!(programmer.metrics().flow_failures.get(), 1);
    }

    #[test]
    fn test_partial_failure_is_not_rolled_back() {
        let (gateway, programmer) = setup(RetryPolicy::none());
        gateway.fail_next(GatewayError::Disconnected(DatapathId(1)));

        let m = block([10, 0, 0, 5]);
        let report = programmer.install_on(&[DatapathId(1), DatapathId(2)], 10, &m, &[]);

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.succeeded, vec![DatapathId(2)]);
        assert_eq!(gateway.installs().len(), 1);
        assert!(gateway.removes().is_empty());
        // intent survives the failure so reconciliation can repair it
        assert_eq!(programmer.intended_entries(DatapathId(1)).len(), 1);
    }

    #[test]
    fn test_disconnected_is_not_retried() {
        let (gateway, programmer) = setup(no_wait());
        gateway.fail_next(GatewayError::Disconnected(DatapathId(1)));

        let result = programmer.flood(DatapathId(1), 1, &[0u8; 60]);

        assert_eq!(result, Err(GatewayError::Disconnected(DatapathId(1))));
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_remove_clears_ledger() {
        let (gateway, programmer) = setup(no_wait());
        let m = block([10, 0, 0, 5]);
        programmer.install_on(&[DatapathId(1)], 10, &m, &[]);

        programmer.remove_on(&[DatapathId(1)], 10, &m);

        assert!(programmer.switches_with(10, &m).is_empty());
        assert_eq!(
            gateway.removes(),
            vec![GatewayCall::Remove {
                dpid: DatapathId(1),
                priority: 10,
                flow_match: m,
            }]
        );
    }

    #[test]
    fn test_reconcile_reinstalls_missing() {
        let (gateway, programmer) = setup(no_wait());
        let a = block([10, 0, 0, 5]);
        let b = block([10, 0, 0, 6]);
        programmer.install_on(&[DatapathId(1)], 10, &a, &[]);
        programmer.install_on(&[DatapathId(1)], 10, &b, &[]);
        gateway.clear();

        let stray = FlowEntry {
            priority: 50,
            flow_match: FlowMatch::any(),
            actions: vec![Action::Flood],
        };
        let observed = vec![
            FlowEntry {
                priority: 10,
                flow_match: a,
                actions: vec![],
            },
            stray.clone(),
        ];
        let report = programmer.reconcile(DatapathId(1), &observed);

        assert_eq!(report.reinstalled.len(), 1);
        assert_eq!(report.reinstalled[0].flow_match, b);
        assert_eq!(report.unexpected, vec![stray]);
        assert_eq!(gateway.installs().len(), 1);
        assert_eq!(programmer.metrics().flow_reconciled.get(), 1);
    }

    #[test]
    fn test_reconcile_counts_only_restored_entries() {
        let (gateway, programmer) = setup(RetryPolicy::none());
        for last in 5..8 {
            programmer.install_on(&[DatapathId(1)], 10, &block([10, 0, 0, last]), &[]);
        }
        gateway.clear();
        gateway.fail_next(GatewayError::Disconnected(DatapathId(1)));

        let report = programmer.reconcile(DatapathId(1), &[]);

        assert_eq!(report.reinstalled.len(), 3);
        assert_eq!(gateway.installs().len(), 2);
        assert_eq!(programmer.metrics().flow_reconciled.get(), 2);
    }

    #[test]
    fn test_replay_after_reconnect() {
        let (gateway, programmer) = setup(no_wait());
        programmer.install_on(&[DatapathId(7)], 995, &block([10, 0, 0, 5]), &[]);
        programmer.install_on(&[DatapathId(7)], 10, &block([10, 0, 0, 6]), &[]);
        gateway.clear();

        let report = programmer.replay(DatapathId(7));

        assert_eq!(report.succeeded.len(), 2);
        let priorities: Vec<u16> = gateway
            .installs()
            .iter()
            .map(|c| match c {
                GatewayCall::Install { priority, .. } => *priority,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(priorities, vec![995, 10]);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(5),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(5));
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
    }
}
