//! Switch event loop
//!
//! Events are handled one at a time in arrival order. A periodic tick ages
//! the source counters and lifts expired automatic blocks. Handlers program
//! flows with blocking retries, so [`Controller::run`] moves each one onto the
//! blocking pool and waits for it before taking the next event.

use crate::classifier::PacketClassifier;
use crate::flow::FlowProgrammer;
use crate::topology::Topology;
use crate::transport::SwitchEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Period of the aging tick
pub const AGING_PERIOD: Duration = Duration::from_secs(1);

pub struct Controller {
    topology: Arc<Topology>,
    programmer: Arc<FlowProgrammer>,
    classifier: Arc<PacketClassifier>,
}

impl Controller {
    pub fn new(
        topology: Arc<Topology>,
        programmer: Arc<FlowProgrammer>,
        classifier: Arc<PacketClassifier>,
    ) -> Self {
        Self {
            topology,
            programmer,
            classifier,
        }
    }

    pub fn aging_interval() -> Interval {
        let mut timer = interval(AGING_PERIOD);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    pub fn handle_event(&self, event: SwitchEvent) {
        match event {
            SwitchEvent::SwitchReady { dpid } => {
                let new = self.topology.switch_ready(dpid);
                info!(%dpid, new, "switch ready");
                let replayed = self.programmer.replay(dpid);
                if replayed.attempted() > 0 {
                    debug!(%dpid, installed = replayed.succeeded.len(), failed = replayed.failed.len(), "replay done");
                }
            }
            SwitchEvent::SwitchDisconnected { dpid } => {
                let forgotten = self.topology.switch_disconnected(dpid);
                info!(%dpid, forgotten_hosts = forgotten, "switch disconnected");
            }
            SwitchEvent::PacketIn(packet) => {
                self.classifier.handle(&packet);
            }
            SwitchEvent::FlowStats { dpid, entries } => {
                self.programmer.reconcile(dpid, &entries);
            }
        }
    }

    /// Consume events until the source closes
    pub async fn run(self, mut events: mpsc::Receiver<SwitchEvent>) {
        let controller = Arc::new(self);
        let mut aging = Self::aging_interval();
        loop {
            tokio::select! {
                _ = aging.tick() => {
                    let classifier = controller.classifier.clone();
                    offload("aging", move || {
                        classifier.run_aging(Instant::now());
                    })
                    .await;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        let controller = controller.clone();
                        offload("switch event", move || controller.handle_event(event)).await;
                    }
                    None => {
                        info!("switch event source closed");
                        return;
                    }
                },
            }
        }
    }
}

async fn offload<F>(what: &str, work: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = tokio::task::spawn_blocking(work).await {
        error!("{} handler panicked: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{frames, LearningPathManager, MitigationPolicy, PacketIn};
    use crate::firewall::{FirewallCompiler, MemoryRuleStore, TargetPolicy};
    use crate::flow::{
        DatapathId, FlowEntry, GatewayCall, GatewayError, RecordingGateway, RetryPolicy,
    };
    use crate::telemetry::ControllerMetrics;
    use crate::topology::HostLearner;
    use std::net::Ipv4Addr;

    struct Fixture {
        gateway: Arc<RecordingGateway>,
        topology: Arc<Topology>,
        firewall: Arc<FirewallCompiler>,
        controller: Controller,
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(RecordingGateway::new());
        let topology = Arc::new(Topology::new());
        let programmer = Arc::new(FlowProgrammer::new(
            gateway.clone(),
            RetryPolicy::none(),
            Arc::new(ControllerMetrics::new()),
        ));
        let firewall = Arc::new(FirewallCompiler::new(
            topology.clone(),
            programmer.clone(),
            Arc::new(MemoryRuleStore::new()),
            TargetPolicy::Broadcast,
        ));
        let classifier = Arc::new(PacketClassifier::new(
            programmer.clone(),
            Arc::new(HostLearner::new(topology.clone())),
            Arc::new(LearningPathManager::new(topology.clone(), programmer.clone())),
            firewall.clone(),
            MitigationPolicy::default(),
        ));
        Fixture {
            gateway,
            topology: topology.clone(),
            firewall,
            controller: Controller::new(topology, programmer, classifier),
        }
    }

    #[test]
    fn test_switch_lifecycle() {
        let f = fixture();
        f.controller
            .handle_event(SwitchEvent::SwitchReady { dpid: DatapathId(1) });
        f.controller.handle_event(SwitchEvent::PacketIn(PacketIn::new(
            DatapathId(1),
            2,
            frames::arp_request(frames::mac(4), Ipv4Addr::new(10, 0, 0, 4), Ipv4Addr::new(10, 0, 0, 1)),
        )));
        assert_eq!(f.topology.hosts().len(), 1);

        f.controller
            .handle_event(SwitchEvent::SwitchDisconnected { dpid: DatapathId(1) });
        assert!(f.topology.hosts().is_empty());
        assert!(f.topology.known_switches().is_empty());
    }

    #[test]
    fn test_reconnect_replays_blocks() {
        let f = fixture();
        f.controller
            .handle_event(SwitchEvent::SwitchReady { dpid: DatapathId(1) });
        f.firewall.block_source(Ipv4Addr::new(10, 0, 0, 5), 10);
        f.controller
            .handle_event(SwitchEvent::SwitchDisconnected { dpid: DatapathId(1) });
        f.gateway.clear();

        f.controller
            .handle_event(SwitchEvent::SwitchReady { dpid: DatapathId(1) });
        assert_eq!(f.gateway.installs().len(), 1);
    }

    #[test]
    fn test_flow_stats_reconcile() {
        let f = fixture();
        f.controller
            .handle_event(SwitchEvent::SwitchReady { dpid: DatapathId(1) });
        f.firewall.block_source(Ipv4Addr::new(10, 0, 0, 5), 10);
        f.gateway.clear();

        f.controller.handle_event(SwitchEvent::FlowStats {
            dpid: DatapathId(1),
            entries: Vec::<FlowEntry>::new(),
        });
        assert!(matches!(
            f.gateway.calls().as_slice(),
            [GatewayCall::Install { priority: 10, .. }]
        ));
    }

    #[tokio::test]
    async fn test_retry_backoff_does_not_stall_runtime() {
        let gateway = Arc::new(RecordingGateway::new());
        let topology = Arc::new(Topology::new());
        let programmer = Arc::new(FlowProgrammer::new(
            gateway.clone(),
            RetryPolicy {
                max_attempts: 2,
                backoff: Duration::from_millis(300),
            },
            Arc::new(ControllerMetrics::new()),
        ));
        let firewall = Arc::new(FirewallCompiler::new(
            topology.clone(),
            programmer.clone(),
            Arc::new(MemoryRuleStore::new()),
            TargetPolicy::Broadcast,
        ));
        let classifier = Arc::new(PacketClassifier::new(
            programmer.clone(),
            Arc::new(HostLearner::new(topology.clone())),
            Arc::new(LearningPathManager::new(topology.clone(), programmer.clone())),
            firewall.clone(),
            MitigationPolicy::default(),
        ));
        let controller = Controller::new(topology.clone(), programmer, classifier);

        topology.switch_ready(DatapathId(1));
        firewall.block_source(Ipv4Addr::new(10, 0, 0, 5), 10);
        gateway.clear();
        gateway.fail_next(GatewayError::Transient {
            dpid: DatapathId(1),
            reason: "busy".into(),
        });

        let (tx, rx) = mpsc::channel(4);
        tx.send(SwitchEvent::FlowStats {
            dpid: DatapathId(1),
            entries: Vec::new(),
        })
        .await
        .unwrap();
        drop(tx);
        let run = tokio::spawn(controller.run(rx));

        // the runtime keeps serving timers while the handler backs off
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(250));

        run.await.unwrap();
        assert_eq!(gateway.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_run_until_source_closes() {
        let f = fixture();
        let (tx, rx) = mpsc::channel(4);
        tx.send(SwitchEvent::SwitchReady { dpid: DatapathId(3) })
            .await
            .unwrap();
        drop(tx);

        f.controller.run(rx).await;
        assert_eq!(f.topology.known_switches(), vec![DatapathId(3)]);
    }
}
