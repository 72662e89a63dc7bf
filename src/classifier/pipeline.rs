//! Per-packet classification and automatic mitigation

use super::counter::{MitigationPolicy, SourceCounter, Verdict};
use super::path::PathManager;
use super::PacketIn;
use crate::firewall::FirewallCompiler;
use crate::flow::FlowProgrammer;
use crate::telemetry::ControllerMetrics;
use crate::topology::TopologyLearner;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// What the classifier did with a packet-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Address-assignment exchange flooded on the originating switch
    Flooded,
    /// Handed to the learning and path collaborators
    Forwarded,
    /// Forwarded, and this packet tripped an automatic block of the source
    Blocked(Ipv4Addr),
    /// Frame did not decode
    Skipped,
}

pub struct PacketClassifier {
    programmer: Arc<FlowProgrammer>,
    learner: Arc<dyn TopologyLearner>,
    path: Arc<dyn PathManager>,
    firewall: Arc<FirewallCompiler>,
    counter: Mutex<SourceCounter>,
    metrics: Arc<ControllerMetrics>,
}

impl PacketClassifier {
    pub fn new(
        programmer: Arc<FlowProgrammer>,
        learner: Arc<dyn TopologyLearner>,
        path: Arc<dyn PathManager>,
        firewall: Arc<FirewallCompiler>,
        policy: MitigationPolicy,
    ) -> Self {
        let metrics = programmer.metrics().clone();
        Self {
            programmer,
            learner,
            path,
            firewall,
            counter: Mutex::new(SourceCounter::new(policy)),
            metrics,
        }
    }

    pub fn handle(&self, event: &PacketIn) -> Disposition {
        self.handle_at(event, Instant::now())
    }

    pub fn handle_at(&self, event: &PacketIn, now: Instant) -> Disposition {
        self.metrics.packet_ins.inc();

        let headers = match event.headers() {
            Ok(headers) => headers,
            Err(e) => {
                self.metrics.packet_ins_malformed.inc();
                warn!(dpid = %event.dpid, port = event.in_port, len = event.data.len(), "skipping packet-in: {}", e);
                return Disposition::Skipped;
            }
        };

        if headers.is_address_assignment() {
            trace!(dpid = %event.dpid, port = event.in_port, kind = ?headers.dhcp, "flooding DHCP");
            self.metrics.dhcp_floods.inc();
            if let Err(e) = self.programmer.flood(event.dpid, event.in_port, &event.data) {
                warn!(dpid = %event.dpid, "DHCP flood failed: {}", e);
            }
            return Disposition::Flooded;
        }

        self.learner.packet_in(event, &headers);
        if !headers.is_lldp() {
            self.path.packet_in(event, &headers);
        }

        // Only UDP over IPv4 is counted
        let Some(source) = headers.source_ip().filter(|_| headers.is_udp_over_ipv4()) else {
            return Disposition::Forwarded;
        };

        let (verdict, priority) = {
            let mut counter = self.counter();
            let verdict = counter.record(source, now);
            (verdict, counter.policy().block_priority)
        };
        match verdict {
            Verdict::Counted(count) => {
                trace!(%source, count, "UDP packet counted");
                Disposition::Forwarded
            }
            Verdict::AlreadyBlocked => Disposition::Forwarded,
            Verdict::Trip => {
                self.metrics.auto_blocks.inc();
                let report = self.firewall.block_source(source, priority);
                if !report.is_complete() {
                    warn!(%source, failed = report.failed.len(), "automatic block partially installed");
                }
                Disposition::Blocked(source)
            }
        }
    }

    /// Expire counting windows and lift blocks whose TTL elapsed.
    /// Returns the number of sources unblocked.
    pub fn run_aging(&self, now: Instant) -> usize {
        let (expired, priority) = {
            let mut counter = self.counter();
            let expired = counter.expire(now);
            (expired, counter.policy().block_priority)
        };
        for source in &expired {
            self.firewall.unblock_source(*source, priority);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "automatic blocks expired");
        }
        expired.len()
    }

    /// Packets counted for `source` in its current window
    pub fn source_count(&self, source: Ipv4Addr) -> u64 {
        self.counter().count(source)
    }

    fn counter(&self) -> std::sync::MutexGuard<'_, SourceCounter> {
        self.counter.lock().unwrap_or_else(|e| e.into_inner())
    }
}
