//! Controller counters.
//!
//! Shared between the command server, the switch event loop and the flow
//! programmer, so every counter is a relaxed atomic.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for everything the controller does.
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    // Command protocol
    /// Connections whose payload parsed as a control message
    pub commands_received: Counter,
    /// Payloads that were not a JSON object with a `function` key
    pub commands_malformed: Counter,
    /// Messages naming a function outside the dispatch table
    pub commands_unknown: Counter,
    /// Dispatched commands whose handler returned an error
    pub commands_failed: Counter,

    // Switch events
    pub packet_ins: Counter,
    /// Packet-ins skipped because the frame did not decode
    pub packet_ins_malformed: Counter,
    /// Address-assignment packets flooded without further processing
    pub dhcp_floods: Counter,
    /// Automatic source blocks installed by the mitigator
    pub auto_blocks: Counter,

    // Flow table mutations (per switch)
    pub flow_installs: Counter,
    pub flow_removes: Counter,
    /// Mutations that still failed after all retries
    pub flow_failures: Counter,
    /// Intended entries re-installed by reconciliation
    pub flow_reconciled: Counter,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports all counters as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        [
            ("commands_received", &self.commands_received),
            ("commands_malformed", &self.commands_malformed),
            ("commands_unknown", &self.commands_unknown),
            ("commands_failed", &self.commands_failed),
            ("packet_ins", &self.packet_ins),
            ("packet_ins_malformed", &self.packet_ins_malformed),
            ("dhcp_floods", &self.dhcp_floods),
            ("auto_blocks", &self.auto_blocks),
            ("flow_installs", &self.flow_installs),
            ("flow_removes", &self.flow_removes),
            ("flow_failures", &self.flow_failures),
            ("flow_reconciled", &self.flow_reconciled),
        ]
        .into_iter()
        .map(|(name, counter)| (name.to_string(), counter.get()))
        .collect()
    }
}
