//! Per-source packet counting for burst detection

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Count above which a source is blocked
pub const DEFAULT_THRESHOLD: u64 = 3;

/// Priority of automatic block entries
pub const DEFAULT_BLOCK_PRIORITY: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MitigationPolicy {
    /// A source is blocked when its count exceeds this
    pub threshold: u64,
    pub block_priority: u16,
    /// Counting window. `None` counts for the lifetime of the process.
    pub window: Option<Duration>,
    /// How long an automatic block stays. `None` keeps it forever.
    pub block_ttl: Option<Duration>,
}

impl Default for MitigationPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            block_priority: DEFAULT_BLOCK_PRIORITY,
            window: None,
            block_ttl: None,
        }
    }
}

/// Result of counting one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Count after this packet, still within the threshold
    Counted(u64),
    /// This packet crossed the threshold; the source must be blocked now
    Trip,
    /// The source is already blocked
    AlreadyBlocked,
}

#[derive(Debug, Clone, Copy)]
struct SourceState {
    count: u64,
    window_start: Instant,
    blocked_at: Option<Instant>,
}

#[derive(Debug)]
pub struct SourceCounter {
    policy: MitigationPolicy,
    sources: HashMap<Ipv4Addr, SourceState>,
}

impl SourceCounter {
    pub fn new(policy: MitigationPolicy) -> Self {
        Self {
            policy,
            sources: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &MitigationPolicy {
        &self.policy
    }

    pub fn record(&mut self, source: Ipv4Addr, now: Instant) -> Verdict {
        let state = self.sources.entry(source).or_insert(SourceState {
            count: 0,
            window_start: now,
            blocked_at: None,
        });

        if let Some(window) = self.policy.window {
            if now.saturating_duration_since(state.window_start) >= window {
                state.count = 0;
                state.window_start = now;
            }
        }
        state.count += 1;

        if state.blocked_at.is_some() {
            return Verdict::AlreadyBlocked;
        }
        if state.count > self.policy.threshold {
            state.blocked_at = Some(now);
            return Verdict::Trip;
        }
        Verdict::Counted(state.count)
    }

    /// Lift blocks older than the TTL and prune sources idle for a whole
    /// window. Returns the unblocked sources in ascending order.
    pub fn expire(&mut self, now: Instant) -> Vec<Ipv4Addr> {
        let mut unblocked = Vec::new();

        if let Some(ttl) = self.policy.block_ttl {
            for (source, state) in self.sources.iter_mut() {
                let Some(blocked_at) = state.blocked_at else {
                    continue;
                };
                if now.saturating_duration_since(blocked_at) >= ttl {
                    state.blocked_at = None;
                    state.count = 0;
                    state.window_start = now;
                    unblocked.push(*source);
                }
            }
        }

        if let Some(window) = self.policy.window {
            self.sources.retain(|_, state| {
                state.blocked_at.is_some()
                    || now.saturating_duration_since(state.window_start) < window
            });
        }

        unblocked.sort();
        unblocked
    }

    /// Packets counted for `source` in its current window
    pub fn count(&self, source: Ipv4Addr) -> u64 {
        self.sources.get(&source).map_or(0, |s| s.count)
    }

    pub fn is_blocked(&self, source: Ipv4Addr) -> bool {
        self.sources
            .get(&source)
            .is_some_and(|s| s.blocked_at.is_some())
    }

    /// Number of tracked sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
