//! Flow-table gateway boundary
//!
//! The switch transport implements [`FlowGateway`]; the controller only
//! ever mutates switch state through these four primitives.

use super::{Action, DatapathId, FlowMatch};
use std::sync::Mutex;

/// Failure reported by the switch transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Worth retrying (e.g. transport backpressure)
    #[error("transient failure on {dpid}: {reason}")]
    Transient { dpid: DatapathId, reason: String },

    /// Switch or transport gone; retrying cannot help
    #[error("switch {0} is not reachable")]
    Disconnected(DatapathId),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient { .. })
    }
}

/// Mutation primitives accepted by the switch transport
pub trait FlowGateway: Send + Sync {
    /// Add a flow entry. An empty `actions` slice installs a drop entry.
    fn install(
        &self,
        dpid: DatapathId,
        priority: u16,
        flow_match: &FlowMatch,
        actions: &[Action],
    ) -> Result<(), GatewayError>;

    /// Strictly delete the entry with this priority and match.
    /// Removing an entry the switch does not have is not an error.
    fn remove(
        &self,
        dpid: DatapathId,
        priority: u16,
        flow_match: &FlowMatch,
    ) -> Result<(), GatewayError>;

    /// Send `data` out of every port of `dpid` except `in_port`
    fn flood(&self, dpid: DatapathId, in_port: u16, data: &[u8]) -> Result<(), GatewayError>;

    /// Send `data` applying `actions`
    fn packet_out(
        &self,
        dpid: DatapathId,
        data: &[u8],
        actions: &[Action],
    ) -> Result<(), GatewayError>;
}

/// A call observed by [`RecordingGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Install {
        dpid: DatapathId,
        priority: u16,
        flow_match: FlowMatch,
        actions: Vec<Action>,
    },
    Remove {
        dpid: DatapathId,
        priority: u16,
        flow_match: FlowMatch,
    },
    Flood {
        dpid: DatapathId,
        in_port: u16,
        len: usize,
    },
    PacketOut {
        dpid: DatapathId,
        actions: Vec<Action>,
    },
}

/// In-memory gateway that records every call.
///
/// Used for dry runs and tests. Failures can be scripted per call with
/// [`RecordingGateway::fail_next`].
#[derive(Debug, Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    failures: Mutex<Vec<GatewayError>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next mutation with `error` (queued, first in first out)
    pub fn fail_next(&self, error: GatewayError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(error);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn installs(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Install { .. }))
            .collect()
    }

    pub fn removes(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Remove { .. }))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        if !failures.is_empty() {
            return Err(failures.remove(0));
        }
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        Ok(())
    }
}

impl FlowGateway for RecordingGateway {
    fn install(
        &self,
        dpid: DatapathId,
        priority: u16,
        flow_match: &FlowMatch,
        actions: &[Action],
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Install {
            dpid,
            priority,
            flow_match: flow_match.clone(),
            actions: actions.to_vec(),
        })
    }

    fn remove(
        &self,
        dpid: DatapathId,
        priority: u16,
        flow_match: &FlowMatch,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Remove {
            dpid,
            priority,
            flow_match: flow_match.clone(),
        })
    }

    fn flood(&self, dpid: DatapathId, in_port: u16, data: &[u8]) -> Result<(), GatewayError> {
        self.record(GatewayCall::Flood {
            dpid,
            in_port,
            len: data.len(),
        })
    }

    fn packet_out(
        &self,
        dpid: DatapathId,
        _data: &[u8],
        actions: &[Action],
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::PacketOut {
            dpid,
            actions: actions.to_vec(),
        })
    }
}
