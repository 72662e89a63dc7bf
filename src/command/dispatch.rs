//! Function dispatch

use super::message::{ControlMessage, Function, StatusReply};
use super::pending::{AckMatch, PendingRequest, PendingTable};
use crate::firewall::{FirewallCompiler, FirewallRule, RuleKey};
use crate::flow::Distribution;
use crate::managers::{HostManager, UserManager, VmManager};
use crate::telemetry::ControllerMetrics;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Routes control messages to the managers and the firewall compiler
pub struct Dispatcher {
    vms: Arc<dyn VmManager>,
    users: Arc<dyn UserManager>,
    hosts: Arc<dyn HostManager>,
    firewall: Arc<FirewallCompiler>,
    pending: Mutex<PendingTable>,
    metrics: Arc<ControllerMetrics>,
}

impl Dispatcher {
    pub fn new(
        vms: Arc<dyn VmManager>,
        users: Arc<dyn UserManager>,
        hosts: Arc<dyn HostManager>,
        firewall: Arc<FirewallCompiler>,
        metrics: Arc<ControllerMetrics>,
    ) -> Self {
        Self {
            vms,
            users,
            hosts,
            firewall,
            pending: Mutex::new(PendingTable::new()),
            metrics,
        }
    }

    /// Handle one connection payload. Nothing escapes: every failure is
    /// logged, counted and turned into a failed reply.
    pub fn handle_payload(&self, payload: &[u8]) -> StatusReply {
        let message = match ControlMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                self.metrics.commands_malformed.inc();
                warn!(bytes = payload.len(), "dropping malformed command: {}", e);
                return StatusReply::failed(e.to_string());
            }
        };
        self.metrics.commands_received.inc();

        let function = message.function.clone();
        match self.dispatch(message) {
            Ok(summary) => StatusReply::ok(summary),
            Err(e @ Error::UnknownFunction(_)) => {
                self.metrics.commands_unknown.inc();
                warn!(%function, "ignoring unknown function");
                StatusReply::failed(e.to_string())
            }
            Err(e) => {
                self.metrics.commands_failed.inc();
                warn!(%function, "command failed: {}", e);
                StatusReply::failed(e.to_string())
            }
        }
    }

    /// Dispatch a parsed message, returning a one-line summary
    pub fn dispatch(&self, message: ControlMessage) -> Result<String> {
        let function: Function = message.function.parse()?;
        let mut field = message.field;
        info!(%function, "dispatching");
        if function.is_ack() {
            self.settle(function, &field);
        }

        match function {
            Function::UserCreate => self.users.create(&field)?,
            Function::UserDelete => self.users.delete(&field)?,
            Function::UserUpdate => {
                return self.request(function, &mut field, |f| self.users.update(f))
            }
            Function::VmCreate => return self.request(function, &mut field, |f| self.vms.create(f)),
            Function::VmModify => return self.request(function, &mut field, |f| self.vms.modify(f)),
            Function::VmDelete => return self.request(function, &mut field, |f| self.vms.delete(f)),
            Function::VmStart => return self.request(function, &mut field, |f| self.vms.start(f)),
            Function::VmStop => return self.request(function, &mut field, |f| self.vms.stop(f)),
            Function::VmCreateAck => self.vms.ack_for_create(&field)?,
            Function::VmModifyAck => self.vms.ack_for_modify(&field)?,
            Function::VmDeleteAck => self.vms.ack_for_delete(&field)?,
            Function::VmStartAck => self.vms.ack_for_start(&field)?,
            Function::VmStopAck => self.vms.ack_for_stop(&field)?,
            Function::VmStatusAck => self.users.ack_for_update(&field)?,
            Function::HostUpdate => self.hosts.update(&field)?,
            Function::FwControlAdd => {
                let report = self.firewall.add(FirewallRule::from_field(&field)?)?;
                return Ok(summarize(function, &report));
            }
            Function::FwControlModify => {
                let report = self.firewall.modify(FirewallRule::from_field(&field)?)?;
                return Ok(summarize(function, &report));
            }
            Function::FwControlDelete => {
                let report = self.firewall.delete(&RuleKey::from_field(&field)?)?;
                return Ok(summarize(function, &report));
            }
        }
        Ok(format!("{} done", function))
    }

    /// Requests still waiting for their acknowledgement
    pub fn pending(&self) -> Vec<PendingRequest> {
        self.table().requests()
    }

    /// Stamp a correlation token, then hand the request to its manager
    fn request<F>(&self, function: Function, field: &mut Value, forward: F) -> Result<String>
    where
        F: FnOnce(&Value) -> Result<()>,
    {
        let token = self.table().issue(function, field);
        debug!(%function, %token, "tracking request");
        if let Err(e) = forward(&*field) {
            self.table().withdraw(&token);
            return Err(e);
        }
        Ok(format!("{} accepted, correlation_id={}", function, token))
    }

    fn settle(&self, ack: Function, field: &Value) {
        match self.table().acknowledge(ack, field) {
            AckMatch::Token(request) | AckMatch::DomainKey(request) => {
                debug!(%ack, request = %request.function, token = %request.token, "request acknowledged");
            }
            AckMatch::Oldest { request, candidates } => {
                warn!(%ack, request = %request.function, token = %request.token, candidates, "acknowledgement without token, closed oldest request");
            }
            AckMatch::Unmatched => {
                warn!(%ack, "acknowledgement matches no pending request");
            }
        }
    }

    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn summarize(function: Function, report: &Distribution) -> String {
    if report.is_complete() {
        format!("{}: {} switches programmed", function, report.succeeded.len())
    } else {
        warn!(
            %function,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "partial flow distribution"
        );
        format!(
            "{}: {} switches programmed, {} failed",
            function,
            report.succeeded.len(),
            report.failed.len()
        )
    }
}
