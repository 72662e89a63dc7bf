//! Virtual machine lifecycle

use crate::command::{require_key, CORRELATION_KEY};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// VM collaborator: requests are acknowledged later by `*_ACK` functions
pub trait VmManager: Send + Sync {
    fn create(&self, field: &Value) -> Result<()>;
    fn modify(&self, field: &Value) -> Result<()>;
    fn delete(&self, field: &Value) -> Result<()>;
    fn start(&self, field: &Value) -> Result<()>;
    fn stop(&self, field: &Value) -> Result<()>;

    fn ack_for_create(&self, field: &Value) -> Result<()>;
    fn ack_for_modify(&self, field: &Value) -> Result<()>;
    fn ack_for_delete(&self, field: &Value) -> Result<()>;
    fn ack_for_start(&self, field: &Value) -> Result<()>;
    fn ack_for_stop(&self, field: &Value) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VmOperation {
    Create,
    Modify,
    Delete,
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmRecord {
    pub vm_id: String,
    /// Latest payload describing the VM
    pub spec: Value,
    pub power: PowerState,
    /// Operation awaiting its acknowledgement
    pub pending: Option<VmOperation>,
    /// Modification applied once acknowledged
    pub proposed: Option<Value>,
}

/// Keeps VM records in memory.
///
/// One operation per VM may be awaiting acknowledgement; a second request
/// for the same VM is refused until the first is acknowledged. Acks carrying
/// `"success": false` roll the operation back.
#[derive(Debug, Default)]
pub struct MemoryVmManager {
    vms: RwLock<BTreeMap<String, VmRecord>>,
}

impl MemoryVmManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vm_id: &str) -> Option<VmRecord> {
        self.vms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(vm_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.vms.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&self, op: VmOperation, field: &Value) -> Result<()> {
        let vm_id = require_key(field, "vm_id")?;
        let mut vms = self.vms.write().unwrap_or_else(|e| e.into_inner());

        if op == VmOperation::Create {
            if vms.contains_key(&vm_id) {
                return Err(Error::Manager(format!("vm {} already exists", vm_id)));
            }
            vms.insert(
                vm_id.clone(),
                VmRecord {
                    vm_id: vm_id.clone(),
                    spec: payload(field),
                    power: PowerState::Stopped,
                    pending: Some(op),
                    proposed: None,
                },
            );
            info!(%vm_id, "vm create requested");
            return Ok(());
        }

        let record = vms
            .get_mut(&vm_id)
            .ok_or_else(|| Error::Manager(format!("unknown vm {}", vm_id)))?;
        if let Some(busy) = record.pending {
            return Err(Error::Manager(format!(
                "vm {} is waiting for {:?} acknowledgement",
                vm_id, busy
            )));
        }
        if op == VmOperation::Modify {
            record.proposed = Some(payload(field));
        }
        record.pending = Some(op);
        info!(%vm_id, ?op, "vm operation requested");
        Ok(())
    }

    fn complete(&self, op: VmOperation, field: &Value) -> Result<()> {
        let vm_id = require_key(field, "vm_id")?;
        let success = field.get("success").and_then(Value::as_bool).unwrap_or(true);
        let mut vms = self.vms.write().unwrap_or_else(|e| e.into_inner());

        let record = vms
            .get_mut(&vm_id)
            .ok_or_else(|| Error::Manager(format!("ack for unknown vm {}", vm_id)))?;
        if record.pending != Some(op) {
            return Err(Error::Manager(format!(
                "vm {} has no pending {:?}",
                vm_id, op
            )));
        }
        record.pending = None;
        let proposed = record.proposed.take();

        if !success {
            warn!(%vm_id, ?op, "vm operation failed");
            if op == VmOperation::Create {
                vms.remove(&vm_id);
            }
            return Ok(());
        }

        match op {
            VmOperation::Delete => {
                vms.remove(&vm_id);
            }
            VmOperation::Start => record.power = PowerState::Running,
            VmOperation::Stop => record.power = PowerState::Stopped,
            VmOperation::Modify => {
                if let Some(update) = proposed {
                    merge(&mut record.spec, &update);
                }
            }
            VmOperation::Create => {}
        }
        debug!(%vm_id, ?op, "vm operation acknowledged");
        Ok(())
    }
}

/// Request payload as stored: the correlation token is dropped
pub(crate) fn payload(field: &Value) -> Value {
    let mut stored = field.clone();
    if let Value::Object(map) = &mut stored {
        map.remove(CORRELATION_KEY);
    }
    stored
}

/// Shallow-merge the keys of `update` into `spec`, except the correlation token
pub(crate) fn merge(spec: &mut Value, update: &Value) {
    if let (Value::Object(spec), Value::Object(update)) = (spec, update) {
        for (k, v) in update.iter().filter(|(k, _)| k.as_str() != CORRELATION_KEY) {
            spec.insert(k.clone(), v.clone());
        }
    }
}

impl VmManager for MemoryVmManager {
    fn create(&self, field: &Value) -> Result<()> {
        self.begin(VmOperation::Create, field)
    }

    fn modify(&self, field: &Value) -> Result<()> {
        self.begin(VmOperation::Modify, field)
    }

    fn delete(&self, field: &Value) -> Result<()> {
        self.begin(VmOperation::Delete, field)
    }

    fn start(&self, field: &Value) -> Result<()> {
        self.begin(VmOperation::Start, field)
    }

    fn stop(&self, field: &Value) -> Result<()> {
        self.begin(VmOperation::Stop, field)
    }

    fn ack_for_create(&self, field: &Value) -> Result<()> {
        self.complete(VmOperation::Create, field)
    }

    fn ack_for_modify(&self, field: &Value) -> Result<()> {
        self.complete(VmOperation::Modify, field)
    }

    fn ack_for_delete(&self, field: &Value) -> Result<()> {
        self.complete(VmOperation::Delete, field)
    }

    fn ack_for_start(&self, field: &Value) -> Result<()> {
        self.complete(VmOperation::Start, field)
    }

    fn ack_for_stop(&self, field: &Value) -> Result<()> {
        self.complete(VmOperation::Stop, field)
    }
}
