//! User accounts

use super::vm::{merge, payload};
use crate::command::require_key;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;
use tracing::{info, warn};

/// User collaborator. `update` is acknowledged by `VM_STATUS_ACK`.
pub trait UserManager: Send + Sync {
    fn create(&self, field: &Value) -> Result<()>;
    fn delete(&self, field: &Value) -> Result<()>;
    fn update(&self, field: &Value) -> Result<()>;
    fn ack_for_update(&self, field: &Value) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    pub profile: Value,
    /// Updates waiting for their acknowledgements, oldest first
    pub pending_updates: VecDeque<Value>,
}

/// Keeps user records in memory; updates apply in order as they are
/// acknowledged
#[derive(Debug, Default)]
pub struct MemoryUserManager {
    users: RwLock<BTreeMap<String, UserRecord>>,
}

impl MemoryUserManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserManager for MemoryUserManager {
    fn create(&self, field: &Value) -> Result<()> {
        let user_id = require_key(field, "user_id")?;
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(&user_id) {
            return Err(Error::Manager(format!("user {} already exists", user_id)));
        }
        info!(%user_id, "user created");
        users.insert(
            user_id.clone(),
            UserRecord {
                user_id,
                profile: payload(field),
                pending_updates: VecDeque::new(),
            },
        );
        Ok(())
    }

    fn delete(&self, field: &Value) -> Result<()> {
        let user_id = require_key(field, "user_id")?;
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&user_id)
            .ok_or_else(|| Error::Manager(format!("unknown user {}", user_id)))?;
        info!(%user_id, "user deleted");
        Ok(())
    }

    fn update(&self, field: &Value) -> Result<()> {
        let user_id = require_key(field, "user_id")?;
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let record = users
            .get_mut(&user_id)
            .ok_or_else(|| Error::Manager(format!("unknown user {}", user_id)))?;
        record.pending_updates.push_back(payload(field));
        if record.pending_updates.len() > 1 {
            warn!(%user_id, queued = record.pending_updates.len(), "update queued behind unacknowledged updates");
        }
        Ok(())
    }

    fn ack_for_update(&self, field: &Value) -> Result<()> {
        let user_id = require_key(field, "user_id")?;
        let success = field.get("success").and_then(Value::as_bool).unwrap_or(true);
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let record = users
            .get_mut(&user_id)
            .ok_or_else(|| Error::Manager(format!("ack for unknown user {}", user_id)))?;
        let update = record
            .pending_updates
            .pop_front()
            .ok_or_else(|| Error::Manager(format!("user {} has no pending update", user_id)))?;

        if success {
            merge(&mut record.profile, &update);
            info!(%user_id, "user update applied");
        } else {
            warn!(%user_id, "user update rejected");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_applies_on_ack() {
        let users = MemoryUserManager::new();
        users.create(&json!({"user_id": "u1", "plan": "basic"})).unwrap();
        users.update(&json!({"user_id": "u1", "plan": "pro"})).unwrap();
        assert_eq!(users.get("u1").unwrap().profile["plan"], json!("basic"));

        users.ack_for_update(&json!({"user_id": "u1"})).unwrap();
        let record = users.get("u1").unwrap();
        assert_eq!(record.profile["plan"], json!("pro"));
        assert!(record.pending_updates.is_empty());
    }

    #[test]
    fn test_rejected_update_is_dropped() {
        let users = MemoryUserManager::new();
        users.create(&json!({"user_id": 1, "plan": "basic"})).unwrap();
        users.update(&json!({"user_id": 1, "plan": "pro"})).unwrap();
        users
            .ack_for_update(&json!({"user_id": "1", "success": false}))
            .unwrap();

        assert_eq!(users.get("1").unwrap().profile["plan"], json!("basic"));
        assert!(users.ack_for_update(&json!({"user_id": "1"})).is_err());
    }

    #[test]
    fn test_queued_updates_apply_in_order() {
        let users = MemoryUserManager::new();
        users.create(&json!({"user_id": "u1"})).unwrap();
        users
            .update(&json!({"user_id": "u1", "q": 1, "correlation_id": "a"}))
            .unwrap();
        users
            .update(&json!({"user_id": "u1", "q": 2, "correlation_id": "b"}))
            .unwrap();

        users.ack_for_update(&json!({"user_id": "u1"})).unwrap();
        assert_eq!(users.get("u1").unwrap().profile, json!({"user_id": "u1", "q": 1}));
        users.ack_for_update(&json!({"user_id": "u1"})).unwrap();
        assert_eq!(users.get("u1").unwrap().profile, json!({"user_id": "u1", "q": 2}));
        assert!(users.ack_for_update(&json!({"user_id": "u1"})).is_err());
    }

    #[test]
    fn test_create_delete() {
        let users = MemoryUserManager::new();
        users.create(&json!({"user_id": "u1"})).unwrap();
        assert!(users.create(&json!({"user_id": "u1"})).is_err());
        users.delete(&json!({"user_id": "u1"})).unwrap();
        assert!(users.delete(&json!({"user_id": "u1"})).is_err());
        assert!(users.is_empty());
    }
}
