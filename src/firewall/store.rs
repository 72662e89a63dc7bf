//! Persisted firewall rules, keyed by (user id, rule number)

use super::rule::{FirewallRule, RuleKey};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{info, warn};

/// Rule storage collaborator consulted by Modify and Delete
pub trait RuleStore: Send + Sync {
    fn get(&self, key: &RuleKey) -> Option<FirewallRule>;
    /// Insert or replace, returning the previous rule
    fn put(&self, rule: FirewallRule) -> Option<FirewallRule>;
    fn remove(&self, key: &RuleKey) -> Option<FirewallRule>;
}

#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: RwLock<BTreeMap<RuleKey, FirewallRule>>,
}

#[derive(Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Deserialize)]
struct UserRecord {
    user_id: Value,
    #[serde(default)]
    fw_rule: Vec<Value>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a users document:
    /// `{"users":[{"user_id":..,"fw_rule":[{"rule_no":..,..}]}]}`.
    ///
    /// Rules inherit the enclosing `user_id` when they do not carry one.
    /// Invalid rules are skipped with a warning.
    pub fn from_users_json(text: &str) -> Result<Self> {
        let doc: UsersFile = serde_json::from_str(text)?;
        let store = Self::new();
        for user in doc.users {
            for mut raw in user.fw_rule {
                if let Value::Object(map) = &mut raw {
                    map.entry("user_id").or_insert_with(|| user.user_id.clone());
                }
                match FirewallRule::from_field(&raw) {
                    Ok(rule) => {
                        store.put(rule);
                    }
                    Err(e) => warn!(user_id = %user.user_id, "skipping stored rule: {}", e),
                }
            }
        }
        Ok(store)
    }

    pub fn load_users_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read users file {}: {}", path.display(), e))
        })?;
        let store = Self::from_users_json(&text)?;
        info!(path = %path.display(), rules = store.len(), "loaded firewall rules");
        Ok(store)
    }

    /// Rules of one user, ascending rule number
    pub fn rules_for(&self, user_id: &str) -> Vec<FirewallRule> {
        self.read()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<RuleKey, FirewallRule>> {
        self.rules.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<RuleKey, FirewallRule>> {
        self.rules.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RuleStore for MemoryRuleStore {
    fn get(&self, key: &RuleKey) -> Option<FirewallRule> {
        self.read().get(key).cloned()
    }

    fn put(&self, rule: FirewallRule) -> Option<FirewallRule> {
        self.write().insert(rule.key(), rule)
    }

    fn remove(&self, key: &RuleKey) -> Option<FirewallRule> {
        self.write().remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = r#"{
        "users": [
            {"user_id": "alice", "fw_rule": [
                {"rule_no": "2", "allow": false, "destination_tcp_port": "22"},
                {"rule_no": 1, "allow": true}
            ]},
            {"user_id": 42, "fw_rule": [
                {"rule_no": "7", "allow": false, "source_ip_address": "10.0.0.8"},
                {"rule_no": "9999"}
            ]},
            {"user_id": "bob"}
        ]
    }"#;

    #[test]
    fn test_seed_from_users_document() {
        let store = MemoryRuleStore::from_users_json(USERS).unwrap();
        assert_eq!(store.len(), 3);

        let alice = store.rules_for("alice");
        assert_eq!(alice.iter().map(|r| r.rule_no).collect::<Vec<_>>(), vec![1, 2]);

        let key = RuleKey {
            user_id: "42".into(),
            rule_no: 7,
        };
        let rule = store.get(&key).unwrap();
        assert_eq!(rule.source_ip_address, Some("10.0.0.8".parse().unwrap()));
    }

    #[test]
    fn test_put_get_remove() {
        let store = MemoryRuleStore::new();
        let rule = FirewallRule::from_field(&serde_json::json!({
            "user_id": "u", "rule_no": 3, "allow": false
        }))
        .unwrap();

        assert_eq!(store.put(rule.clone()), None);
        assert_eq!(store.put(rule.clone()), Some(rule.clone()));
        assert_eq!(store.remove(&rule.key()), Some(rule.clone()));
        assert_eq!(store.get(&rule.key()), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(MemoryRuleStore::from_users_json("users:").is_err());
    }
}
