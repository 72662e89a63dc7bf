//! In-flight asynchronous requests and their acknowledgements
//!
//! Each VM request and `USER_UPDATE` gets a correlation token written into
//! its payload as `correlation_id`. An acknowledgement closes its request by
//! echoing the token. Acks without a token fall back to the domain key
//! (`vm_id` / `user_id`). When several requests for that key are in
//! flight, the oldest one is closed.

use super::message::{text_key, Function};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

pub const CORRELATION_KEY: &str = "correlation_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub token: String,
    pub function: Function,
    /// Value of the function's domain key, if the payload carried one
    pub key: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Issue order within the table
    pub seq: u64,
}

/// How an acknowledgement was correlated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckMatch {
    /// Closed by the echoed token
    Token(PendingRequest),
    /// Closed by domain key, the only candidate
    DomainKey(PendingRequest),
    /// Several requests for the same key were in flight; the oldest closed
    Oldest {
        request: PendingRequest,
        candidates: usize,
    },
    /// Nothing in flight matches
    Unmatched,
}

#[derive(Debug)]
pub struct PendingTable {
    epoch: i64,
    next_token: u64,
    next_seq: u64,
    requests: HashMap<String, PendingRequest>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            epoch: Utc::now().timestamp_millis(),
            next_token: 1,
            next_seq: 0,
            requests: HashMap::new(),
        }
    }

    /// Register an outgoing request and stamp its payload with the token.
    ///
    /// A token already present in the payload is kept unless another
    /// request is using it.
    pub fn issue(&mut self, function: Function, field: &mut Value) -> String {
        let token = match text_key(field, CORRELATION_KEY) {
            Some(token) if !self.requests.contains_key(&token) => token,
            _ => self.generate(),
        };
        if let Value::Object(map) = field {
            map.insert(CORRELATION_KEY.to_string(), Value::String(token.clone()));
        }

        let key = function.domain_key().and_then(|k| text_key(field, k));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.requests.insert(
            token.clone(),
            PendingRequest {
                token: token.clone(),
                function,
                key,
                issued_at: Utc::now(),
                seq,
            },
        );
        token
    }

    /// Close the request an acknowledgement answers. A token only closes a
    /// request that `ack` acknowledges.
    pub fn acknowledge(&mut self, ack: Function, field: &Value) -> AckMatch {
        if let Some(token) = text_key(field, CORRELATION_KEY) {
            let answers = self
                .requests
                .get(&token)
                .is_some_and(|r| r.function.ack() == Some(ack));
            if answers {
                if let Some(request) = self.requests.remove(&token) {
                    return AckMatch::Token(request);
                }
            }
        }

        let Some(key) = ack.domain_key().and_then(|k| text_key(field, k)) else {
            return AckMatch::Unmatched;
        };
        let mut candidates: Vec<(u64, String)> = self
            .requests
            .values()
            .filter(|r| r.function.ack() == Some(ack) && r.key.as_deref() == Some(key.as_str()))
            .map(|r| (r.seq, r.token.clone()))
            .collect();
        candidates.sort();

        let count = candidates.len();
        let Some(request) = candidates
            .first()
            .and_then(|(_, token)| self.requests.remove(token))
        else {
            return AckMatch::Unmatched;
        };
        if count == 1 {
            AckMatch::DomainKey(request)
        } else {
            AckMatch::Oldest {
                request,
                candidates: count,
            }
        }
    }

    /// Drop a request the manager refused
    pub fn withdraw(&mut self, token: &str) -> Option<PendingRequest> {
        self.requests.remove(token)
    }

    /// In-flight requests, oldest first
    pub fn requests(&self) -> Vec<PendingRequest> {
        let mut requests: Vec<PendingRequest> = self.requests.values().cloned().collect();
        requests.sort_by_key(|r| r.seq);
        requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn generate(&mut self) -> String {
        loop {
            let token = format!("{:x}-{:06}", self.epoch, self.next_token);
            self.next_token += 1;
            if !self.requests.contains_key(&token) {
                return token;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_stamps_token() {
        let mut table = PendingTable::new();
        let mut field = json!({"vm_id": "vm-1"});

        let token = table.issue(Function::VmStart, &mut field);
        assert_eq!(field[CORRELATION_KEY], json!(token));
        assert_eq!(table.len(), 1);
        assert_eq!(table.requests()[0].key.as_deref(), Some("vm-1"));
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut table = PendingTable::new();
        let a = table.issue(Function::VmStart, &mut json!({"vm_id": "vm-1"}));
        let b = table.issue(Function::VmStart, &mut json!({"vm_id": "vm-1"}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_ack_by_token() {
        let mut table = PendingTable::new();
        let first = table.issue(Function::VmStart, &mut json!({"vm_id": "vm-1"}));
        table.issue(Function::VmStart, &mut json!({"vm_id": "vm-1"}));

        let outcome = table.acknowledge(
            Function::VmStartAck,
            &json!({"vm_id": "vm-1", CORRELATION_KEY: first}),
        );
        assert!(matches!(outcome, AckMatch::Token(ref r) if r.token == first));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_ack_by_domain_key_closes_oldest() {
        let mut table = PendingTable::new();
        let first = table.issue(Function::VmStop, &mut json!({"vm_id": "vm-1"}));
        let second = table.issue(Function::VmStop, &mut json!({"vm_id": "vm-1"}));

        let outcome = table.acknowledge(Function::VmStopAck, &json!({"vm_id": "vm-1"}));
        assert!(matches!(
            outcome,
            AckMatch::Oldest { ref request, candidates: 2 } if request.token == first
        ));
        assert_eq!(table.len(), 1);

        let outcome = table.acknowledge(Function::VmStopAck, &json!({"vm_id": "vm-1"}));
        assert!(matches!(outcome, AckMatch::DomainKey(ref r) if r.token == second));
        assert!(table.is_empty());
    }

    #[test]
    fn test_token_of_other_function_is_not_closed() {
        let mut table = PendingTable::new();
        let token = table.issue(Function::UserUpdate, &mut json!({"user_id": "u1"}));

        let outcome = table.acknowledge(
            Function::VmStartAck,
            &json!({"vm_id": "vm-1", CORRELATION_KEY: token}),
        );
        assert_eq!(outcome, AckMatch::Unmatched);
        assert_eq!(table.requests()[0].token, token);
    }

    #[test]
    fn test_ack_by_domain_key() {
        let mut table = PendingTable::new();
        table.issue(Function::UserUpdate, &mut json!({"user_id": 7}));
        table.issue(Function::VmCreate, &mut json!({"vm_id": "7"}));

        let outcome = table.acknowledge(Function::VmStatusAck, &json!({"user_id": "7"}));
        assert!(matches!(
            outcome,
            AckMatch::DomainKey(ref r) if r.function == Function::UserUpdate
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unmatched_ack() {
        let mut table = PendingTable::new();
        table.issue(Function::VmCreate, &mut json!({"vm_id": "vm-1"}));

        assert_eq!(
            table.acknowledge(Function::VmDeleteAck, &json!({"vm_id": "vm-1"})),
            AckMatch::Unmatched
        );
        assert_eq!(
            table.acknowledge(Function::VmCreateAck, &json!({"vm_id": "vm-2"})),
            AckMatch::Unmatched
        );
        assert_eq!(
            table.acknowledge(Function::VmCreateAck, &json!({})),
            AckMatch::Unmatched
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_caller_supplied_token_is_kept() {
        let mut table = PendingTable::new();
        let mut field = json!({"vm_id": "vm-1", CORRELATION_KEY: "abc"});
        assert_eq!(table.issue(Function::VmDelete, &mut field), "abc");

        let mut dup = json!({"vm_id": "vm-2", CORRELATION_KEY: "abc"});
        assert_ne!(table.issue(Function::VmDelete, &mut dup), "abc");
    }

    #[test]
    fn test_generated_token_skips_caller_tokens() {
        let mut table = PendingTable::new();
        let next = format!("{:x}-{:06}", table.epoch, table.next_token);
        let mut field = json!({"vm_id": "vm-1", CORRELATION_KEY: next.clone()});
        table.issue(Function::VmStart, &mut field);

        let generated = table.issue(Function::VmStart, &mut json!({"vm_id": "vm-2"}));
        assert_ne!(generated, next);
        assert_eq!(table.len(), 2);
    }
}
