//! Control messages exchanged with the orchestrator
//!
//! One JSON object per connection:
//!
//! ```text
//! {"function": "FW_CONTROL_ADD", "field": {"user_id": "u1", "rule_no": "5", ...}}
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Every function the dispatcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    UserCreate,
    UserDelete,
    UserUpdate,
    VmCreate,
    VmModify,
    VmDelete,
    VmStart,
    VmStop,
    VmCreateAck,
    VmModifyAck,
    VmDeleteAck,
    VmStartAck,
    VmStopAck,
    VmStatusAck,
    HostUpdate,
    FwControlAdd,
    FwControlModify,
    FwControlDelete,
}

impl Function {
    pub const ALL: [Function; 18] = [
        Function::UserCreate,
        Function::UserDelete,
        Function::UserUpdate,
        Function::VmCreate,
        Function::VmModify,
        Function::VmDelete,
        Function::VmStart,
        Function::VmStop,
        Function::VmCreateAck,
        Function::VmModifyAck,
        Function::VmDeleteAck,
        Function::VmStartAck,
        Function::VmStopAck,
        Function::VmStatusAck,
        Function::HostUpdate,
        Function::FwControlAdd,
        Function::FwControlModify,
        Function::FwControlDelete,
    ];

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            Function::UserCreate => "USER_CREATE",
            Function::UserDelete => "USER_DELETE",
            Function::UserUpdate => "USER_UPDATE",
            Function::VmCreate => "VM_CREATE",
            Function::VmModify => "VM_MODIFY",
            Function::VmDelete => "VM_DELETE",
            Function::VmStart => "VM_START",
            Function::VmStop => "VM_STOP",
            Function::VmCreateAck => "VM_CREATE_ACK",
            Function::VmModifyAck => "VM_MODIFY_ACK",
            Function::VmDeleteAck => "VM_DELETE_ACK",
            Function::VmStartAck => "VM_START_ACK",
            Function::VmStopAck => "VM_STOP_ACK",
            Function::VmStatusAck => "VM_STATUS_ACK",
            Function::HostUpdate => "HOST_UPDATE",
            Function::FwControlAdd => "FW_CONTROL_ADD",
            Function::FwControlModify => "FW_CONTROL_MODIFY",
            Function::FwControlDelete => "FW_CONTROL_DELETE",
        }
    }

    /// The acknowledgement that completes this request, for requests that
    /// are answered asynchronously
    pub fn ack(self) -> Option<Function> {
        match self {
            Function::VmCreate => Some(Function::VmCreateAck),
            Function::VmModify => Some(Function::VmModifyAck),
            Function::VmDelete => Some(Function::VmDeleteAck),
            Function::VmStart => Some(Function::VmStartAck),
            Function::VmStop => Some(Function::VmStopAck),
            Function::UserUpdate => Some(Function::VmStatusAck),
            _ => None,
        }
    }

    pub fn is_ack(self) -> bool {
        Function::ALL.iter().any(|f| f.ack() == Some(self))
    }

    /// Field naming the object a tracked request or its ack is about
    pub fn domain_key(self) -> Option<&'static str> {
        match self {
            Function::VmCreate
            | Function::VmModify
            | Function::VmDelete
            | Function::VmStart
            | Function::VmStop
            | Function::VmCreateAck
            | Function::VmModifyAck
            | Function::VmDeleteAck
            | Function::VmStartAck
            | Function::VmStopAck => Some("vm_id"),
            Function::UserUpdate | Function::VmStatusAck => Some("user_id"),
            _ => None,
        }
    }
}

impl FromStr for Function {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Function::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| Error::UnknownFunction(s.to_string()))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed control message. `function` is kept as received so unknown
/// names can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub function: String,
    #[serde(default = "empty_field")]
    pub field: Value,
}

fn empty_field() -> Value {
    Value::Object(Map::new())
}

impl ControlMessage {
    pub fn new(function: Function, field: Value) -> Self {
        Self {
            function: function.name().to_string(),
            field,
        }
    }

    /// Parse a complete connection payload.
    ///
    /// Fails unless the payload is a JSON object with a string `function`
    /// and, if present, an object `field`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| Error::MalformedCommand(e.to_string()))?;
        if !value.is_object() {
            return Err(Error::MalformedCommand("payload is not an object".into()));
        }
        let mut message: ControlMessage = serde_json::from_value(value)
            .map_err(|e| Error::MalformedCommand(e.to_string()))?;
        match message.field {
            Value::Object(_) => {}
            Value::Null => message.field = empty_field(),
            _ => return Err(Error::MalformedCommand("field is not an object".into())),
        }
        Ok(message)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Optional per-connection status reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub request_success: bool,
    pub message: String,
}

impl StatusReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            request_success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            request_success: false,
            message: message.into(),
        }
    }
}

/// Read an identifying key from a payload. Numbers are rendered as text.
pub fn text_key(field: &Value, key: &str) -> Option<String> {
    match field.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Like [`text_key`], but a missing key is an error
pub fn require_key(field: &Value, key: &'static str) -> Result<String> {
    text_key(field, key).ok_or(Error::MissingField(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_names_roundtrip() {
        for f in Function::ALL {
            assert_eq!(f.name().parse::<Function>().unwrap(), f);
        }
        assert!(matches!(
            "VM_REBOOT".parse::<Function>(),
            Err(Error::UnknownFunction(name)) if name == "VM_REBOOT"
        ));
    }

    #[test]
    fn test_ack_pairs() {
        assert_eq!(Function::VmStart.ack(), Some(Function::VmStartAck));
        assert_eq!(Function::UserUpdate.ack(), Some(Function::VmStatusAck));
        assert_eq!(Function::FwControlAdd.ack(), None);
        assert!(Function::VmStatusAck.is_ack());
        assert_eq!(Function::ALL.iter().filter(|f| f.is_ack()).count(), 6);
    }

    #[test]
    fn test_parse_message() {
        let message =
            ControlMessage::parse(br#"{"function":"VM_START","field":{"vm_id":"vm-1"}}"#).unwrap();
        assert_eq!(message.function, "VM_START");
        assert_eq!(text_key(&message.field, "vm_id").as_deref(), Some("vm-1"));

        let message = ControlMessage::parse(br#"{"function":"USER_DELETE"}"#).unwrap();
        assert_eq!(message.field, json!({}));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let payloads: [&[u8]; 6] = [
            b"",
            b"not json",
            b"[1,2]",
            br#"{"field":{}}"#,
            br#"{"function":7}"#,
            br#"{"function":"VM_START","field":"vm-1"}"#,
        ];
        for payload in payloads {
            assert!(
                matches!(ControlMessage::parse(payload), Err(Error::MalformedCommand(_))),
                "accepted {:?}",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn test_keys() {
        let field = json!({"user_id": 12, "vm_id": "", "name": "x"});
        assert_eq!(text_key(&field, "user_id").as_deref(), Some("12"));
        assert_eq!(text_key(&field, "vm_id"), None);
        assert!(matches!(
            require_key(&field, "vm_id"),
            Err(Error::MissingField("vm_id"))
        ));
    }
}
