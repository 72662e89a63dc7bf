//! Flow table programming
//!
//! Types describing flow entries, the gateway boundary to the switch
//! transport, and the programmer that sits between the two.

mod gateway;
mod programmer;
mod types;

pub use gateway::{FlowGateway, GatewayCall, GatewayError, RecordingGateway};
pub use programmer::{
    Distribution, FlowProgrammer, ReconcileReport, RetryPolicy, DEFAULT_BACKOFF,
    DEFAULT_MAX_ATTEMPTS,
};
pub use types::{Action, DatapathId, FlowEntry, FlowMatch};
