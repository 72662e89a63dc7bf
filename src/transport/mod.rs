//! Switch transport boundary
//!
//! [`SwitchEvent`]s flow in from the switch agent and [`SwitchCommand`]s flow
//! out through [`BridgeGateway`], which is the production
//! [`FlowGateway`](crate::flow::FlowGateway).

mod bridge;
mod event;

pub use bridge::{BridgeGateway, SwitchBridge};
pub use event::{SwitchCommand, SwitchEvent};
