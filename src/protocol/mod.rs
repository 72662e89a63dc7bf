//! Frame decoders
//!
//! Zero-copy views over the headers the packet classifier inspects.
//! Builders exist for constructing test frames.

pub mod arp;
pub mod dhcp;
pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod types;
pub mod udp;

pub use types::*;
