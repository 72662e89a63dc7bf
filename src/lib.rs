//! Routing Switch - SDN controller
//!
//! Control plane for OpenFlow switches: a TCP command protocol for VM, user
//! and firewall management, a firewall-rule compiler that programs flow
//! entries, and a packet-in classifier that learns hosts and blocks UDP
//! floods.

pub mod classifier;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod firewall;
pub mod flow;
pub mod managers;
pub mod protocol;
pub mod telemetry;
pub mod topology;
pub mod transport;

pub use error::{Error, Result};
