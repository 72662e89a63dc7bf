//! ARP (Address Resolution Protocol) - RFC 826
//!
//! Only the sender binding is decoded; it feeds host learning.

use super::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP packet size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

/// Sender hardware/protocol address pair of an Ethernet/IPv4 ARP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpSender {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

impl ArpSender {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }

        let htype = u16::from_be_bytes([buffer[0], buffer[1]]);
        let ptype = u16::from_be_bytes([buffer[2], buffer[3]]);
        if htype != 1 || ptype != 0x0800 || buffer[4] != 6 || buffer[5] != 4 {
            return Err(Error::Parse("unsupported ARP address types".into()));
        }

        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buffer[8..14]);
        Ok(Self {
            mac: MacAddr(mac),
            ip: Ipv4Addr::new(buffer[14], buffer[15], buffer[16], buffer[17]),
        })
    }
}

/// Builds an ARP request from `sender` asking for `target`
pub fn build_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target: Ipv4Addr) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ARP_PACKET_SIZE);
    packet.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
    packet.extend_from_slice(&sender_mac.0);
    packet.extend_from_slice(&sender_ip.octets());
    packet.extend_from_slice(&MacAddr::ZERO.0);
    packet.extend_from_slice(&target.octets());
    packet
}
