//! TCP protocol - RFC 793
//!
//! Only the port pair is decoded; the controller never inspects TCP state.

use crate::{Error, Result};

/// Bytes needed to read both ports
const PORTS_SIZE: usize = 4;

/// Minimum TCP header size
pub const MIN_HEADER_SIZE: usize = 20;

/// Source and destination ports of a TCP segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpPorts {
    pub src_port: u16,
    pub dst_port: u16,
}

impl TcpPorts {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < PORTS_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        Ok(Self {
            src_port: u16::from_be_bytes([buffer[0], buffer[1]]),
            dst_port: u16::from_be_bytes([buffer[2], buffer[3]]),
        })
    }
}

/// Builds a bare TCP header (SYN, no options, zero checksum)
pub fn build_segment(src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut segment = vec![0u8; MIN_HEADER_SIZE];
    segment[0..2].copy_from_slice(&src_port.to_be_bytes());
    segment[2..4].copy_from_slice(&dst_port.to_be_bytes());
    segment[12] = 5 << 4;
    segment[13] = 0x02;
    segment
}
