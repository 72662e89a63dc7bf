//! Ethernet frame parsing and construction

use super::{EtherType, MacAddr};
use crate::{Error, Result};

/// Minimum Ethernet header size (without FCS)
pub const HEADER_SIZE: usize = 14;

/// Size of an 802.1Q tag
const VLAN_TAG_SIZE: usize = 4;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame, skipping a single 802.1Q tag if present
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }

        let outer = u16::from_be_bytes([buffer[12], buffer[13]]);
        let payload_offset = if outer == EtherType::Vlan as u16 {
            if buffer.len() < HEADER_SIZE + VLAN_TAG_SIZE {
                return Err(Error::Parse("VLAN frame too short".into()));
            }
            HEADER_SIZE + VLAN_TAG_SIZE
        } else {
            HEADER_SIZE
        };

        Ok(Self {
            buffer,
            payload_offset,
        })
    }

    pub fn dst_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[0..6]);
        MacAddr(mac)
    }

    pub fn src_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[6..12]);
        MacAddr(mac)
    }

    /// EtherType of the payload (inner type for tagged frames)
    pub fn ethertype(&self) -> u16 {
        let offset = self.payload_offset - 2;
        u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.payload_offset..]
    }
}

/// Builder for constructing Ethernet frames
#[derive(Debug, Default)]
pub struct FrameBuilder {
    dst: MacAddr,
    src: MacAddr,
    ethertype: u16,
    payload: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.dst = mac;
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.src = mac;
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&self.dst.0);
        frame.extend_from_slice(&self.src.0);
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_frame() -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]))
            .src_mac(MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]))
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&[0xde, 0xad, 0xbe, 0xef])
            .build()
    }

    #[test]
    fn test_parse_simple_frame() {
        let data = simple_frame();
        let frame = Frame::parse(&data).unwrap();

        assert_eq!(frame.dst_mac(), MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(frame.src_mac(), MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]));
        assert_eq!(frame.ethertype(), 0x0800);
        assert_eq!(frame.payload(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_parse_vlan_frame() {
        let mut data = vec![0xff; 12];
        data.extend_from_slice(&[0x81, 0x00, 0x00, 0x64, 0x08, 0x06, 0x01]);
        let frame = Frame::parse(&data).unwrap();

        assert_eq!(frame.ethertype(), EtherType::Arp as u16);
        assert_eq!(frame.payload(), &[0x01]);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(Frame::parse(&[0u8; 13]).is_err());

        let mut tagged = vec![0u8; 12];
        tagged.extend_from_slice(&[0x81, 0x00, 0x00]);
        assert!(Frame::parse(&tagged).is_err());
    }
}
