//! Packet-in events and the header fields the controller acts on

use crate::flow::DatapathId;
use crate::protocol::arp::ArpSender;
use crate::protocol::dhcp::{self, DhcpMessageType};
use crate::protocol::ethernet::Frame;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::tcp::TcpPorts;
use crate::protocol::udp::UdpHeader;
use crate::protocol::{ip_protocol, EtherType, MacAddr};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A packet a switch could not match and handed to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketIn {
    pub dpid: DatapathId,
    pub in_port: u16,
    /// The Ethernet frame as received
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpFields {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPorts {
    pub src: u16,
    pub dst: u16,
}

/// Decoded view of a packet-in frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeaders {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub ether_type: u16,
    pub ip: Option<IpFields>,
    /// TCP or UDP ports; absent for non-first fragments
    pub ports: Option<TransportPorts>,
    pub arp_sender: Option<ArpSender>,
    /// Set only for UDP on the 67/68 port pair with a readable option 53
    pub dhcp: Option<DhcpMessageType>,
}

impl PacketIn {
    pub fn new(dpid: DatapathId, in_port: u16, data: Vec<u8>) -> Self {
        Self {
            dpid,
            in_port,
            data,
        }
    }

    /// Decode the headers the classifier needs.
    ///
    /// Truncated Ethernet, IPv4, ARP, UDP or TCP headers are errors. A DHCP
    /// payload that does not decode only leaves `dhcp` unset.
    pub fn headers(&self) -> Result<PacketHeaders> {
        let frame = Frame::parse(&self.data)?;
        let mut headers = PacketHeaders {
            src_mac: frame.src_mac(),
            dst_mac: frame.dst_mac(),
            ether_type: frame.ethertype(),
            ip: None,
            ports: None,
            arp_sender: None,
            dhcp: None,
        };

        match EtherType::from_u16(headers.ether_type) {
            Some(EtherType::Ipv4) => {
                let ip = Ipv4Header::parse(frame.payload())?;
                headers.ip = Some(IpFields {
                    src: ip.src_addr(),
                    dst: ip.dst_addr(),
                    protocol: ip.protocol(),
                });
                if ip.is_first_fragment() {
                    decode_transport(&ip, &mut headers)?;
                }
            }
            Some(EtherType::Arp) => {
                headers.arp_sender = Some(ArpSender::parse(frame.payload())?);
            }
            _ => {}
        }

        Ok(headers)
    }
}

fn decode_transport(ip: &Ipv4Header<'_>, headers: &mut PacketHeaders) -> Result<()> {
    match ip.protocol() {
        ip_protocol::UDP => {
            let udp = UdpHeader::parse(ip.payload())?;
            headers.ports = Some(TransportPorts {
                src: udp.src_port(),
                dst: udp.dst_port(),
            });
            if dhcp::is_dhcp_port_pair(udp.src_port(), udp.dst_port()) {
                headers.dhcp = dhcp::message_type(udp.payload()).ok().flatten();
            }
        }
        ip_protocol::TCP => {
            let tcp = TcpPorts::parse(ip.payload())?;
            headers.ports = Some(TransportPorts {
                src: tcp.src_port,
                dst: tcp.dst_port,
            });
        }
        _ => {}
    }
    Ok(())
}

impl PacketHeaders {
    /// Topology discovery / keepalive frame
    pub fn is_lldp(&self) -> bool {
        self.ether_type == EtherType::Lldp as u16
    }

    /// Discover, offer, request or acknowledge of an address assignment
    pub fn is_address_assignment(&self) -> bool {
        self.dhcp.is_some_and(|t| t.is_assignment_exchange())
    }

    pub fn is_udp_over_ipv4(&self) -> bool {
        self.ip.is_some_and(|ip| ip.protocol == ip_protocol::UDP)
    }

    pub fn source_ip(&self) -> Option<Ipv4Addr> {
        self.ip.map(|ip| ip.src)
    }

    pub fn destination_ip(&self) -> Option<Ipv4Addr> {
        self.ip.map(|ip| ip.dst)
    }
}

/// Frame constructors for tests and tools
pub mod frames {
    use super::*;
    use crate::protocol::ethernet::FrameBuilder;
    use crate::protocol::ipv4::Ipv4Builder;
    use crate::protocol::{arp, tcp, udp};

    pub fn mac(last: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, last])
    }

    fn ipv4_frame(src_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr, proto: u8, l4: &[u8]) -> Vec<u8> {
        let ip = Ipv4Builder::new(src, dst, proto).payload(l4).build();
        FrameBuilder::new()
            .dst_mac(MacAddr::BROADCAST)
            .src_mac(src_mac)
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&ip)
            .build()
    }

    pub fn udp(src_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr, dst_port: u16) -> Vec<u8> {
        let datagram = udp::build_datagram(40000, dst_port, b"payload");
        ipv4_frame(src_mac, src, dst, ip_protocol::UDP, &datagram)
    }

    pub fn tcp(src_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr, dst_port: u16) -> Vec<u8> {
        let segment = tcp::build_segment(40000, dst_port);
        ipv4_frame(src_mac, src, dst, ip_protocol::TCP, &segment)
    }

    pub fn dhcp(src_mac: MacAddr, message_type: DhcpMessageType) -> Vec<u8> {
        let (src_port, dst_port) = match message_type {
            DhcpMessageType::Offer | DhcpMessageType::Ack | DhcpMessageType::Nak => {
                (dhcp::DHCP_SERVER_PORT, dhcp::DHCP_CLIENT_PORT)
            }
            _ => (dhcp::DHCP_CLIENT_PORT, dhcp::DHCP_SERVER_PORT),
        };
        let datagram = udp::build_datagram(src_port, dst_port, &dhcp::build_message(message_type));
        ipv4_frame(
            src_mac,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            ip_protocol::UDP,
            &datagram,
        )
    }

    pub fn arp_request(src_mac: MacAddr, sender: Ipv4Addr, target: Ipv4Addr) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(MacAddr::BROADCAST)
            .src_mac(src_mac)
            .ethertype(EtherType::Arp as u16)
            .payload(&arp::build_request(src_mac, sender, target))
            .build()
    }

    pub fn lldp(src_mac: MacAddr) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(MacAddr([0x01, 0x80, 0xc2, 0, 0, 0x0e]))
            .src_mac(src_mac)
            .ethertype(EtherType::Lldp as u16)
            .payload(&[0x02, 0x07, 0x04, 0, 0, 0, 0, 0, 1, 0, 0])
            .build()
    }
}
