//! DHCP protocol - RFC 2131, 2132
//!
//! Only enough of the message is decoded to identify the exchange step
//! (option 53); leases are handed out by the address-assignment manager.

use crate::{Error, Result};

/// DHCP server port (bootps)
pub const DHCP_SERVER_PORT: u16 = 67;

/// DHCP client port (bootpc)
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Fixed BOOTP header size (before the magic cookie)
pub const DHCP_HEADER_SIZE: usize = 236;

/// Magic cookie marking start of options
pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const OPTIONS_OFFSET: usize = DHCP_HEADER_SIZE + MAGIC_COOKIE.len();

mod options {
    pub const PAD: u8 = 0;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const END: u8 = 255;
}

/// DHCP message types (Option 53)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DhcpMessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl DhcpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(DhcpMessageType::Discover),
            2 => Some(DhcpMessageType::Offer),
            3 => Some(DhcpMessageType::Request),
            4 => Some(DhcpMessageType::Decline),
            5 => Some(DhcpMessageType::Ack),
            6 => Some(DhcpMessageType::Nak),
            7 => Some(DhcpMessageType::Release),
            8 => Some(DhcpMessageType::Inform),
            _ => None,
        }
    }

    /// One of the four steps of address assignment (DORA)
    pub fn is_assignment_exchange(&self) -> bool {
        matches!(
            self,
            DhcpMessageType::Discover
                | DhcpMessageType::Offer
                | DhcpMessageType::Request
                | DhcpMessageType::Ack
        )
    }
}

/// True when the UDP port pair is client↔server
pub fn is_dhcp_port_pair(src_port: u16, dst_port: u16) -> bool {
    matches!(
        (src_port, dst_port),
        (DHCP_CLIENT_PORT, DHCP_SERVER_PORT) | (DHCP_SERVER_PORT, DHCP_CLIENT_PORT)
    )
}

/// Extract the message type from a DHCP payload
///
/// Returns `Ok(None)` when the options carry no message type (plain BOOTP).
pub fn message_type(buffer: &[u8]) -> Result<Option<DhcpMessageType>> {
    if buffer.len() < OPTIONS_OFFSET {
        return Err(Error::Parse("DHCP message too short".into()));
    }
    if buffer[DHCP_HEADER_SIZE..OPTIONS_OFFSET] != MAGIC_COOKIE {
        return Err(Error::Parse("invalid DHCP magic cookie".into()));
    }

    let mut pos = OPTIONS_OFFSET;
    while pos < buffer.len() {
        match buffer[pos] {
            options::PAD => pos += 1,
            options::END => break,
            code => {
                let len = *buffer
                    .get(pos + 1)
                    .ok_or_else(|| Error::Parse("DHCP option truncated".into()))?
                    as usize;
                let value = buffer
                    .get(pos + 2..pos + 2 + len)
                    .ok_or_else(|| Error::Parse("DHCP option truncated".into()))?;
                if code == options::MESSAGE_TYPE {
                    return Ok(value.first().copied().and_then(DhcpMessageType::from_u8));
                }
                pos += 2 + len;
            }
        }
    }

    Ok(None)
}

/// Builds a minimal DHCP message carrying only option 53
pub fn build_message(message_type: DhcpMessageType) -> Vec<u8> {
    let mut msg = vec![0u8; DHCP_HEADER_SIZE];
    msg[0] = match message_type {
        DhcpMessageType::Offer | DhcpMessageType::Ack | DhcpMessageType::Nak => 2,
        _ => 1,
    };
    msg[1] = 1;
    msg[2] = 6;
    msg.extend_from_slice(&MAGIC_COOKIE);
    msg.extend_from_slice(&[options::MESSAGE_TYPE, 1, message_type as u8, options::END]);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for t in [
            DhcpMessageType::Discover,
            DhcpMessageType::Offer,
            DhcpMessageType::Request,
            DhcpMessageType::Ack,
            DhcpMessageType::Release,
        ] {
            assert_eq!(message_type(&build_message(t)).unwrap(), Some(t));
        }
    }

    #[test]
    fn test_message_type_skips_other_options() {
        let mut msg = build_message(DhcpMessageType::Request);
        // insert PAD + hostname option before option 53
        let opts = msg.split_off(OPTIONS_OFFSET);
        msg.extend_from_slice(&[0, 12, 3, b'v', b'm', b'1']);
        msg.extend_from_slice(&opts);
        assert_eq!(
            message_type(&msg).unwrap(),
            Some(DhcpMessageType::Request)
        );
    }

    #[test]
    fn test_message_type_errors() {
        assert!(message_type(&[0u8; 100]).is_err());

        let mut bad_cookie = build_message(DhcpMessageType::Discover);
        bad_cookie[DHCP_HEADER_SIZE] = 0;
        assert!(message_type(&bad_cookie).is_err());

        let mut truncated = build_message(DhcpMessageType::Discover);
        truncated.truncate(OPTIONS_OFFSET + 1);
        assert!(message_type(&truncated).is_err());
    }

    #[test]
    fn test_bootp_without_type() {
        let mut msg = vec![0u8; DHCP_HEADER_SIZE];
        msg.extend_from_slice(&MAGIC_COOKIE);
        msg.push(options::END);
        assert_eq!(message_type(&msg).unwrap(), None);
    }

    #[test]
    fn test_assignment_exchange() {
        assert!(DhcpMessageType::Discover.is_assignment_exchange());
        assert!(DhcpMessageType::Ack.is_assignment_exchange());
        assert!(!DhcpMessageType::Release.is_assignment_exchange());
        assert!(!DhcpMessageType::Nak.is_assignment_exchange());
    }

    #[test]
    fn test_port_pair() {
        assert!(is_dhcp_port_pair(68, 67));
        assert!(is_dhcp_port_pair(67, 68));
        assert!(!is_dhcp_port_pair(67, 67));
        assert!(!is_dhcp_port_pair(53, 68));
    }
}
