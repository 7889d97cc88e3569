//! ICMPv4 echo codec and socket options

use super::{utils, AddressFamily, EchoMatch, IpVersion, ParsedReply, ReplyStatus};
use crate::probe::ProbeOptions;
use anyhow::{Context, Result};
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::util::checksum as pnet_checksum;
use socket2::Socket;
use std::net::{IpAddr, Ipv4Addr};

/// ICMP error header length in bytes
const ICMP_ERROR_HEADER_LEN_BYTES: usize = 8;
/// IPv4 header minimum length in bytes
const IPV4_HEADER_MIN_LEN_BYTES: usize = 20;

/// IPv4 address family (ICMP over IPv4)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Icmpv4;

impl Icmpv4 {
    /// Skip the IPv4 header if the datagram carries one
    ///
    /// Raw sockets (and macOS datagram sockets) deliver the full IP packet,
    /// Linux datagram sockets deliver only the ICMP message.
    fn strip_ip_header(packet: &[u8]) -> Option<(&[u8], Option<u8>)> {
        let first = *packet.first()?;
        if first >> 4 != 4 {
            return Some((packet, None));
        }

        let ip = Ipv4Packet::new(packet)?;
        let header_len = ip.get_header_length() as usize * 4;
        if header_len < IPV4_HEADER_MIN_LEN_BYTES || packet.len() < header_len {
            return None;
        }
        Some((&packet[header_len..], Some(ip.get_ttl())))
    }

    /// Extract (identifier, sequence) of the echo request quoted in an ICMP error
    fn quoted_echo(icmp_data: &[u8]) -> Option<(u16, u16)> {
        let quoted = icmp_data.get(ICMP_ERROR_HEADER_LEN_BYTES..)?;
        let inner_ip = Ipv4Packet::new(quoted)?;
        let inner_header_len = inner_ip.get_header_length() as usize * 4;
        if inner_header_len < IPV4_HEADER_MIN_LEN_BYTES {
            return None;
        }

        let original_icmp = quoted.get(inner_header_len..inner_header_len + 8)?;
        if original_icmp[0] != IcmpTypes::EchoRequest.0 {
            return None;
        }

        let original_id = u16::from_be_bytes([original_icmp[4], original_icmp[5]]);
        let original_seq = u16::from_be_bytes([original_icmp[6], original_icmp[7]]);
        Some((original_id, original_seq))
    }

    fn unreachable_status(code: u8, icmp_data: &[u8]) -> ReplyStatus {
        match code {
            0 | 6 => ReplyStatus::NetUnreachable,
            1 | 7 => ReplyStatus::HostUnreachable,
            2 => ReplyStatus::ProtocolUnreachable,
            3 => ReplyStatus::PortUnreachable,
            4 => {
                // Next-hop MTU lives in the low half of the rest-of-header word
                let mtu = icmp_data
                    .get(6..8)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .unwrap_or(0);
                ReplyStatus::FragmentationNeeded {
                    mtu: (mtu != 0).then_some(mtu as u32),
                }
            }
            9 | 10 | 13 => ReplyStatus::AdministrativelyProhibited,
            _ => ReplyStatus::Other {
                icmp_type: IcmpTypes::DestinationUnreachable.0,
                code,
            },
        }
    }
}

impl AddressFamily for Icmpv4 {
    type Addr = Ipv4Addr;

    const VERSION: IpVersion = IpVersion::V4;

    fn from_ip(ip: IpAddr) -> Option<Ipv4Addr> {
        match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        }
    }

    fn configure(socket: &Socket, options: &ProbeOptions) -> Result<()> {
        socket
            .set_ttl_v4(options.ttl as u32)
            .context("Failed to set TTL")?;
        if options.tos != 0 {
            socket
                .set_tos_v4(options.tos as u32)
                .context("Failed to set type of service")?;
        }
        if options.dont_fragment {
            utils::set_dont_fragment(socket, IpVersion::V4)
                .context("Failed to set don't-fragment")?;
        }
        Ok(())
    }

    fn echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Option<Vec<u8>> {
        let mut icmp_buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + payload.len()];
        let mut echo_req_packet = MutableEchoRequestPacket::new(&mut icmp_buf)?;

        echo_req_packet.set_icmp_type(IcmpTypes::EchoRequest);
        echo_req_packet.set_icmp_code(IcmpCode(0));
        echo_req_packet.set_identifier(identifier);
        echo_req_packet.set_sequence_number(sequence);
        echo_req_packet.set_payload(payload);

        let checksum = pnet_checksum(echo_req_packet.packet(), 1);
        echo_req_packet.set_checksum(checksum);

        Some(icmp_buf)
    }

    fn parse_reply(packet: &[u8], expected: &EchoMatch) -> Option<ParsedReply> {
        let (icmp_data, reply_ttl) = Self::strip_ip_header(packet)?;
        let icmp_packet = IcmpPacket::new(icmp_data)?;
        let code = icmp_packet.get_icmp_code().0;

        let status = match icmp_packet.get_icmp_type() {
            IcmpTypes::EchoReply => {
                let echo_reply_pkt = EchoReplyPacket::new(icmp_data)?;
                if !expected.matches(
                    echo_reply_pkt.get_identifier(),
                    echo_reply_pkt.get_sequence_number(),
                ) {
                    return None;
                }
                return Some(ParsedReply {
                    status: ReplyStatus::Success,
                    reply_ttl,
                });
            }
            IcmpTypes::TimeExceeded if code == 1 => ReplyStatus::ReassemblyTimeExpired,
            IcmpTypes::TimeExceeded => ReplyStatus::TtlExpired,
            IcmpTypes::DestinationUnreachable => Self::unreachable_status(code, icmp_data),
            IcmpTypes::ParameterProblem => ReplyStatus::ParameterProblem,
            IcmpTypes::SourceQuench => ReplyStatus::SourceQuench,
            IcmpTypes::RedirectMessage => ReplyStatus::Other {
                icmp_type: IcmpTypes::RedirectMessage.0,
                code,
            },
            _ => return None,
        };

        let (original_id, original_seq) = Self::quoted_echo(icmp_data)?;
        expected
            .matches(original_id, original_seq)
            .then_some(ParsedReply { status, reply_ttl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: u16 = 0x4242;
    const SEQ: u16 = 17;

    fn expected() -> EchoMatch {
        EchoMatch {
            identifier: Some(ID),
            sequence: SEQ,
        }
    }

    fn ipv4_header(protocol_payload_len: usize, ttl: u8) -> Vec<u8> {
        let total = (IPV4_HEADER_MIN_LEN_BYTES + protocol_payload_len) as u16;
        let mut header = vec![0u8; IPV4_HEADER_MIN_LEN_BYTES];
        header[0] = 0x45;
        header[2..4].copy_from_slice(&total.to_be_bytes());
        header[8] = ttl;
        header[9] = 1; // ICMP
        header[12..16].copy_from_slice(&[10, 0, 0, 1]);
        header[16..20].copy_from_slice(&[192, 0, 2, 1]);
        header
    }

    /// ICMP error message quoting our original echo request
    fn icmp_error(icmp_type: u8, code: u8, rest: [u8; 4], id: u16, seq: u16) -> Vec<u8> {
        let request = Icmpv4::echo_request(id, seq, b"abcdefgh").unwrap();
        let mut icmp = vec![icmp_type, code, 0, 0];
        icmp.extend_from_slice(&rest);
        icmp.extend_from_slice(&ipv4_header(request.len(), 1));
        icmp.extend_from_slice(&request);
        icmp
    }

    #[test]
    fn test_echo_request_layout() {
        let packet = Icmpv4::echo_request(ID, SEQ, b"abcd").unwrap();
        assert_eq!(packet.len(), 12);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), ID);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), SEQ);
        assert_eq!(&packet[8..], b"abcd");
        // A correct checksum folds to zero over the whole message
        assert_eq!(pnet_checksum(&packet, 1), 0);
    }

    #[test]
    fn test_echo_reply_without_ip_header() {
        let mut reply = Icmpv4::echo_request(ID, SEQ, b"abcd").unwrap();
        reply[0] = 0;
        let parsed = Icmpv4::parse_reply(&reply, &expected()).unwrap();
        assert_eq!(parsed.status, ReplyStatus::Success);
        assert_eq!(parsed.reply_ttl, None);
    }

    #[test]
    fn test_echo_reply_with_ip_header() {
        let mut icmp = Icmpv4::echo_request(ID, SEQ, b"abcd").unwrap();
        icmp[0] = 0;
        let mut packet = ipv4_header(icmp.len(), 57);
        packet.extend_from_slice(&icmp);

        let parsed = Icmpv4::parse_reply(&packet, &expected()).unwrap();
        assert_eq!(parsed.status, ReplyStatus::Success);
        assert_eq!(parsed.reply_ttl, Some(57));
    }

    #[test]
    fn test_reply_for_other_probe_is_ignored() {
        let mut reply = Icmpv4::echo_request(ID, SEQ + 1, b"abcd").unwrap();
        reply[0] = 0;
        assert!(Icmpv4::parse_reply(&reply, &expected()).is_none());

        let mut reply = Icmpv4::echo_request(ID + 1, SEQ, b"abcd").unwrap();
        reply[0] = 0;
        assert!(Icmpv4::parse_reply(&reply, &expected()).is_none());
    }

    #[test]
    fn test_own_echo_request_is_ignored() {
        let request = Icmpv4::echo_request(ID, SEQ, b"abcd").unwrap();
        assert!(Icmpv4::parse_reply(&request, &expected()).is_none());
    }

    #[test]
    fn test_time_exceeded() {
        let packet = icmp_error(11, 0, [0; 4], ID, SEQ);
        let parsed = Icmpv4::parse_reply(&packet, &expected()).unwrap();
        assert_eq!(parsed.status, ReplyStatus::TtlExpired);

        let packet = icmp_error(11, 1, [0; 4], ID, SEQ);
        let parsed = Icmpv4::parse_reply(&packet, &expected()).unwrap();
        assert_eq!(parsed.status, ReplyStatus::ReassemblyTimeExpired);
    }

    #[test]
    fn test_time_exceeded_for_other_sequence() {
        let packet = icmp_error(11, 0, [0; 4], ID, SEQ + 3);
        assert!(Icmpv4::parse_reply(&packet, &expected()).is_none());
    }

    #[test]
    fn test_destination_unreachable_codes() {
        let cases = [
            (0, ReplyStatus::NetUnreachable),
            (1, ReplyStatus::HostUnreachable),
            (2, ReplyStatus::ProtocolUnreachable),
            (3, ReplyStatus::PortUnreachable),
            (13, ReplyStatus::AdministrativelyProhibited),
            (
                5,
                ReplyStatus::Other {
                    icmp_type: 3,
                    code: 5,
                },
            ),
        ];
        for (code, status) in cases {
            let packet = icmp_error(3, code, [0; 4], ID, SEQ);
            let parsed = Icmpv4::parse_reply(&packet, &expected()).unwrap();
            assert_eq!(parsed.status, status, "code {code}");
        }
    }

    #[test]
    fn test_fragmentation_needed_carries_mtu() {
        let packet = icmp_error(3, 4, [0, 0, 0x05, 0x78], ID, SEQ);
        let parsed = Icmpv4::parse_reply(&packet, &expected()).unwrap();
        assert_eq!(
            parsed.status,
            ReplyStatus::FragmentationNeeded { mtu: Some(1400) }
        );

        let packet = icmp_error(3, 4, [0; 4], ID, SEQ);
        let parsed = Icmpv4::parse_reply(&packet, &expected()).unwrap();
        assert_eq!(parsed.status, ReplyStatus::FragmentationNeeded { mtu: None });
    }

    #[test]
    fn test_kernel_owned_identifier() {
        let packet = icmp_error(11, 0, [0; 4], 0x9999, SEQ);
        let lenient = EchoMatch {
            identifier: None,
            sequence: SEQ,
        };
        assert!(Icmpv4::parse_reply(&packet, &lenient).is_some());
    }

    #[test]
    fn test_truncated_packets() {
        assert!(Icmpv4::parse_reply(&[], &expected()).is_none());
        assert!(Icmpv4::parse_reply(&[11, 0, 0], &expected()).is_none());
        let packet = icmp_error(11, 0, [0; 4], ID, SEQ);
        assert!(Icmpv4::parse_reply(&packet[..20], &expected()).is_none());
    }

    #[test]
    fn test_from_ip() {
        assert_eq!(
            Icmpv4::from_ip("192.0.2.7".parse().unwrap()),
            Some(Ipv4Addr::new(192, 0, 2, 7))
        );
        assert_eq!(
            Icmpv4::from_ip("::ffff:192.0.2.7".parse().unwrap()),
            Some(Ipv4Addr::new(192, 0, 2, 7))
        );
        assert_eq!(Icmpv4::from_ip("2001:db8::1".parse().unwrap()), None);
    }
}
