//! ICMPv6 echo codec and socket options

use super::{utils, AddressFamily, EchoMatch, IpVersion, ParsedReply, ReplyStatus};
use crate::probe::ProbeOptions;
use anyhow::{Context, Result};
use pnet::packet::icmpv6::echo_reply::EchoReplyPacket;
use pnet::packet::icmpv6::echo_request::{Icmpv6Codes, MutableEchoRequestPacket};
use pnet::packet::icmpv6::{Icmpv6Packet, Icmpv6Types};
use pnet::packet::Packet;
use socket2::Socket;
use std::net::{IpAddr, Ipv6Addr};

const ICMPV6_ERROR_HEADER_LEN_BYTES: usize = 8;
const IPV6_HEADER_LEN_BYTES: usize = 40;
const NEXT_HEADER_ICMPV6: u8 = 58;

/// IPv6 address family (ICMPv6)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Icmpv6;

impl Icmpv6 {
    /// Raw ICMPv6 sockets never include the IPv6 header, but a captured
    /// packet handed in by a caller may.
    fn strip_ip_header(packet: &[u8]) -> Option<(&[u8], Option<u8>)> {
        let first = *packet.first()?;
        if first >> 4 == 6
            && packet.len() >= IPV6_HEADER_LEN_BYTES
            && packet[6] == NEXT_HEADER_ICMPV6
        {
            return Some((&packet[IPV6_HEADER_LEN_BYTES..], Some(packet[7])));
        }
        Some((packet, None))
    }

    fn quoted_echo(icmp_data: &[u8]) -> Option<(u16, u16)> {
        let quoted = icmp_data.get(ICMPV6_ERROR_HEADER_LEN_BYTES..)?;
        if quoted.len() < IPV6_HEADER_LEN_BYTES || quoted[6] != NEXT_HEADER_ICMPV6 {
            return None;
        }

        let original = quoted.get(IPV6_HEADER_LEN_BYTES..IPV6_HEADER_LEN_BYTES + 8)?;
        if original[0] != Icmpv6Types::EchoRequest.0 {
            return None;
        }
        Some((
            u16::from_be_bytes([original[4], original[5]]),
            u16::from_be_bytes([original[6], original[7]]),
        ))
    }

    fn unreachable_status(code: u8) -> ReplyStatus {
        match code {
            0 => ReplyStatus::NetUnreachable,
            1 | 5 | 6 => ReplyStatus::AdministrativelyProhibited,
            3 => ReplyStatus::HostUnreachable,
            4 => ReplyStatus::PortUnreachable,
            _ => ReplyStatus::Other {
                icmp_type: Icmpv6Types::DestinationUnreachable.0,
                code,
            },
        }
    }
}

impl AddressFamily for Icmpv6 {
    type Addr = Ipv6Addr;

    const VERSION: IpVersion = IpVersion::V6;

    fn from_ip(ip: IpAddr) -> Option<Ipv6Addr> {
        match ip {
            IpAddr::V6(v6) => Some(v6),
            IpAddr::V4(_) => None,
        }
    }

    fn configure(socket: &Socket, options: &ProbeOptions) -> Result<()> {
        socket
            .set_unicast_hops_v6(options.ttl as u32)
            .context("Failed to set hop limit")?;
        if options.tos != 0 {
            log::debug!("Type of service {} ignored for IPv6", options.tos);
        }
        if options.dont_fragment {
            utils::set_dont_fragment(socket, IpVersion::V6)
                .context("Failed to set don't-fragment")?;
        }
        Ok(())
    }

    fn echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Option<Vec<u8>> {
        let mut icmp_buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + payload.len()];
        let mut echo_req_packet = MutableEchoRequestPacket::new(&mut icmp_buf)?;

        echo_req_packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
        echo_req_packet.set_icmpv6_code(Icmpv6Codes::NoCode);
        echo_req_packet.set_identifier(identifier);
        echo_req_packet.set_sequence_number(sequence);
        echo_req_packet.set_payload(payload);
        // Checksum covers the IPv6 pseudo-header; the kernel fills it in on send

        Some(icmp_buf)
    }

    fn parse_reply(packet: &[u8], expected: &EchoMatch) -> Option<ParsedReply> {
        let (icmp_data, reply_ttl) = Self::strip_ip_header(packet)?;
        let icmp_packet = Icmpv6Packet::new(icmp_data)?;
        let code = icmp_packet.get_icmpv6_code().0;

        let status = match icmp_packet.get_icmpv6_type() {
            Icmpv6Types::EchoReply => {
                let echo_reply_pkt = EchoReplyPacket::new(icmp_packet.packet())?;
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
            Icmpv6Types::TimeExceeded if code == 1 => ReplyStatus::ReassemblyTimeExpired,
            Icmpv6Types::TimeExceeded => ReplyStatus::TtlExpired,
            Icmpv6Types::DestinationUnreachable => Self::unreachable_status(code),
            Icmpv6Types::PacketTooBig => {
                let mtu = icmp_data
                    .get(4..8)
                    .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                    .unwrap_or(0);
                ReplyStatus::FragmentationNeeded {
                    mtu: (mtu != 0).then_some(mtu),
                }
            }
            Icmpv6Types::ParameterProblem => ReplyStatus::ParameterProblem,
            _ => return None,
        };

        let (original_id, original_seq) = Self::quoted_echo(icmp_data)?;
        expected
            .matches(original_id, original_seq)
            .then_some(ParsedReply { status, reply_ttl })
    }
}
