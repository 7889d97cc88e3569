//! Factory for opening ICMP probe sockets with automatic fallback

use super::{utils, AddressFamily, IpVersion, ProbeMode, SocketMode};
use crate::error::{Error, Result};
use crate::probe::ProbeOptions;
use socket2::{SockAddr, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A freshly opened and configured socket plus the mode it ended up in
#[derive(Debug)]
pub struct ProbeSocket {
    /// The socket itself; closed on drop
    pub socket: Socket,
    /// How the socket was opened
    pub mode: ProbeMode,
}

/// Try to create a socket with the specified configuration
fn try_create_socket(mode: ProbeMode) -> io::Result<Socket> {
    let socket_type = match mode.socket_mode {
        SocketMode::Raw => Type::RAW,
        SocketMode::Dgram => Type::DGRAM,
    };
    Socket::new(
        mode.ip_version.domain(),
        socket_type,
        Some(mode.ip_version.icmp_protocol()),
    )
}

/// Open an ICMP socket of family `F`, bind it and apply the probe options
///
/// Without a preferred mode a raw socket is tried first, then a datagram
/// socket. When every attempt fails for lack of privileges the error is
/// [`Error::InsufficientPermissions`].
pub fn open_probe_socket<F: AddressFamily>(options: &ProbeOptions) -> Result<ProbeSocket> {
    let socket_modes = match options.socket_mode {
        Some(mode) => vec![mode], // User specified a mode, only try that one
        None => vec![SocketMode::Raw, SocketMode::Dgram],
    };

    let mut last_error: Option<io::Error> = None;
    let mut all_denied = true;

    for socket_mode in socket_modes {
        let mode = ProbeMode {
            ip_version: F::VERSION,
            socket_mode,
        };

        match try_create_socket(mode) {
            Ok(socket) => {
                log::debug!("Using {} mode", mode.description());
                bind_local::<F>(&socket, mode, options.local_address)?;
                F::configure(&socket, options)
                    .map_err(|e| Error::ProbeFailed(format!("{e:#}")))?;
                return Ok(ProbeSocket { socket, mode });
            }
            Err(io_err) => {
                if utils::is_permission_error(&io_err) {
                    if utils::is_root() {
                        log::warn!("{} denied despite root privileges", mode.description());
                    } else if options.socket_mode.is_none() && socket_mode == SocketMode::Raw {
                        log::debug!(
                            "{} requires elevated privileges, trying fallback...",
                            mode.description()
                        );
                    }
                } else {
                    log::warn!("Failed to create {}: {}", mode.description(), io_err);
                    all_denied = false;
                }
                last_error = Some(io_err);
            }
        }
    }

    if all_denied {
        let (required, suggestion) = utils::permission_hint();
        return Err(Error::InsufficientPermissions {
            required: required.to_string(),
            suggestion: suggestion.to_string(),
        });
    }

    Err(Error::ProbeFailed(match last_error {
        Some(e) => format!("Failed to open ICMP socket: {e}"),
        None => "Failed to open ICMP socket".to_string(),
    }))
}

fn bind_local<F: AddressFamily>(
    socket: &Socket,
    mode: ProbeMode,
    local_address: Option<IpAddr>,
) -> Result<()> {
    let bind_ip: IpAddr = match local_address {
        Some(ip) => {
            let local = F::from_ip(ip).ok_or_else(|| {
                Error::invalid(format!(
                    "local address {ip} is not an {} address",
                    F::VERSION
                ))
            })?;
            local.into()
        }
        // Raw sockets don't need explicit binding
        None if mode.socket_mode == SocketMode::Raw => return Ok(()),
        None => match F::VERSION {
            IpVersion::V4 => Ipv4Addr::UNSPECIFIED.into(),
            IpVersion::V6 => Ipv6Addr::UNSPECIFIED.into(),
        },
    };

    let addr = SockAddr::from(SocketAddr::new(bind_ip, 0));
    socket.bind(&addr).map_err(|e| {
        Error::ProbeFailed(format!("Failed to bind ICMP socket to {bind_ip}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{Icmpv4, Icmpv6};

    #[test]
    fn test_mode_combinations() {
        for ip_version in [IpVersion::V4, IpVersion::V6] {
            for socket_mode in [SocketMode::Raw, SocketMode::Dgram] {
                // May fail due to permissions, but shouldn't panic
                let _ = try_create_socket(ProbeMode {
                    ip_version,
                    socket_mode,
                });
            }
        }
    }

    #[test]
    fn test_open_reports_permissions_or_succeeds() {
        match open_probe_socket::<Icmpv4>(&ProbeOptions::default()) {
            Ok(opened) => assert_eq!(opened.mode.ip_version, IpVersion::V4),
            Err(Error::InsufficientPermissions { required, .. }) => assert!(!required.is_empty()),
            // Sandboxes without ICMP support at all
            Err(Error::ProbeFailed(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_local_address_family_mismatch() {
        let options = ProbeOptions {
            local_address: Some("127.0.0.1".parse().unwrap()),
            ..ProbeOptions::default()
        };
        let result = open_probe_socket::<Icmpv6>(&options);
        assert!(matches!(
            result,
            Err(Error::InvalidParameter(_))
                | Err(Error::InsufficientPermissions { .. })
                | Err(Error::ProbeFailed(_))
        ));
    }
}
