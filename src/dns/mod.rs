//! Name lookup: forward resolution for probe targets and reverse names for display

pub mod reverse;

pub use reverse::reverse_dns_lookup;

use crate::error::{Error, Result};
use crate::socket::{AddressFamily, IpVersion};
use dns_lookup::{getaddrinfo, AddrFamily, AddrInfoHints};
use std::io;
use std::net::IpAddr;

/// Resolve `host` (a literal address or a name) to one address of family `F`
///
/// Literals are accepted without touching the resolver. A literal of the
/// other family is an [`Error::AddressResolution`]; there is no fallback
/// between families.
///
/// # Examples
///
/// ```
/// use pingtrace::dns::resolve;
/// use pingtrace::socket::Icmpv4;
///
/// let addr = resolve::<Icmpv4>("192.0.2.10").unwrap();
/// assert_eq!(addr.to_string(), "192.0.2.10");
/// assert!(resolve::<Icmpv4>("2001:db8::1").is_err());
/// ```
pub fn resolve<F: AddressFamily>(host: &str) -> Result<F::Addr> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::resolution(host, "empty host name"));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return literal::<F>(host, ip);
    }
    // Bracketed IPv6 literal, as in URLs
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        if let Ok(ip) = inner.parse::<IpAddr>() {
            return literal::<F>(host, ip);
        }
    }

    let family = match F::VERSION {
        IpVersion::V4 => AddrFamily::Inet,
        IpVersion::V6 => AddrFamily::Inet6,
    };
    let hints = AddrInfoHints {
        address: family.into(),
        ..AddrInfoHints::default()
    };

    let addrs = getaddrinfo(Some(host), None, Some(hints))
        .map_err(|e| Error::resolution(host, io::Error::from(e).to_string()))?;

    for info in addrs {
        match info {
            Ok(info) => {
                if let Some(addr) = F::from_ip(info.sockaddr.ip()) {
                    log::debug!("Resolved {host} to {addr}");
                    return Ok(addr);
                }
            }
            Err(e) => log::trace!("Skipping unusable address record for {host}: {e}"),
        }
    }

    Err(Error::resolution(
        host,
        format!("no {} address found", F::VERSION),
    ))
}

fn literal<F: AddressFamily>(host: &str, ip: IpAddr) -> Result<F::Addr> {
    // A v4-mapped IPv6 literal is still an IPv6 literal for this purpose
    if IpVersion::of(ip) != F::VERSION {
        return Err(Error::resolution(
            host,
            format!("{ip} is not an {} address", F::VERSION),
        ));
    }
    F::from_ip(ip).ok_or_else(|| Error::resolution(host, "address family mismatch"))
}
