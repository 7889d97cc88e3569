//! Reverse DNS lookup functionality

use std::net::IpAddr;

/// Error type for reverse DNS operations
#[derive(Debug, thiserror::Error)]
pub enum ReverseDnsError {
    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    ResolutionError(String),

    /// No PTR record found
    #[error("No PTR record found")]
    NotFound,
}

/// Perform a blocking reverse DNS lookup for an IP address
///
/// The system resolver answers with the numeric form when no PTR record
/// exists; that case is reported as [`ReverseDnsError::NotFound`].
pub fn reverse_dns_lookup(ip: IpAddr) -> Result<String, ReverseDnsError> {
    let name = dns_lookup::lookup_addr(&ip)
        .map_err(|e| ReverseDnsError::ResolutionError(e.to_string()))?;

    // Remove trailing dot if present
    let name = name.strip_suffix('.').unwrap_or(&name).to_string();

    if name.is_empty() || name.parse::<IpAddr>().is_ok() {
        return Err(ReverseDnsError::NotFound);
    }
    Ok(name)
}

/// Reverse name for display, `None` when the address has no usable name
pub fn display_name(ip: IpAddr) -> Option<String> {
    match reverse_dns_lookup(ip) {
        Ok(name) => Some(name),
        Err(e) => {
            log::debug!("No reverse name for {ip}: {e}");
            None
        }
    }
}
