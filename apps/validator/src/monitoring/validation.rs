//! Target validation run before any request leaves the validator.
//!
//! Targets come from the hub, which is trusted only as far as it is the
//! validator's operator's choice. Without an explicit opt-in, a validator
//! refuses to probe loopback, private and link-local hosts.

use anyhow::{Result, anyhow};
use std::net::IpAddr;
use url::{Host, Url};

/// Validate a target URL, returning the parsed form on success
pub fn validate_target(target: &str, allow_private: bool) -> Result<Url> {
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Unsupported scheme: {}", other)),
    }

    let host = url.host().ok_or_else(|| anyhow!("URL has no host"))?;

    if !allow_private && is_private_or_local(&host) {
        return Err(anyhow!("Private/local addresses are not checked: {}", host));
    }

    if url.port() == Some(0) {
        return Err(anyhow!("Port 0 is not valid"));
    }

    Ok(url)
}

/// Check if host is private or local
fn is_private_or_local(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(ip) => is_private_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_private_ip(IpAddr::V6(*ip)),
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost"
                || name.ends_with(".localhost")
                || name.ends_with(".local")
                || name.ends_with(".internal")
        }
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_documentation()
                || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(mapped));
            }
            // fc00::/7 unique local, fe80::/10 link local
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6.is_multicast()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}
