//! Network introspection helpers.
//!
//! Everything here answers "what does the network look like from inside
//! this container": own addresses, configured DNS servers, the default
//! gateway, and how a given name resolves. File parsers are split from the
//! file reads so they can be exercised on fixtures.

use std::{net::Ipv4Addr, path::Path};

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

// ---

/// Resolve a host name to its first IPv4 address using the OS resolver.
///
/// Resolution failures are not errors: they come back as `None` so callers
/// can report them inline.
pub async fn resolve_ipv4(host: &str) -> Option<Ipv4Addr> {
    // ---
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Some(ip);
    }

    match tokio::net::lookup_host((host, 0)).await {
        Ok(addrs) => addrs
            .filter_map(|addr| match addr.ip() {
                std::net::IpAddr::V4(v4) => Some(v4),
                std::net::IpAddr::V6(_) => None,
            })
            .next(),
        Err(e) => {
            debug!("Could not resolve '{}': {}", host, e);
            None
        }
    }
}

/// True only for a syntactically valid dotted-quad IPv4 address.
pub fn is_valid_ipv4(address: &str) -> bool {
    address.parse::<Ipv4Addr>().is_ok()
}

/// Private address of this instance, found by resolving its own host name.
pub async fn private_ip() -> Option<Ipv4Addr> {
    // ---
    let name = hostname::get().ok()?.into_string().ok()?;
    resolve_ipv4(&name).await
}

/// Ask an external lookup service which address our traffic egresses from.
///
/// The service must answer with a JSON object carrying an `ip` field.
pub async fn public_ip(client: &reqwest::Client, url: &str) -> Result<String> {
    // ---
    let answer: serde_json::Value = client.get(url).send().await?.json().await?;

    answer
        .get("ip")
        .and_then(|ip| ip.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow!("'ip' not found in answer from {}", url))
}

// ---

/// DNS servers configured in a resolver file such as `/etc/resolv.conf`.
///
/// A missing or unreadable file yields an empty list.
pub async fn dns_servers(path: &Path) -> Vec<String> {
    // ---
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse_nameservers(&contents),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Collect the IPv4 argument of every `nameserver` line, in file order.
pub fn parse_nameservers(contents: &str) -> Vec<String> {
    // ---
    contents
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            match (columns.next(), columns.next()) {
                (Some("nameserver"), Some(ip)) if is_valid_ipv4(ip) => Some(ip.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Default gateway taken from a kernel routing table such as `/proc/net/route`.
///
/// A missing or unreadable table yields `None`.
pub async fn default_gateway(path: &Path) -> Option<Ipv4Addr> {
    // ---
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse_default_gateway(&contents),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

const RTF_GATEWAY: u32 = 0x0002;

/// Find the first default route (destination `00000000`) with the gateway
/// flag set and decode its gateway column.
///
/// Columns are `Iface Destination Gateway Flags ...`; addresses are 32-bit
/// hex numbers in host (little-endian) byte order.
pub fn parse_default_gateway(contents: &str) -> Option<Ipv4Addr> {
    // ---
    contents.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[1] != "00000000" {
            return None;
        }

        let flags = u32::from_str_radix(fields[3], 16).ok()?;
        if flags & RTF_GATEWAY == 0 {
            return None;
        }

        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
}

// ---

/// Best effort operating system name from a `User-Agent` header.
pub fn platform_from_user_agent(user_agent: &str) -> Option<&'static str> {
    // ---
    const PLATFORMS: &[(&str, &str)] = &[
        ("cros", "chromeos"),
        ("iphone", "iphone"),
        ("ipad", "ipad"),
        ("android", "android"),
        ("mac os", "macos"),
        ("macintosh", "macos"),
        ("darwin", "macos"),
        ("windows", "windows"),
        ("freebsd", "freebsd"),
        ("openbsd", "openbsd"),
        ("netbsd", "netbsd"),
        ("linux", "linux"),
    ];

    let ua = user_agent.to_ascii_lowercase();
    PLATFORMS
        .iter()
        .find(|(token, _)| ua.contains(token))
        .map(|(_, name)| *name)
}

/// Best effort client name from a `User-Agent` header.
///
/// Order matters: Chromium based browsers also advertise `Safari`, and Edge
/// also advertises `Chrome`.
pub fn browser_from_user_agent(user_agent: &str) -> Option<&'static str> {
    // ---
    const BROWSERS: &[(&str, &str)] = &[
        ("googlebot", "google"),
        ("bingbot", "bing"),
        ("edg", "edge"),
        ("opr/", "opera"),
        ("opera", "opera"),
        ("chrome", "chrome"),
        ("crios", "chrome"),
        ("firefox", "firefox"),
        ("fxios", "firefox"),
        ("safari", "safari"),
        ("msie", "msie"),
        ("trident", "msie"),
        ("curl", "curl"),
        ("wget", "wget"),
        ("lynx", "lynx"),
    ];

    let ua = user_agent.to_ascii_lowercase();
    BROWSERS
        .iter()
        .find(|(token, _)| ua.contains(token))
        .map(|(_, name)| *name)
}
