//! Local address lookup for the startup banner.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// LAN address other machines would use to reach this one.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface. Falls back to loopback when there is no route.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Address to print for a bind host: wildcard binds show the LAN address.
pub fn display_host(bind_host: &str) -> String {
    match bind_host {
        "0.0.0.0" | "::" | "[::]" => local_ip().to_string(),
        other => other.to_string(),
    }
}

/// `http://host:port/` for logs and the CLI.
pub fn dashboard_url(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("http://[{v6}]:{port}/"),
        _ => format!("http://{host}:{port}/"),
    }
}
