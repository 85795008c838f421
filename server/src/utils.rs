use std::net::{IpAddr, UdpSocket};

pub use shared::timestamp_ms;

// Discover the outward-facing IPv4 address without sending any packets
pub fn local_ipv4() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(IpAddr::V4(v4)),
        _ => None,
    }
}
