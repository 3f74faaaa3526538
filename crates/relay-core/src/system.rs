use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Host identity reported in heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub hostname: String,
    pub ip: String,
    pub os: String,
}

impl HostInfo {
    /// Best-effort detection; unknown parts fall back to placeholders.
    pub fn detect() -> Self {
        Self {
            hostname: hostname(),
            ip: local_ip().to_string(),
            os: os_label().to_string(),
        }
    }
}

/// Agent version reported to the control server.
#[inline]
pub fn agent_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get platform (OS family).
#[inline]
pub fn platform() -> &'static str {
    std::env::consts::OS
}

/// OS label as understood by the control server and the runner release index.
pub fn os_label() -> &'static str {
    match (platform(), std::env::consts::ARCH) {
        ("macos", _) => "macOS (app)",
        ("windows", "x86") => "Windows 32",
        ("windows", _) => "Windows 64",
        _ => "Linux",
    }
}

pub fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Address of the interface that routes outbound traffic.
///
/// Connecting a UDP socket sends no packet; it only selects a route.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|s| {
            s.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
            s.local_addr()
        })
        .map(|a| a.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_fills_every_field() {
        let host = HostInfo::detect();
        assert!(!host.hostname.is_empty());
        assert!(host.ip.parse::<IpAddr>().is_ok());
        assert!(["Linux", "macOS (app)", "Windows 32", "Windows 64"].contains(&host.os.as_str()));
    }

    #[test]
    fn test_platform() {
        assert!(!platform().is_empty());
        assert!(!agent_version().is_empty());
    }
}
