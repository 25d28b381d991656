use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::LinkError;

/// Where the board's byte stream can be reached.
///
/// Parsed from `unix:<path>`, `tcp:<host:port>`, or a bare device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddr {
    /// A Unix domain socket exposed by a bridge process.
    Unix(PathBuf),
    /// A TCP endpoint exposed by a network bridge.
    Tcp(String),
    /// A character device or FIFO opened read/write.
    Device(PathBuf),
}

impl FromStr for LinkAddr {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LinkError::InvalidAddress(s.to_string()));
        }

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(LinkError::InvalidAddress(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if let Some(endpoint) = s.strip_prefix("tcp:") {
            // host:port, the port must be numeric
            let valid = endpoint
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(LinkError::InvalidAddress(s.to_string()));
            }
            return Ok(Self::Tcp(endpoint.to_string()));
        }

        Ok(Self::Device(PathBuf::from(s)))
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkAddr::Unix(path) => write!(f, "unix:{}", path.display()),
            LinkAddr::Tcp(endpoint) => write!(f, "tcp:{endpoint}"),
            LinkAddr::Device(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_socket() {
        let addr: LinkAddr = "unix:/tmp/board.sock".parse().unwrap();
        assert_eq!(addr, LinkAddr::Unix(PathBuf::from("/tmp/board.sock")));
    }

    #[test]
    fn parses_tcp_endpoint() {
        let addr: LinkAddr = "tcp:127.0.0.1:7000".parse().unwrap();
        assert_eq!(addr, LinkAddr::Tcp("127.0.0.1:7000".to_string()));
    }

    #[test]
    fn bare_path_is_device() {
        let addr: LinkAddr = "/dev/ttyUSB0".parse().unwrap();
        assert_eq!(addr, LinkAddr::Device(PathBuf::from("/dev/ttyUSB0")));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!("".parse::<LinkAddr>().is_err());
        assert!("unix:".parse::<LinkAddr>().is_err());
        assert!("tcp:localhost".parse::<LinkAddr>().is_err());
        assert!("tcp::7000".parse::<LinkAddr>().is_err());
        assert!("tcp:host:notaport".parse::<LinkAddr>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for text in ["unix:/tmp/a.sock", "tcp:board:9000", "/dev/ttyACM0"] {
            let addr: LinkAddr = text.parse().unwrap();
            assert_eq!(addr.to_string(), text);
        }
    }
}
