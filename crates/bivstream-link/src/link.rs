use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;

use crate::addr::LinkAddr;
#[cfg(unix)]
use crate::device::PipeLink;
use crate::device::SerialLink;
use crate::error::{LinkError, Result};

/// A connected duplex link implementing `Read` and `Write`.
///
/// Reads return whatever the board has sent so far, in chunks of arbitrary
/// size. Writes carry raw command bytes back to the board.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
    Serial(SerialLink),
    #[cfg(unix)]
    Device(PipeLink),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
            LinkStreamInner::Tcp(stream) => stream.read(buf),
            LinkStreamInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Device(pipe) => pipe.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
            LinkStreamInner::Tcp(stream) => stream.write(buf),
            LinkStreamInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Device(pipe) => pipe.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
            LinkStreamInner::Tcp(stream) => stream.flush(),
            LinkStreamInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            LinkStreamInner::Device(pipe) => pipe.flush(),
        }
    }
}

impl LinkStream {
    /// Create a LinkStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkStreamInner::Tcp(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// A read that outlasts it fails with `WouldBlock` or `TimedOut`
    /// depending on the link kind.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout)?,
            LinkStreamInner::Tcp(stream) => stream.set_read_timeout(timeout)?,
            LinkStreamInner::Serial(port) => port.set_read_timeout(timeout),
            #[cfg(unix)]
            LinkStreamInner::Device(pipe) => pipe.set_read_timeout(timeout),
        }
        Ok(())
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_write_timeout(timeout)?,
            LinkStreamInner::Tcp(stream) => stream.set_write_timeout(timeout)?,
            LinkStreamInner::Serial(port) => port.set_write_timeout(timeout),
            #[cfg(unix)]
            LinkStreamInner::Device(pipe) => pipe.set_write_timeout(timeout),
        }
        Ok(())
    }

    /// Link kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
            LinkStreamInner::Tcp(_) => "tcp",
            LinkStreamInner::Serial(_) => "serial",
            #[cfg(unix)]
            LinkStreamInner::Device(_) => "device",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.kind())
            .finish()
    }
}

/// Open a link to the given address (blocking connect).
pub fn open(addr: &LinkAddr) -> Result<LinkStream> {
    match addr {
        #[cfg(unix)]
        LinkAddr::Unix(path) => crate::uds::UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        LinkAddr::Unix(path) => Err(LinkError::Connect {
            target: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::Unsupported),
        }),
        LinkAddr::Tcp(endpoint) => {
            let stream = TcpStream::connect(endpoint).map_err(|e| LinkError::Connect {
                target: endpoint.clone(),
                source: e,
            })?;
            stream.set_nodelay(true)?;
            debug!(%endpoint, "connected to tcp link");
            Ok(LinkStream::from_tcp(stream))
        }
        #[cfg(unix)]
        LinkAddr::Device(path) if !crate::device::is_terminal(path)? => Ok(LinkStream {
            inner: LinkStreamInner::Device(PipeLink::open(path)?),
        }),
        LinkAddr::Device(path) => Ok(LinkStream {
            inner: LinkStreamInner::Serial(SerialLink::open(path)?),
        }),
    }
}
