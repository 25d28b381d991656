use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::error::{LinkError, Result};

/// Line rate requested from serial bridges. USB CDC and FIFO bridges ignore it.
pub const DEFAULT_BAUD_RATE: u32 = 921_600;

/// Stand-in for "no timeout"; the serial backend always needs one.
const UNBOUNDED: Duration = Duration::from_secs(24 * 60 * 60);

/// A terminal device (tty, USB serial bridge) driven through `serialport`.
///
/// The port has a single timeout; it is switched between the read and write
/// settings before each call. A read that times out fails with
/// `ErrorKind::TimedOut`.
pub(crate) struct SerialLink {
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialLink {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let port = serialport::new(path.to_string_lossy(), DEFAULT_BAUD_RATE)
            .timeout(UNBOUNDED)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| LinkError::Connect {
                target: path.display().to_string(),
                source: io::Error::from(e),
            })?;
        debug!(?path, baud = DEFAULT_BAUD_RATE, "opened serial link");
        Ok(Self {
            port,
            read_timeout: UNBOUNDED,
            write_timeout: UNBOUNDED,
        })
    }

    pub(crate) fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout.unwrap_or(UNBOUNDED);
    }

    pub(crate) fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout.unwrap_or(UNBOUNDED);
    }

    fn use_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        if self.port.timeout() != timeout {
            self.port.set_timeout(timeout).map_err(io::Error::from)?;
        }
        Ok(())
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.use_timeout(self.read_timeout)?;
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.use_timeout(self.write_timeout)?;
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.use_timeout(self.write_timeout)?;
        self.port.flush()
    }
}

/// A FIFO or plain file opened read/write.
///
/// Each read or write first polls the descriptor with the configured
/// timeout and fails with `ErrorKind::TimedOut` when it expires.
#[cfg(unix)]
pub(crate) struct PipeLink {
    file: std::fs::File,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

#[cfg(unix)]
impl PipeLink {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| LinkError::Connect {
                target: path.display().to_string(),
                source: e,
            })?;
        debug!(?path, "opened device link");
        Ok(Self {
            file,
            read_timeout: None,
            write_timeout: None,
        })
    }

    pub(crate) fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub(crate) fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    fn wait(&self, events: libc::c_short, timeout: Option<Duration>) -> io::Result<()> {
        use std::os::fd::AsRawFd;

        let Some(timeout) = timeout else {
            return Ok(());
        };
        let millis = libc::c_int::try_from(timeout.as_millis())
            .unwrap_or(libc::c_int::MAX)
            .max(1);
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid pollfd for one descriptor owned by `self.file`,
        // and it outlives the call.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        match rc {
            0 => Err(io::Error::from(io::ErrorKind::TimedOut)),
            n if n > 0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }
}

#[cfg(unix)]
impl Read for PipeLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wait(libc::POLLIN, self.read_timeout)?;
        self.file.read(buf)
    }
}

#[cfg(unix)]
impl Write for PipeLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.wait(libc::POLLOUT, self.write_timeout)?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// True when `path` is a terminal (tty or USB serial bridge).
///
/// Other character devices, FIFOs, and plain files are polled directly.
#[cfg(unix)]
pub(crate) fn is_terminal(path: &Path) -> Result<bool> {
    use std::io::IsTerminal;
    use std::os::unix::fs::OpenOptionsExt;

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
        .map_err(|e| LinkError::Connect {
            target: path.display().to_string(),
            source: e,
        })?;
    Ok(file.is_terminal())
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::Command;
    use std::time::Instant;

    use super::*;

    fn fifo(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("link.fifo");
        let status = Command::new("mkfifo").arg(&path).status().unwrap();
        assert!(status.success());
        path
    }

    #[test]
    fn idle_fifo_read_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = fifo(dir.path());
        assert!(!is_terminal(&path).unwrap());

        let mut link = PipeLink::open(&path).unwrap();
        link.set_read_timeout(Some(Duration::from_millis(5)));

        let start = Instant::now();
        let mut buf = [0u8; 16];
        let err = link.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn fifo_reads_back_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = fifo(dir.path());

        let mut link = PipeLink::open(&path).unwrap();
        link.set_read_timeout(Some(Duration::from_millis(50)));
        link.set_write_timeout(Some(Duration::from_millis(50)));
        link.write_all(&[0x0a, 0x00, 0x10]).unwrap();

        let mut buf = [0u8; 3];
        link.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x0a, 0x00, 0x10]);
    }

    #[test]
    fn null_device_is_not_a_terminal() {
        assert!(!is_terminal(Path::new("/dev/null")).unwrap());
    }
}
