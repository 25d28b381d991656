//! Duplex byte link to the camera board.
//!
//! The board streams raw bytes with no alignment guarantees and accepts raw
//! command bytes in the other direction. This crate only moves bytes:
//! - Unix domain sockets (USB bridge daemons, the simulator)
//! - TCP (network-attached bridges)
//! - Terminals (USB serial bridges), opened through `serialport`
//! - Other device paths (FIFOs, raw character devices), polled with a timeout
//!
//! Everything else builds on top of the [`LinkStream`] type provided here.

pub mod addr;
mod device;
pub mod error;
pub mod link;

#[cfg(unix)]
pub mod uds;

pub use addr::LinkAddr;
pub use device::DEFAULT_BAUD_RATE;
pub use error::{LinkError, Result};
pub use link::{open, LinkStream};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
