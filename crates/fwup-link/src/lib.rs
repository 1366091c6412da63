//! fwup-link - Transports for fwup uploads
//!
//! The host side pushes an image through a [`Transport`] with the
//! [`Uploader`]. The device side wraps a TCP connection or serial port as
//! an `embedded_io` link for [`fwup_core::UploadDevice`].
//!
//! # Supported Transports
//!
//! - Serial port: `/dev/ttyUSB0`, `/dev/ttyACM0`, `COM1`, etc.
//! - TCP socket: `host:port`
//!
//! # Example
//!
//! ```no_run
//! use fwup_link::{NoProgress, TcpTransport, UploadOptions, Uploader};
//!
//! let image = std::fs::read("firmware.bin")?;
//! let transport = TcpTransport::connect("127.0.0.1:4040")?;
//! let mut uploader = Uploader::new(transport, UploadOptions::default())?;
//! let report = uploader.upload(&image, &mut NoProgress)?;
//! println!("acknowledged: {}", report.acknowledged);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod link;
pub mod transport;
pub mod uploader;

// Re-exports
pub use error::{LinkError, Result};
pub use link::{SerialLink, TcpLink};
pub use transport::serial::SerialTransport;
pub use transport::tcp::TcpTransport;
pub use transport::Transport;
pub use uploader::{NoProgress, UploadOptions, UploadProgress, UploadReport, Uploader};

/// Connection options for the host side
#[derive(Debug, Clone)]
pub enum Connection {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyACM0" or "COM1")
        device: String,
        /// Baud rate (None for the default)
        baud: Option<u32>,
    },
    /// TCP socket connection
    Tcp {
        /// `host:port` of the device
        addr: String,
    },
}

/// Open a host transport for the given connection
pub fn open(conn: &Connection) -> Result<Box<dyn Transport>> {
    match conn {
        Connection::Serial { device, baud } => {
            Ok(Box::new(SerialTransport::open(device, *baud)?))
        }
        Connection::Tcp { addr } => Ok(Box::new(TcpTransport::connect(addr)?)),
    }
}
