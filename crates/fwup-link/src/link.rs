//! Device-side links
//!
//! These adapt std sockets and serial ports to the `embedded_io` traits
//! consumed by [`fwup_core::UploadDevice`]. A link carries exactly one
//! upload session at a time.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use serialport::SerialPort;

use crate::error::{LinkError, Result};

/// One accepted TCP connection
pub struct TcpLink {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpLink {
    /// Block until a host connects
    pub fn accept(listener: &TcpListener) -> Result<Self> {
        let (stream, peer) = listener
            .accept()
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;
        stream.set_nodelay(true)?;
        log::info!("host connected from {}", peer);
        Ok(Self { stream, peer })
    }

    /// Address of the connected host
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl embedded_io::ErrorType for TcpLink {
    type Error = LinkError;
}

impl embedded_io::ReadReady for TcpLink {
    fn read_ready(&mut self) -> Result<bool> {
        self.stream.set_nonblocking(true)?;
        let mut probe = [0u8; 1];
        let ready = match self.stream.peek(&mut probe) {
            // EOF counts as ready so the next read reports it
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => Ok(true),
            Err(e) => Err(LinkError::from(e)),
        };
        self.stream.set_nonblocking(false)?;
        ready
    }
}

impl embedded_io::Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => Ok(0),
            Err(e) => Err(LinkError::from(e)),
        }
    }
}

impl embedded_io::Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.stream.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }
}

/// Serial port link
///
/// A serial line has no end of stream and reads never return 0 bytes.
/// Run it with [`fwup_core::UploadDevice::set_reset_on_complete`] so each
/// completed upload returns the device to idle.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open a serial port as the device end of the link
    pub fn open(device: &str, baud: Option<u32>) -> Result<Self> {
        let baud_rate = baud.unwrap_or(crate::transport::serial::DEFAULT_BAUD);
        let port = serialport::new(device, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;
        log::info!("listening on {} at {} baud", device, baud_rate);
        Ok(Self { port })
    }
}

impl embedded_io::ErrorType for SerialLink {
    type Error = LinkError;
}

impl embedded_io::ReadReady for SerialLink {
    fn read_ready(&mut self) -> Result<bool> {
        Ok(self.port.bytes_to_read()? > 0)
    }
}

impl embedded_io::Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.port.read(buf)?)
    }
}

impl embedded_io::Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.port.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Read as _, ReadReady as _, Write as _};

    fn pair() -> (TcpStream, TcpLink) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let host = TcpStream::connect(addr).unwrap();
        let link = TcpLink::accept(&listener).unwrap();
        (host, link)
    }

    #[test]
    fn test_tcp_link_ready_and_read() {
        let (mut host, mut link) = pair();
        assert!(!link.read_ready().unwrap());

        std::io::Write::write_all(&mut host, b"FWUP").unwrap();
        // Wait for the bytes to land
        let mut tries = 0;
        while !link.read_ready().unwrap() {
            tries += 1;
            assert!(tries < 1000);
            std::thread::sleep(Duration::from_millis(1));
        }

        let mut buf = [0u8; 16];
        let mut got = 0;
        while got < 4 {
            got += link.read(&mut buf[got..]).unwrap();
        }
        assert_eq!(&buf[..4], b"FWUP");
    }

    #[test]
    fn test_tcp_link_reports_hang_up() {
        let (host, mut link) = pair();
        drop(host);

        let mut tries = 0;
        while !link.read_ready().unwrap() {
            tries += 1;
            assert!(tries < 1000);
            std::thread::sleep(Duration::from_millis(1));
        }
        let mut buf = [0u8; 16];
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_tcp_link_write_reaches_host() {
        let (mut host, mut link) = pair();
        link.write_all(b"OK").unwrap();
        link.flush().unwrap();

        let mut buf = [0u8; 2];
        std::io::Read::read_exact(&mut host, &mut buf).unwrap();
        assert_eq!(&buf, b"OK");
    }
}
