//! Byte transports
//!
//! The protocol engine only needs a blocking byte pipe with per-call read
//! timeouts. Serial ports are the normal case; TCP covers serial-over-network
//! bridges.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Poll interval while waiting for serial data
const POLL_INTERVAL_MS: u64 = 2;

/// Blocking byte transport used by [`Camera`](super::Camera)
pub trait Transport: Send {
    /// Write bytes, returning how many the transport accepted
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read until `buf` is full or `timeout` elapses.
    ///
    /// Returns the number of bytes read; `Ok(0)` means nothing arrived in
    /// time and is not an error.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Discard any bytes waiting in the input buffer
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Follow a line speed change negotiated with the device
    fn set_baud_rate(&mut self, _baud_rate: u32) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read(buf, timeout)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        (**self).set_baud_rate(baud_rate)
    }
}

/// Serial port wrapper implementing Transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Name of the underlying port, if the driver reports one
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < data.len() {
            match self.port.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    // Polls bytes_to_read() instead of relying on the driver's read timeout,
    // which is unreliable on some USB adapters.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let start = Instant::now();
        let mut offset = 0;

        while offset < buf.len() {
            let available = self
                .port
                .bytes_to_read()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
                as usize;

            if available == 0 {
                if start.elapsed() >= timeout {
                    break;
                }
                std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
                continue;
            }

            let to_read = std::cmp::min(available, buf.len() - offset);
            match self.port.read(&mut buf[offset..offset + to_read]) {
                Ok(0) => break,
                Ok(n) => offset += n,
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }

        Ok(offset)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        self.port
            .set_baud_rate(baud_rate)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// TCP stream wrapper implementing Transport
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connect to a serial-over-TCP bridge
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut offset = 0;

        while offset < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.stream.set_read_timeout(Some(remaining))?;

            match self.stream.read(&mut buf[offset..]) {
                Ok(0) => {
                    if offset == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::ConnectionAborted,
                            "connection closed by peer",
                        ));
                    }
                    break;
                }
                Ok(n) => offset += n,
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    break
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(offset)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        // No flush syscall for TCP input: drain with a non-blocking read.
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    let _ = self.stream.set_nonblocking(false);
                    return Err(e);
                }
            }
        }
        self.stream.set_nonblocking(false)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_read_times_out_with_zero() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            peer.write_all(&[0xAA, 0x0E, 0x0D]).unwrap();
            std::thread::sleep(Duration::from_millis(200));
        });

        let mut transport = TcpTransport::connect(&addr.to_string()).unwrap();
        let mut buf = [0u8; 6];
        let n = transport.read(&mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[0xAA, 0x0E, 0x0D]);

        let n = transport.read(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(n, 0);

        handle.join().unwrap();
    }

    #[test]
    fn test_tcp_write_reaches_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 6];
            peer.read_exact(&mut buf).unwrap();
            buf
        });

        let mut transport = TcpTransport::connect(&addr.to_string()).unwrap();
        let written = transport.write(&[0xAA, 0x0D, 0, 0, 0, 0]).unwrap();
        assert_eq!(written, 6);
        assert_eq!(handle.join().unwrap(), [0xAA, 0x0D, 0, 0, 0, 0]);
    }
}
