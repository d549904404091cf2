//! Blocking transport layer for the control and audio connections.
//!
//! A connect-or-bind `open`, a `send` that treats a short write as
//! failure, a `recv` that treats a zero-byte read as an orderly remote
//! close rather than an error, and a `peek` used to decide whether
//! another response is already queued behind the one just read.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Transport kind. RAOP1 as implemented here only ever opens `Tcp`
/// connections (the control connection and, after SETUP, the audio
/// connection); `Udp` is retained so the type mirrors the protocol's full
/// transport vocabulary even though nothing in this crate constructs one —
/// the timing/control UDP channels belong to the encrypted AirPlay2
/// variant this crate does not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// TCP stream transport.
    Tcp,
    /// UDP datagram transport (unused by RAOP1; kept for completeness).
    Udp,
}

/// A single network connection, either outbound (client) or a listener
/// accepting one connection (server).
pub struct Transport {
    kind: TransportKind,
    stream: TcpStream,
    local: SocketAddr,
    remote: SocketAddr,
}

impl Transport {
    /// Resolve `host:port` and connect, trying each candidate address in
    /// order until one succeeds (or bind+accept, for `as_client = false`).
    ///
    /// # Errors
    /// Returns [`io::Error`] if no candidate address could be connected to
    /// or bound, or if `kind` is not [`TransportKind::Tcp`].
    ///
    /// # Panics
    /// Panics if `kind` is [`TransportKind::Udp`] — no caller in this crate
    /// constructs one (see the type's documentation).
    pub fn open(host: &str, port: u16, kind: TransportKind, as_client: bool) -> io::Result<Self> {
        assert_eq!(kind, TransportKind::Tcp, "only TCP is implemented");

        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("could not resolve {host}:{port}"),
            ));
        }

        let stream = if as_client {
            Self::connect_first(&addrs)?
        } else {
            Self::accept_first(&addrs)?
        };

        Self::from_stream(stream)
    }

    fn connect_first(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, Duration::from_secs(10)) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::other("no addresses to try")))
    }

    fn accept_first(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
        let listener = TcpListener::bind(addrs)?;
        let (stream, _) = listener.accept()?;
        Ok(stream)
    }

    /// Wrap an already-connected stream (used by tests against a loopback
    /// listener).
    ///
    /// # Errors
    /// Returns [`io::Error`] if the stream's local/peer address cannot be
    /// queried.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true).ok();
        let local = stream.local_addr()?;
        let remote = stream.peer_addr()?;
        Ok(Self {
            kind: TransportKind::Tcp,
            stream,
            local,
            remote,
        })
    }

    /// Send `bytes`. A short write (fewer bytes handed to the kernel than
    /// requested) is surfaced as an error, never as partial success.
    ///
    /// Sending an empty slice is a no-op that returns success.
    ///
    /// # Errors
    /// Returns [`io::Error`] on any write failure.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.stream.write_all(bytes)
    }

    /// Read into `buf`, returning the number of bytes read. `0` means the
    /// remote closed the connection in an orderly fashion; the caller must
    /// not treat that as an error.
    ///
    /// # Errors
    /// Returns [`io::Error`] on any read failure.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    /// Non-blocking "is at least one more byte queued?" probe, used after
    /// a full read buffer to decide whether to keep growing it.
    ///
    /// # Errors
    /// Returns [`io::Error`] if the peek itself fails (not if there is
    /// simply nothing queued yet).
    pub fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.peek(buf)
    }

    /// The local address of this connection.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// The remote address of this connection.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// The transport kind.
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Shut down the write half then release the descriptor.
    pub fn close(&mut self) {
        self.stream.shutdown(std::net::Shutdown::Write).ok();
    }
}
