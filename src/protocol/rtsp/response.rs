use super::Headers;
use crate::net::Transport;
use std::io;

/// Errors raised while receiving or parsing a response off the wire.
#[derive(Debug, thiserror::Error)]
pub enum RtspResponseError {
    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The remote closed the connection before a full status line arrived.
    #[error("connection closed before a response was received")]
    ConnectionClosed,
    /// The status line could not be parsed.
    #[error("malformed status line: {0}")]
    MalformedStatusLine(String),
}

/// RTSP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const NOT_ACCEPTABLE: StatusCode = StatusCode(406);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Check if this is a success status (2xx)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Check if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// Get status code as u16
    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

/// An RTSP response message
#[derive(Debug, Clone)]
pub struct RtspResponse {
    /// RTSP version (usually "RTSP/1.0")
    pub version: String,
    /// Status code
    pub status: StatusCode,
    /// Reason phrase (e.g., "OK")
    pub reason: String,
    /// Response headers
    pub headers: Headers,
    /// Response body (may be empty)
    pub body: Vec<u8>,
}

impl RtspResponse {
    /// Check if response indicates success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get CSeq from response
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.headers.cseq()
    }

    /// Get session ID from response, stripped of any `;timeout=...` suffix.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.headers.session().map(|s| s.split(';').next().unwrap_or(s))
    }

    /// Get the `server_port=` sub-field of the `Transport` header (present
    /// on a successful SETUP response).
    #[must_use]
    pub fn server_port(&self) -> Option<u16> {
        self.headers
            .subfield(crate::protocol::rtsp::headers::names::TRANSPORT, "server_port")
            .and_then(|v| v.parse().ok())
    }

    /// Parse the `WWW-Authenticate` challenge, tolerant of unknown
    /// `key="value"` pairs and extra whitespace/comma separators.
    ///
    /// Returns `(realm, nonce)` if both were present.
    #[must_use]
    pub fn www_authenticate(&self) -> Option<(String, String)> {
        let value = self
            .headers
            .get(crate::protocol::rtsp::headers::names::WWW_AUTHENTICATE)?;
        let value = value.trim_start().strip_prefix("Digest").unwrap_or(value);
        let mut realm = None;
        let mut nonce = None;
        for part in value.split(',') {
            let part = part.trim();
            if let Some(v) = part.strip_prefix("realm=") {
                realm = Some(v.trim_matches('"').to_string());
            } else if let Some(v) = part.strip_prefix("nonce=") {
                nonce = Some(v.trim_matches('"').to_string());
            }
        }
        Some((realm?, nonce?))
    }

    /// Read one RTSP response from `transport`.
    ///
    /// Reads in growing chunks — 1 KiB at a time — until the header block
    /// terminator has been seen and, if `Content-Length` was present,
    /// until that many body bytes have arrived. After filling a chunk
    /// exactly, [`Transport::peek`] is consulted to decide whether more
    /// data is already queued before issuing another read.
    ///
    /// # Errors
    /// Returns [`RtspResponseError::ConnectionClosed`] if the remote closes
    /// before a full status line is received, or
    /// [`RtspResponseError::MalformedStatusLine`] if the first line is not
    /// `RTSP/<d>.<d> <code> <reason>`.
    pub fn receive(transport: &mut Transport) -> Result<Self, RtspResponseError> {
        const CHUNK: usize = 1024;
        let mut buf = Vec::with_capacity(CHUNK);
        let mut read_buf = [0u8; CHUNK];

        let header_end = loop {
            if let Some(pos) = find_header_end(&buf) {
                break pos;
            }
            let n = transport.recv(&mut read_buf)?;
            if n == 0 {
                return Err(RtspResponseError::ConnectionClosed);
            }
            buf.extend_from_slice(&read_buf[..n]);

            if n == CHUNK {
                let mut probe = [0u8; 1];
                let _ = transport.peek(&mut probe);
            }
        };

        let response = Self::parse_head(&buf[..header_end])?;
        let body_start = header_end + 4;
        let want = response.headers.content_length().unwrap_or(0);

        let mut body = buf[body_start..].to_vec();
        while body.len() < want {
            let n = transport.recv(&mut read_buf)?;
            if n == 0 {
                return Err(RtspResponseError::ConnectionClosed);
            }
            body.extend_from_slice(&read_buf[..n]);
        }
        body.truncate(want);

        Ok(Self { body, ..response })
    }

    fn parse_head(head: &[u8]) -> Result<Self, RtspResponseError> {
        let head = std::str::from_utf8(head)
            .map_err(|_| RtspResponseError::MalformedStatusLine("not UTF-8".to_string()))?;
        let mut lines = head.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| RtspResponseError::MalformedStatusLine(String::new()))?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts
            .next()
            .filter(|v| v.starts_with("RTSP/"))
            .ok_or_else(|| RtspResponseError::MalformedStatusLine(status_line.to_string()))?
            .to_string();
        let status: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RtspResponseError::MalformedStatusLine(status_line.to_string()))?;
        let reason = parts.next().unwrap_or("").to_string();

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim(), value.trim());
            }
        }

        Ok(Self {
            version,
            status: StatusCode(status),
            reason,
            headers,
            body: Vec::new(),
        })
    }
}

/// Find the index of the `\r\n\r\n` header/body separator, if present.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TransportKind;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn respond_with(raw: &'static [u8]) -> RtspResponse {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(raw).unwrap();
        });
        let mut client =
            Transport::open("127.0.0.1", addr.port(), TransportKind::Tcp, true).unwrap();
        let response = RtspResponse::receive(&mut client).unwrap();
        server.join().unwrap();
        response
    }

    #[test]
    fn parses_status_line_and_headers() {
        let response = respond_with(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nSession: DEADBEEF\r\n\r\n");
        assert!(response.is_success());
        assert_eq!(response.cseq(), Some(1));
        assert_eq!(response.session(), Some("DEADBEEF"));
    }

    #[test]
    fn strips_session_timeout_suffix() {
        let response = respond_with(b"RTSP/1.0 200 OK\r\nSession: DEADBEEF;timeout=60\r\n\r\n");
        assert_eq!(response.session(), Some("DEADBEEF"));
    }

    #[test]
    fn reads_declared_body() {
        let response = respond_with(
            b"RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 5\r\n\r\nhello",
        );
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn parses_www_authenticate_challenge() {
        let response = respond_with(
            b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\nWWW-Authenticate: Digest realm=\"AppleTV\", nonce=\"abcdef\"\r\n\r\n",
        );
        assert_eq!(
            response.www_authenticate(),
            Some(("AppleTV".to_string(), "abcdef".to_string()))
        );
    }

    #[test]
    fn parses_setup_server_port() {
        let response = respond_with(
            b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 1\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1;mode=record;server_port=6000\r\n\r\n",
        );
        assert_eq!(response.server_port(), Some(6000));
    }
}
