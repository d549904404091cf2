//! Sans-IO RTSP protocol implementation for the RAOP1 handshake.

pub mod digest;
pub mod headers;
pub mod request;
pub mod response;
pub mod session;

pub use digest::DigestAuth;
pub use headers::Headers;
pub use request::{RtspRequest, RtspRequestBuilder};
pub use response::{RtspResponse, StatusCode};
pub use session::{RtspSession, SessionState};

/// RTSP methods used by the RAOP1 handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Initiate session, check authentication.
    Options,
    /// Announce stream information (SDP).
    Announce,
    /// Set up transport and session.
    Setup,
    /// Start recording/streaming.
    Record,
    /// Set a runtime parameter (volume, progress).
    SetParameter,
    /// Flush buffered audio.
    Flush,
    /// Tear down the session.
    Teardown,
}

impl Method {
    /// Convert to the RTSP method token as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Record => "RECORD",
            Method::SetParameter => "SET_PARAMETER",
            Method::Flush => "FLUSH",
            Method::Teardown => "TEARDOWN",
        }
    }

    /// Parse a method token (case-insensitive).
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPTIONS" => Some(Method::Options),
            "ANNOUNCE" => Some(Method::Announce),
            "SETUP" => Some(Method::Setup),
            "RECORD" => Some(Method::Record),
            "SET_PARAMETER" => Some(Method::SetParameter),
            "FLUSH" => Some(Method::Flush),
            "TEARDOWN" => Some(Method::Teardown),
            _ => None,
        }
    }
}
