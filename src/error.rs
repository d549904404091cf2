//! Error types

/// Error kinds surfaced by the parser, the RAOP session engine, and the CLI.
///
/// Parse *warnings* are not represented here — they are absorbed into
/// [`crate::m4a::ParseStatus::ParsedWithWarnings`] and never fail the call
/// that produced them.
#[derive(Debug, thiserror::Error)]
pub enum LightPlayError {
    /// A transport send/recv or file open/read/seek failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The M4A file is malformed beyond what a warning can absorb.
    #[error("failed to parse M4A file: {0}")]
    Parse(String),

    /// The receiver returned a non-2xx RTSP status this crate does not
    /// otherwise recognize, or a required response field was missing.
    #[error("RTSP {method} failed: {status} {reason}")]
    Protocol {
        /// The RTSP method that was sent.
        method: &'static str,
        /// The numeric status line code.
        status: u16,
        /// The status line's reason phrase.
        reason: String,
    },

    /// A second `401 Unauthorized` was seen after the one permitted retry,
    /// or the challenge could not be parsed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A bad CLI argument.
    #[error("invalid argument: {0}")]
    Config(String),

    /// Resource allocation failure (surfaces the same as an I/O error).
    #[error("resource error: {0}")]
    Resource(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LightPlayError>;
