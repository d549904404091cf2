//! # light-play
//!
//! A small, dependency-light client for streaming a local M4A (ALAC/AAC)
//! file to a classic AirTunes/RAOP1 receiver — the unencrypted RTSP-derived
//! protocol spoken by the original AirPort Express and any software
//! receiver emulating it (`shairport`, `forked-daapd`, etc).
//!
//! ## Layout
//!
//! - [`m4a`] parses the MP4/M4A container: box tree, sample table, and
//!   iTunes metadata annotations.
//! - [`protocol::rtsp`] is the sans-IO RTSP request/response/session layer,
//!   including the digest auth retried once on a `401` challenge.
//! - [`protocol::sdp`] builds the `ANNOUNCE` body.
//! - [`protocol::raop`] drives the handshake end to end and owns the
//!   background audio-pump thread.
//! - [`net`] is the blocking `TcpStream` transport both of the above ride
//!   on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use light_play::m4a::M4AFile;
//! use light_play::protocol::raop::RaopSession;
//! use std::time::Duration;
//!
//! # fn example() -> light_play::error::Result<()> {
//! let m4a = M4AFile::open("track.m4a", None)?;
//! let (username, password) = RaopSession::default_credentials();
//! let mut session = RaopSession::connect("192.168.1.50", 5000, username, password)?;
//! session.play(&m4a, Duration::ZERO)?;
//! session.wait();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types shared across the parser, protocol, and CLI layers.
pub mod error;
/// M4A/MP4 box parser and sample cursor.
pub mod m4a;
/// Blocking transport layer for the control and audio connections.
pub mod net;
/// RTSP/RAOP1 protocol implementation and session orchestration.
pub mod protocol;

pub use error::{LightPlayError, Result};
