//! SDP (Session Description Protocol) body for the RAOP ANNOUNCE request.

mod builder;

pub use builder::build_announce_sdp;
