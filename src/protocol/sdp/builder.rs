use std::fmt::Write as _;

/// Build the SDP body sent as the ANNOUNCE request payload.
///
/// RAOP1 receivers expect a fixed session description naming the local and
/// remote control-connection addresses and the track's timescale; there is
/// no negotiation and no other media type, so this is a template fill
/// rather than a general-purpose SDP builder.
#[must_use]
pub fn build_announce_sdp(local_ip: &str, remote_ip: &str, timescale: u32) -> String {
    let mut out = String::with_capacity(192);
    writeln!(out, "v=0\r").unwrap();
    writeln!(out, "o=iTunes 1 O IN IP4 {local_ip}\r").unwrap();
    writeln!(out, "s=iTunes\r").unwrap();
    writeln!(out, "c=IN IP4 {remote_ip}\r").unwrap();
    writeln!(out, "t=0 0\r").unwrap();
    writeln!(out, "m=audio 0 RTP/AVP 96\r").unwrap();
    writeln!(out, "a=rtpmap:96 AppleLossless\r").unwrap();
    writeln!(
        out,
        "a=fmtp:96 4096 0 16 40 10 14 2 255 0 0 {timescale}\r"
    )
    .unwrap();
    out
}
