//! Background producer: reads M4A samples and frames them in the RAOP1
//! interleaved wire format.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::m4a::SampleSource;
use crate::net::Transport;

use super::session::PlaybackClock;

/// 16-byte frame header prefix + opaque sample payload.
const FRAME_HEADER_LEN: usize = 16;

/// How long the pump sleeps between drain-wait polls once the file is
/// exhausted but the receiver may still be playing out its buffer.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runs on a dedicated `std::thread`, fully owning its `audio` transport
/// and `source` cursor (both moved in, nothing borrowed) so the worker
/// can be a plain `'static` thread rather than a scoped one — the
/// foreground never touches either again once the worker is spawned.
pub struct AudioPump;

impl AudioPump {
    /// Drive `source` to EOF (or until `is_sending_audio` is cleared),
    /// writing each sample as a 16-byte-header frame to `audio`.
    ///
    /// Before the loop starts, records `playing_time_offset = now + 2s`
    /// (`PLAYING_TIME_LAG`, aligning reported progress with the
    /// receiver's own output latency) into `clock`. After EOF, sleeps in
    /// 1-second steps while the receiver may still be draining its
    /// buffer.
    ///
    /// Any send failure is fatal for the session: it is logged and the
    /// worker exits; there is no retry and no out-of-band error channel
    /// back to the foreground.
    #[tracing::instrument(skip_all)]
    pub fn run(
        mut source: SampleSource,
        mut audio: Transport,
        is_sending_audio: Arc<AtomicBool>,
        clock: Arc<PlaybackClock>,
        start_time: Duration,
        media_length: Duration,
    ) {
        clock.set_offset(Instant::now() + PLAYING_TIME_LAG);

        let mut buf = vec![0u8; FRAME_HEADER_LEN + source.largest_sample_size() as usize];

        while is_sending_audio.load(Ordering::Acquire) && source.has_more_samples() {
            let sample_size = match source.next_sample(&mut buf[FRAME_HEADER_LEN..]) {
                Ok(size) => size,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read next sample; stopping pump");
                    return;
                }
            };

            write_frame_header(&mut buf, sample_size);

            if let Err(e) = audio.send(&buf[..FRAME_HEADER_LEN + sample_size]) {
                tracing::error!(error = %e, "audio send failed; stopping pump");
                return;
            }
        }

        while is_sending_audio.load(Ordering::Acquire) {
            let progress = clock.progress(start_time);
            if progress >= media_length {
                break;
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }

        tracing::debug!("audio pump exiting");
    }
}

/// Fudge factor aligning reported progress with the receiver's own
/// output latency.
pub const PLAYING_TIME_LAG: Duration = Duration::from_secs(2);

fn write_frame_header(buf: &mut [u8], sample_size: usize) {
    let header = &mut buf[..FRAME_HEADER_LEN];
    header.fill(0);
    header[0] = 0x24;
    header[1] = 0x00;
    let payload_len = (sample_size + 12) as u16;
    header[2..4].copy_from_slice(&payload_len.to_be_bytes());
    header[4] = 0xF0;
    header[5] = 0xFF;
}
