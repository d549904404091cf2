//! High-level RAOP1 orchestration: announce media, open the audio
//! channel, spawn the audio pump, and service volume/progress/stop from
//! the foreground while it runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{LightPlayError, Result};
use crate::m4a::M4AFile;
use crate::net::{Transport, TransportKind};
use crate::protocol::rtsp::{DigestAuth, Method, RtspSession, SessionState};
use crate::protocol::sdp::build_announce_sdp;

use super::audio_pump::AudioPump;

/// Shared clock state the pump writes once (at playback start) and the
/// foreground reads repeatedly (`get_progress`). A plain `Mutex` is
/// sufficient: it is written exactly once per session and read
/// infrequently, so there is no hot-path contention to avoid with an
/// atomic encoding.
pub(super) struct PlaybackClock {
    offset: Mutex<Option<Instant>>,
}

impl PlaybackClock {
    fn new() -> Self {
        Self {
            offset: Mutex::new(None),
        }
    }

    pub(super) fn set_offset(&self, at: Instant) {
        *self.offset.lock().unwrap() = Some(at);
    }

    /// `(now - playing_time_offset) + start_time`, saturating at zero.
    /// Returns `start_time` unmodified before the pump has recorded an
    /// offset.
    pub(super) fn progress(&self, start_time: Duration) -> Duration {
        match *self.offset.lock().unwrap() {
            Some(offset) => Instant::now().saturating_duration_since(offset) + start_time,
            None => start_time,
        }
    }
}

/// Orchestrates one RAOP1 playback session: the RTSP handshake over a
/// control [`Transport`], then a background [`AudioPump`] over a second,
/// independently opened audio `Transport`.
///
/// Owns the control transport and the [`RtspSession`] outright; the audio
/// transport and the M4A sample cursor are handed off to the pump thread
/// entirely (moved, not borrowed) once spawned, so nothing on this struct
/// contends with the pump for either resource.
pub struct RaopSession {
    host_name: String,
    control: Transport,
    rtsp: RtspSession,
    volume: f32,
    start_time: Duration,
    clock: Arc<PlaybackClock>,
    is_sending_audio: Arc<AtomicBool>,
    audio_worker: Option<JoinHandle<()>>,
}

impl RaopSession {
    /// Open the control connection to `host_name:port` and prepare an
    /// `RtspSession` authenticating as `username`/`password` if
    /// challenged. Use [`DigestAuth::DEFAULT_USERNAME`]/
    /// [`DigestAuth::DEFAULT_PASSWORD`] for the receiver-default
    /// credentials — the CLI's `-c` password is threaded through rather
    /// than hard-coded.
    ///
    /// # Errors
    /// Returns [`LightPlayError::Io`] if the control connection cannot be
    /// established.
    pub fn connect(host_name: &str, port: u16, username: &str, password: &str) -> Result<Self> {
        let control = Transport::open(host_name, port, TransportKind::Tcp, true)?;
        let rtsp = RtspSession::new(host_name, username, password);
        Ok(Self {
            host_name: host_name.to_string(),
            control,
            rtsp,
            volume: 30.0,
            start_time: Duration::ZERO,
            clock: Arc::new(PlaybackClock::new()),
            is_sending_audio: Arc::new(AtomicBool::new(false)),
            audio_worker: None,
        })
    }

    /// Run the ANNOUNCE/SETUP/RECORD handshake, then spawn the audio
    /// pump streaming `m4a` starting at `start_time`.
    ///
    /// # Errors
    /// Any handshake step's [`LightPlayError`], or an I/O failure opening
    /// the audio transport or spawning the worker thread.
    #[tracing::instrument(skip(self, m4a), fields(host = %self.host_name))]
    pub fn play(&mut self, m4a: &M4AFile, start_time: Duration) -> Result<()> {
        self.start_time = start_time;

        self.rtsp
            .send_command(&mut self.control, Method::Options, None)?;

        let local_ip = self.control.local_addr().ip().to_string();
        let remote_ip = self.control.remote_addr().ip().to_string();
        let sdp = build_announce_sdp(&local_ip, &remote_ip, m4a.timescale());
        self.rtsp.send_command(
            &mut self.control,
            Method::Announce,
            Some((sdp.as_bytes(), "application/sdp")),
        )?;

        self.rtsp
            .send_command(&mut self.control, Method::Setup, None)?;
        let audio_port = self.rtsp.audio_port().ok_or_else(|| {
            LightPlayError::Protocol {
                method: "SETUP",
                status: 0,
                reason: "no audio port learned from SETUP".to_string(),
            }
        })?;
        let audio = Transport::open(&self.host_name, audio_port, TransportKind::Tcp, true)?;

        self.rtsp
            .send_command(&mut self.control, Method::Record, None)?;

        self.set_volume(self.volume)?;

        let (seconds, nanos) = m4a.length();
        let media_length = Duration::new(seconds, nanos);
        let source = m4a.sample_source(start_time)?;

        self.is_sending_audio.store(true, Ordering::Release);
        let is_sending_audio = Arc::clone(&self.is_sending_audio);
        let clock = Arc::clone(&self.clock);

        let handle = thread::Builder::new()
            .name("audio-pump".to_string())
            .spawn(move || {
                AudioPump::run(source, audio, is_sending_audio, clock, start_time, media_length);
            })?;
        self.audio_worker = Some(handle);

        Ok(())
    }

    /// Whether the audio pump is still running.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.audio_worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Current playback progress: `(now - playing_time_offset) +
    /// start_time`, saturating at zero.
    #[must_use]
    pub fn get_progress(&self) -> Duration {
        self.clock.progress(self.start_time)
    }

    /// Clamp `volume` into `[0, 30]`, map it into the receiver's `[-30,
    /// 0]` range (or the `-144` muted sentinel below `0.01`), and — if
    /// already set up or streaming — send the `SET_PARAMETER` that
    /// applies it.
    ///
    /// # Errors
    /// Propagates any [`LightPlayError`] from the underlying
    /// `SET_PARAMETER` request.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        let clamped = volume.clamp(0.0, 30.0);
        self.volume = clamped;
        let internal = if clamped < 0.01 { -144.0 } else { clamped - 30.0 };

        if matches!(self.rtsp.state(), SessionState::SetUp | SessionState::Recording) {
            let body = format!("volume: {internal:.1}\r\n");
            self.rtsp.send_command(
                &mut self.control,
                Method::SetParameter,
                Some((body.as_bytes(), "text/parameters")),
            )?;
        }
        Ok(())
    }

    /// Set the cooperative-cancellation flag the pump observes at its
    /// next loop iteration, join the pump, then send `FLUSH` followed by
    /// `TEARDOWN`.
    ///
    /// Every subordinate step is attempted even if an earlier one failed;
    /// the first error encountered is returned after all steps have run.
    ///
    /// # Errors
    /// The first [`LightPlayError`] encountered among the `FLUSH` and
    /// `TEARDOWN` requests, if any.
    pub fn stop(&mut self) -> Result<()> {
        self.is_sending_audio.store(false, Ordering::Release);
        let mut first_err: Option<LightPlayError> = None;

        if let Some(handle) = self.audio_worker.take() {
            if handle.join().is_err() {
                tracing::error!("audio pump thread panicked");
            }
        }

        if matches!(self.rtsp.state(), SessionState::SetUp | SessionState::Recording) {
            if let Err(e) = self.rtsp.send_command(&mut self.control, Method::Flush, None) {
                tracing::error!(error = %e, "FLUSH failed during teardown");
                first_err.get_or_insert(e);
            }
        }

        if let Err(e) = self
            .rtsp
            .send_command(&mut self.control, Method::Teardown, None)
        {
            tracing::error!(error = %e, "TEARDOWN failed");
            first_err.get_or_insert(e);
        }

        self.control.close();

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Join the audio pump without sending `FLUSH`/`TEARDOWN` — used
    /// when the pump is expected to exit on its own (clean EOF) rather
    /// than in response to a user-initiated stop.
    pub fn wait(&mut self) {
        if let Some(handle) = self.audio_worker.take() {
            let _ = handle.join();
        }
    }

    /// Clone of the cooperative-cancellation flag, for a signal handler
    /// to flip without re-entering `RaopSession` itself — the handler
    /// only flips an atomic; the main thread drives the actual `stop()`.
    #[must_use]
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.is_sending_audio)
    }

    /// Default digest credentials, re-exported for callers (the CLI)
    /// that want the receiver-default password unless `-c` overrides it.
    #[must_use]
    pub fn default_credentials() -> (&'static str, &'static str) {
        (DigestAuth::DEFAULT_USERNAME, DigestAuth::DEFAULT_PASSWORD)
    }
}
