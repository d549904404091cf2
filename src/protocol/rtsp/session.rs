//! RTSP conversation state: `CSeq` bookkeeping, session id, and the
//! digest auth retry loop.

use super::{DigestAuth, Method, RtspRequest, RtspResponse, headers::names};
use crate::error::{LightPlayError, Result};
use crate::net::Transport;

/// Allowed method sequence, `Idle -> OptionsOk -> Announced -> SetUp ->
/// Recording -> Flushed -> Terminated`, with `SetParameter` additionally
/// legal from `SetUp` and `Recording`. Enforced only as a debug assertion
/// at the call site — there is exactly one caller ([`RaopSession`](crate::protocol::raop::RaopSession))
/// and it always drives the handshake in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No method has been sent yet.
    Idle,
    /// `OPTIONS` succeeded.
    OptionsOk,
    /// `ANNOUNCE` succeeded.
    Announced,
    /// `SETUP` succeeded; `session_id` and the audio port are known.
    SetUp,
    /// `RECORD` succeeded; audio may be streamed.
    Recording,
    /// `FLUSH` succeeded.
    Flushed,
    /// `TEARDOWN` succeeded.
    Terminated,
}

/// Challenge/response bookkeeping for one RTSP conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No challenge has been seen.
    None,
    /// A `401` was answered once; waiting to see whether the retry is
    /// accepted.
    Required { realm: String, nonce: String },
    /// The retry succeeded; subsequent requests carry `Authorization`
    /// pre-emptively.
    Authenticated { realm: String, nonce: String },
}

/// Drives one RAOP1 RTSP conversation over a control [`Transport`].
///
/// `url` is fixed to `rtsp://<remote-ip>/1` — every RAOP1 receiver this
/// crate targets accepts only the literal session id `"1"` in the URL.
pub struct RtspSession {
    url: String,
    sequence_number: u32,
    session_id: Option<String>,
    audio_port: Option<u16>,
    auth_state: AuthState,
    username: String,
    password: String,
    state: SessionState,
}

impl RtspSession {
    /// Start a new conversation against `remote_ip`, authenticating as
    /// `username`/`password` if challenged — threaded through from the
    /// CLI's `-c` flag rather than hard-coded.
    #[must_use]
    pub fn new(remote_ip: &str, username: &str, password: &str) -> Self {
        Self {
            url: format!("rtsp://{remote_ip}/1"),
            sequence_number: 0,
            session_id: None,
            audio_port: None,
            auth_state: AuthState::None,
            username: username.to_string(),
            password: password.to_string(),
            state: SessionState::Idle,
        }
    }

    /// The conversation URL (`rtsp://<remote-ip>/1`).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Receiver-assigned session id, known after a successful `SETUP`.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Receiver's audio port, known after a successful `SETUP`.
    #[must_use]
    pub fn audio_port(&self) -> Option<u16> {
        self.audio_port
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn next_cseq(&mut self) -> u32 {
        self.sequence_number += 1;
        self.sequence_number
    }

    fn method_url(&self, method: Method) -> &str {
        // The client identifies with a literal `*`, not the session URL,
        // for the very first request.
        if matches!(method, Method::Options) {
            "*"
        } else {
            &self.url
        }
    }

    fn build_request(&mut self, method: Method, body: Option<(&[u8], &str)>) -> RtspRequest {
        let cseq = self.next_cseq();
        let url = self.method_url(method).to_string();
        let mut builder = RtspRequest::builder(method, url).cseq(cseq);

        builder = match method {
            Method::Options => builder,
            Method::Announce => builder,
            Method::Setup => builder.header(
                names::TRANSPORT,
                "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record",
            ),
            Method::Record => builder
                .session(self.session_id.as_deref().unwrap_or_default())
                .header(names::RANGE, "npt=0-")
                .header(names::RTP_INFO, "seq=0;rtptime=0"),
            Method::SetParameter => builder,
            Method::Flush => builder
                .session(self.session_id.as_deref().unwrap_or_default())
                .header(names::RTP_INFO, "seq=0;rtptime=0"),
            Method::Teardown => {
                builder.session(self.session_id.as_deref().unwrap_or_default())
            }
        };

        if let (Some((bytes, mime)), true) = (
            body,
            matches!(method, Method::Announce | Method::SetParameter),
        ) {
            builder = builder.content_type(mime).body(bytes.to_vec());
        }

        if let AuthState::Required { realm, nonce } | AuthState::Authenticated { realm, nonce } =
            &self.auth_state
        {
            let digest = DigestAuth::new(&self.username, &self.password, realm, nonce);
            let url = self.method_url(method).to_string();
            builder = builder.header(
                names::AUTHORIZATION,
                digest.authorization(method.as_str(), &url),
            );
        }

        builder.build()
    }

    /// Send `method` over `transport`, retrying exactly once with a fresh
    /// `CSeq` and an `Authorization` header if the first attempt is
    /// challenged with `401`.
    ///
    /// `body` supplies the `(bytes, mime)` pair for `ANNOUNCE` and
    /// `SET_PARAMETER`.
    ///
    /// # Errors
    /// - [`LightPlayError::Io`] on a transport failure.
    /// - [`LightPlayError::Auth`] if a second `401` follows the retry, or
    ///   the challenge could not be parsed.
    /// - [`LightPlayError::Protocol`] for any other non-2xx status,
    ///   including `354` ("low bandwidth", the receiver already playing).
    #[tracing::instrument(skip(self, transport, body), fields(method = method.as_str()))]
    pub fn send_command(
        &mut self,
        transport: &mut Transport,
        method: Method,
        body: Option<(&[u8], &str)>,
    ) -> Result<RtspResponse> {
        let response = self.send_once(transport, method, body)?;

        if response.is_success() {
            self.on_success(method, &response)?;
            return Ok(response);
        }

        if response.status.as_u16() == 401 && !matches!(self.auth_state, AuthState::Required { .. })
        {
            let (realm, nonce) = response.www_authenticate().ok_or_else(|| {
                LightPlayError::Auth("401 response carried no parsable challenge".to_string())
            })?;
            self.auth_state = AuthState::Required { realm, nonce };

            let retry = self.send_once(transport, method, body)?;
            if retry.is_success() {
                self.on_success(method, &retry)?;
                return Ok(retry);
            }
            if retry.status.as_u16() == 401 {
                return Err(LightPlayError::Auth(
                    "receiver rejected credentials after one retry".to_string(),
                ));
            }
            return Err(self.protocol_error(method, &retry));
        }

        if response.status.as_u16() == 354 {
            return Err(LightPlayError::Protocol {
                method: method.as_str(),
                status: 354,
                reason: "receiver reports low bandwidth / already playing".to_string(),
            });
        }

        Err(self.protocol_error(method, &response))
    }

    fn protocol_error(&self, method: Method, response: &RtspResponse) -> LightPlayError {
        LightPlayError::Protocol {
            method: method.as_str(),
            status: response.status.as_u16(),
            reason: response.reason.clone(),
        }
    }

    fn send_once(
        &mut self,
        transport: &mut Transport,
        method: Method,
        body: Option<(&[u8], &str)>,
    ) -> Result<RtspResponse> {
        let sent_cseq = self.sequence_number + 1;
        let request = self.build_request(method, body);
        transport.send(&request.encode())?;
        let response = RtspResponse::receive(transport)
            .map_err(|e| LightPlayError::Protocol {
                method: method.as_str(),
                status: 0,
                reason: e.to_string(),
            })?;

        if let Some(echoed) = response.cseq() {
            if echoed != sent_cseq {
                tracing::warn!(sent_cseq, echoed, "CSeq mismatch in response");
            }
        }
        Ok(response)
    }

    fn on_success(&mut self, method: Method, response: &RtspResponse) -> Result<()> {
        if let AuthState::Required { realm, nonce } = &self.auth_state {
            self.auth_state = AuthState::Authenticated {
                realm: realm.clone(),
                nonce: nonce.clone(),
            };
        }

        match method {
            Method::Options => self.state = SessionState::OptionsOk,
            Method::Announce => self.state = SessionState::Announced,
            Method::Setup => {
                self.session_id = response.session().map(str::to_string);
                self.audio_port = response.server_port();
                if self.session_id.is_none() || self.audio_port.is_none() {
                    return Err(LightPlayError::Protocol {
                        method: "SETUP",
                        status: response.status.as_u16(),
                        reason: "missing Session or Transport:server_port in response"
                            .to_string(),
                    });
                }
                self.state = SessionState::SetUp;
            }
            Method::Record => self.state = SessionState::Recording,
            Method::SetParameter => {}
            Method::Flush => self.state = SessionState::Flushed,
            Method::Teardown => self.state = SessionState::Terminated,
        }
        Ok(())
    }
}
