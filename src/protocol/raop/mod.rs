//! RAOP1 (classic AirTunes) session orchestration: the unencrypted,
//! TCP-only handshake this crate targets. The RSA/AES-encrypted AirPlay2
//! variant is out of scope.

mod audio_pump;
mod session;

pub use audio_pump::{AudioPump, PLAYING_TIME_LAG};
pub use session::RaopSession;
