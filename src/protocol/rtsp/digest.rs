//! HTTP Digest authentication (RFC 2617, unqualified) for RAOP1's
//! re-authentication handshake.
//!
//! The receiver offers no `qop`, so this never builds the qop-aware
//! `HA1:nonce:nc:cnonce:qop:HA2` variant, only the classic
//! `HA1:nonce:HA2`.

use md5::{Digest, Md5};

/// Holds the credentials and challenge needed to build `Authorization`
/// header values for subsequent requests on the same realm/nonce.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    username: String,
    password: String,
    realm: String,
    nonce: String,
}

impl DigestAuth {
    /// Default username hardcoded by every RAOP1 receiver this crate talks
    /// to; there is no discovery mechanism for a "real" one.
    pub const DEFAULT_USERNAME: &'static str = "iTunes";
    /// Default password, overridable with the CLI's `-c` flag.
    pub const DEFAULT_PASSWORD: &'static str = "geheim";

    /// Build a `DigestAuth` from a `WWW-Authenticate` challenge's
    /// `(realm, nonce)` pair, as returned by
    /// [`super::response::RtspResponse::www_authenticate`].
    #[must_use]
    pub fn new(username: &str, password: &str, realm: &str, nonce: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            realm: realm.to_string(),
            nonce: nonce.to_string(),
        }
    }

    /// Compute the `Authorization` header value for `method` against `uri`.
    #[must_use]
    pub fn authorization(&self, method: &str, uri: &str) -> String {
        let ha1 = Self::md5_hex(format!(
            "{}:{}:{}",
            self.username, self.realm, self.password
        ));
        let ha2 = Self::md5_hex(format!("{method}:{uri}"));
        let response = Self::md5_hex(format!("{ha1}:{}:{ha2}", self.nonce));

        format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            self.username, self.realm, self.nonce, uri, response
        )
    }

    /// Hex-encodes in upper case, matching the target receivers' own
    /// digest implementation, which departs from RFC 2617's conventional
    /// lower-case encoding.
    fn md5_hex(input: String) -> String {
        let mut hasher = Md5::new();
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02X}")).collect()
    }
}
