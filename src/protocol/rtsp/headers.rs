use std::collections::HashMap;

/// Well-known RTSP header names used by the RAOP1 handshake.
pub mod names {
    pub const CSEQ: &str = "CSeq";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const SESSION: &str = "Session";
    pub const TRANSPORT: &str = "Transport";
    pub const RANGE: &str = "Range";
    pub const RTP_INFO: &str = "RTP-Info";
    pub const USER_AGENT: &str = "User-Agent";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
    pub const AUTHORIZATION: &str = "Authorization";
}

/// RTSP header collection
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    /// Create empty headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header (case-insensitive key storage)
    ///
    /// If a header with the same name (case-insensitive) already exists, it is replaced.
    /// The new key casing is preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name_str = name.into();
        // Remove existing key if any (case-insensitive)
        self.inner.retain(|k, _| !k.eq_ignore_ascii_case(&name_str));
        self.inner.insert(name_str, value.into());
    }

    /// Get header value (case-insensitive)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        // RTSP headers are case-insensitive
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if header exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get `CSeq` value
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.get(names::CSEQ)?.parse().ok()
    }

    /// Get Content-Length value
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.parse().ok()
    }

    /// Get Content-Type value
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE)
    }

    /// Get Session ID
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.get(names::SESSION)
    }

    /// Look up a `;subkey=value` or bare `;subkey;` sub-field within a
    /// semicolon-separated header value (used for `Transport:
    /// server_port=...` and similar compound headers). Tolerant of extra
    /// whitespace around the separators.
    #[must_use]
    pub fn subfield(&self, name: &str, subkey: &str) -> Option<&str> {
        let value = self.get(name)?;
        value.split(';').find_map(|part| {
            let part = part.trim();
            if let Some(v) = part.strip_prefix(subkey) {
                if let Some(v) = v.strip_prefix('=') {
                    return Some(v.trim());
                }
                if v.is_empty() {
                    return Some("");
                }
            }
            None
        })
    }

    /// Iterate over all headers
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/sdp");
        assert_eq!(h.get("content-type"), Some("application/sdp"));
    }

    #[test]
    fn subfield_extracts_server_port() {
        let mut h = Headers::new();
        h.insert(
            "Transport",
            "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record;server_port=6000",
        );
        assert_eq!(h.subfield("Transport", "server_port"), Some("6000"));
        assert_eq!(h.subfield("Transport", "nonexistent"), None);
    }

    #[test]
    fn subfield_bare_flag() {
        let mut h = Headers::new();
        h.insert("Transport", "RTP/AVP/TCP;unicast;mode=record");
        assert_eq!(h.subfield("Transport", "unicast"), Some(""));
    }
}
