use serde::{Deserialize, Serialize};

/// Namespace prepended to every session key served by this worker
pub const SESSION_NAMESPACE: &str = "anywork";

/// Stable identifier of one multi-turn conversation.
///
/// Wraps the caller's session id; the namespaced form is what the engines and
/// the registry see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    session_id: String,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    /// The caller-supplied id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// `anywork:<id>`
    pub fn namespaced(&self) -> String {
        format!("{}:{}", SESSION_NAMESPACE, self.session_id)
    }

    /// Deterministic log file name, safe to join onto a directory.
    ///
    /// Distinct ids always get distinct names.
    pub fn log_file_name(&self) -> String {
        format!("{}_{}.jsonl", SESSION_NAMESPACE, encode_file_stem(&self.session_id))
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.namespaced())
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9_-]`, plus a leading `.`.
///
/// The mapping is reversible, so no two ids share a file stem, and the result
/// never contains a separator or starts with a dot.
pub(crate) fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for (i, byte) in id.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') || (byte == b'.' && i > 0);
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Inverse of [`encode_file_stem`]; `None` for stems it cannot have produced
pub(crate) fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Replace anything that could escape a directory or confuse a file system
pub(crate) fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
