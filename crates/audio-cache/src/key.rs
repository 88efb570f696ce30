use sha2::{Digest, Sha256};

/// Collapse whitespace runs and trim, so formatting noise maps to one key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 over normalized text and voice id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(text: &str, voice_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_text(text).as_bytes());
        // separator keeps ("ab", "c") and ("a", "bc") apart
        hasher.update([0u8]);
        hasher.update(voice_id.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{prefix}/{voice}/{digest}.{extension}`, with the voice id made path-safe.
    pub fn object_path(&self, prefix: &str, voice_id: &str, extension: &str) -> String {
        let voice: String = voice_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{voice}/{}.{extension}", self.0)
        } else {
            format!("{prefix}/{voice}/{}.{extension}", self.0)
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic_and_whitespace_insensitive() {
        let a = CacheKey::new("Breathe in.  Breathe out.", "calm");
        let b = CacheKey::new(" Breathe in.\nBreathe out. ", "calm");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn voice_changes_key() {
        assert_ne!(CacheKey::new("Hello.", "calm"), CacheKey::new("Hello.", "bright"));
        assert_ne!(CacheKey::new("ab", "c"), CacheKey::new("a", "bc"));
    }

    #[test]
    fn text_case_is_significant() {
        assert_ne!(CacheKey::new("Rest.", "calm"), CacheKey::new("rest.", "calm"));
    }

    #[test]
    fn object_path_is_path_safe() {
        let key = CacheKey::new("Hello.", "calm");
        let path = key.object_path("/tts/", "../en/calm voice", "mp3");
        assert_eq!(path, format!("tts/___en_calm_voice/{key}.mp3"));
        assert_eq!(key.object_path("", "v1", "mp3"), format!("v1/{key}.mp3"));
    }
}
