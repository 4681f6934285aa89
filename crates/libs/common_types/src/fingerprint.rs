use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content address of an asset's bytes, as reported by the photo service.
///
/// Two assets with equal fingerprints are byte-identical. Locally the
/// fingerprint doubles as the file name stem under `_All-Photos`, rendered
/// as unpadded URL-safe base64.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    #[must_use]
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Fingerprint of a complete asset body.
    #[must_use]
    pub fn of_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hasher.finalize().to_vec())
    }

    /// Decode the base64 form used by the service and by local file names.
    pub fn from_encoded(encoded: &str) -> Result<Self, base64::DecodeError> {
        URL_SAFE_NO_PAD.decode(encoded).map(Self)
    }

    /// The file name stem under `_All-Photos`.
    #[must_use]
    pub fn encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.encoded())
    }
}

/// Incremental fingerprint computation for streamed downloads.
#[derive(Default)]
pub struct FingerprintHasher {
    inner: Sha256,
}

impl FingerprintHasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    #[must_use]
    pub fn finalize(self) -> Fingerprint {
        Fingerprint(self.inner.finalize().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_round_trip() {
        let fingerprint = Fingerprint::of_content(b"holiday photo bytes");
        let encoded = fingerprint.encoded();
        let decoded = Fingerprint::from_encoded(&encoded).unwrap();
        assert_eq!(fingerprint, decoded);
        // URL-safe alphabet only, so the stem is always a valid file name.
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_streamed_hash_matches_one_shot() {
        let content = b"split into several chunks";
        let mut hasher = FingerprintHasher::new();
        hasher.update(&content[..5]);
        hasher.update(&content[5..12]);
        hasher.update(&content[12..]);
        assert_eq!(hasher.finalize(), Fingerprint::of_content(content));
    }

    #[test]
    fn test_rejects_invalid_encoding() {
        assert!(Fingerprint::from_encoded("not/valid==").is_err());
    }
}
