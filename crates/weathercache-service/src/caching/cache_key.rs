use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// The identifier under which a report is stored in the shared store.
///
/// A key is derived from stable, human-readable metadata describing the logical request. That
/// metadata is SHA-256 hashed, so identical requests always map to the same key, and the
/// resulting store key has a fixed length regardless of the input.
#[derive(Debug, Clone, Eq)]
pub struct CacheKey {
    store_key: Arc<str>,
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store_key)
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl CacheKey {
    /// Prefix of every key written to the store.
    pub const PREFIX: &'static str = "report_";

    /// Creates the [`CacheKey`] for a weather query such as `Cologne,DE`.
    pub fn for_query(query: &str) -> Self {
        let mut builder = Self::builder();
        builder.write_query(query);
        builder.build()
    }

    /// Creates an empty [`CacheKeyBuilder`].
    pub fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder {
            metadata: String::new(),
        }
    }

    /// Returns the key as used in the store: `report_` followed by the hex-encoded hash.
    pub fn as_str(&self) -> &str {
        &self.store_key
    }

    /// Returns the human-readable metadata that forms the basis of the [`CacheKey`].
    pub fn metadata(&self) -> &str {
        &self.metadata
    }
}

/// A builder for [`CacheKey`]s.
///
/// This builder implements the [`Write`](std::fmt::Write) trait. Input written to it must be
/// **stable**, as any change to it changes the key and loses every cached entry.
pub struct CacheKeyBuilder {
    metadata: String,
}

impl CacheKeyBuilder {
    /// Writes the weather query into the [`CacheKey`].
    pub fn write_query(&mut self, query: &str) {
        self.metadata.push_str("query: ");
        self.metadata.push_str(query);
        self.metadata.push('\n');
    }

    /// Finalize the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        let hash: [u8; 32] = Sha256::digest(&self.metadata).into();

        let mut store_key = String::with_capacity(CacheKey::PREFIX.len() + 64);
        store_key.push_str(CacheKey::PREFIX);
        for b in &hash {
            // writing into a `String` never fails
            let _ = write!(store_key, "{b:02x}");
        }

        CacheKey {
            store_key: store_key.into(),
            metadata: self.metadata.into(),
            hash,
        }
    }
}

impl fmt::Write for CacheKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.metadata.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_keys() {
        let key = CacheKey::for_query("Cologne,DE");

        assert_eq!(key.metadata(), "query: Cologne,DE\n");
        assert_eq!(
            key.as_str(),
            "report_a70d72d888a507ca96b6c25f5991cc39ced08806d5efeefed863e5c32a3f87fb"
        );
        assert_eq!(key.to_string(), key.as_str());

        assert_eq!(key, CacheKey::for_query("Cologne,DE"));

        let other = CacheKey::for_query("Berlin,DE");
        assert_ne!(key, other);
        assert_eq!(
            other.as_str(),
            "report_165a19ed4def7ec5f4c6bb0aae7fea351956ac100d557a5554d9fee269983211"
        );
    }

    #[test]
    fn test_fixed_length() {
        let short = CacheKey::for_query("");
        let long = CacheKey::for_query(&"Llanfairpwllgwyngyll,GB".repeat(20));

        assert_eq!(short.as_str().len(), CacheKey::PREFIX.len() + 64);
        assert_eq!(long.as_str().len(), short.as_str().len());
    }

    #[test]
    fn test_builder_write() {
        let mut builder = CacheKey::builder();
        builder.write_query("Cologne,DE");
        let key = builder.build();

        let mut builder = CacheKey::builder();
        builder.write_str("query: Cologne,DE\n").unwrap();
        assert_eq!(builder.build(), key);
    }
}
