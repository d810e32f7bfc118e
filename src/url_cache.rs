//! Job-scoped URL -> stored-path cache shared by the scalar-field and
//! content-body inlining paths.
//!
//! Normalization is the cache key contract: every producer
//! and consumer must derive the key the same way, or a URL that should be
//! free on its second encounter will fetch twice.

use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::{AsciiSet, CONTROLS};
use tokio::sync::Mutex;

/// `encodeURI` leaves a wider set of characters untouched than the default
/// `NON_ALPHANUMERIC` percent-encoding set; this mirrors JavaScript's
/// `encodeURI`, which does not touch `; , / ? : @ & = + $ - _ . ! ~ * ' ( ) #`.
const ENCODE_URI_RESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Normalize a raw URL into the cache key form: rewrite a leading `//` to
/// `http://`, then percent-encode it the way `encodeURI` would.
pub fn normalize(raw: &str) -> String {
    let rewritten = if let Some(stripped) = raw.strip_prefix("//") {
        format!("http://{}", stripped)
    } else {
        raw.to_string()
    };
    percent_encoding::utf8_percent_encode(&rewritten, ENCODE_URI_RESERVED).to_string()
}

/// Shared, job-scoped cache of normalized URL -> stored relative path.
///
/// Concurrent lookups for the same normalized URL are not single-flighted
/// here: under a single cooperative scheduler, the two paths that write
/// this cache (scalar fields, content bodies) never interleave on the same
/// URL within a single cooperative scheduler, because each content pass
/// deduplicates its own matches first. A multi-threaded host would need to
/// add single-flight locking keyed on the normalized URL; this type is
/// deliberately simple so that seam is easy to add later without touching
/// callers.
#[derive(Clone)]
pub struct UrlCache {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl UrlCache {
    pub fn new() -> Self {
        UrlCache { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub async fn get(&self, normalized_url: &str) -> Option<String> {
        self.inner.lock().await.get(normalized_url).cloned()
    }

    pub async fn insert(&self, normalized_url: String, stored_path: String) {
        self.inner.lock().await.insert(normalized_url, stored_path);
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl Default for UrlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_relative_url_normalizes_to_http() {
        assert_eq!(normalize("//cdn.example/x.jpg"), "http://cdn.example/x.jpg");
    }

    #[test]
    fn already_absolute_url_is_left_alone_besides_encoding() {
        assert_eq!(normalize("https://cdn.example/a.png"), "https://cdn.example/a.png");
    }

    #[test]
    fn spaces_are_percent_encoded() {
        assert_eq!(normalize("https://cdn.example/a b.png"), "https://cdn.example/a%20b.png");
    }

    #[tokio::test]
    async fn cache_idempotence_second_lookup_hits() {
        let cache = UrlCache::new();
        let key = normalize("https://cdn.example/a.png");
        assert!(cache.get(&key).await.is_none());
        cache.insert(key.clone(), "images/2024/a.png".to_string()).await;
        assert_eq!(cache.get(&key).await, Some("images/2024/a.png".to_string()));
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = UrlCache::new();
        cache.insert("k".to_string(), "v".to_string()).await;
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}
