use sha2::{Digest, Sha256};
use std::time::Instant;
use crate::content::ContentQuery;

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry {
    pub body: serde_json::Value,
    pub created_at: Instant,
}

// Create a cache key (hash of query text + params)
pub fn make_cache_key(query: &ContentQuery) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.groq);
    for (name, value) in &query.params {
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
