//! Deterministic, content-addressed chunk identifiers.
//!
//! A chunk id is the first 16 lowercase hex digits of the SHA-256 of
//!
//! ```text
//! document_id | page_number | heading | chunk_type | content[..120 chars]
//! ```
//!
//! where every part is whitespace-collapsed and missing parts are empty.
//! Only a prefix of the content is hashed, so two chunks of the same
//! document, page, heading and type that share their first 120 characters
//! collide; the ingestion pipeline treats such collisions as duplicates.

use sha2::{Digest, Sha256};

use crate::models::ChunkType;

/// Number of content characters that contribute to the id.
pub const CONTENT_PREFIX_CHARS: usize = 120;

/// Length of every chunk id, in hex characters.
pub const CHUNK_ID_LEN: usize = 16;

pub fn make_chunk_id(
    document_id: &str,
    page_number: Option<u32>,
    heading: Option<&str>,
    chunk_type: ChunkType,
    content: &str,
) -> String {
    let page = page_number.map(|p| p.to_string()).unwrap_or_default();
    let prefix: String = content.chars().take(CONTENT_PREFIX_CHARS).collect();

    let key = [
        collapse(document_id),
        page,
        collapse(heading.unwrap_or("")),
        chunk_type.as_str().to_string(),
        collapse(&prefix),
    ]
    .join("|");

    short_hash(&key)
}

/// First [`CHUNK_ID_LEN`] hex digits of the SHA-256 of `key`.
pub fn short_hash(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(CHUNK_ID_LEN);
    hex
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
