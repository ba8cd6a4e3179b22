//! A single cache entry: the bounded queue of pre-generated variants for
//! one request fingerprint, plus the bookkeeping `acquire`/`refill` need.

use std::collections::VecDeque;
use std::time::Instant;

use mockllm_core::ApiError;

/// A queued variant, compressed on insert if it's large enough to be
/// worth it (spec.md §4.7 "Compression").
pub enum StoredVariant {
    Plain(String),
    Zstd(Vec<u8>),
}

impl StoredVariant {
    pub fn encode(text: String, enabled: bool, threshold_bytes: usize) -> Self {
        if enabled && text.len() >= threshold_bytes {
            match zstd::encode_all(text.as_bytes(), 0) {
                Ok(bytes) => StoredVariant::Zstd(bytes),
                Err(_) => StoredVariant::Plain(text),
            }
        } else {
            StoredVariant::Plain(text)
        }
    }

    pub fn decode(self) -> Result<String, ApiError> {
        match self {
            StoredVariant::Plain(text) => Ok(text),
            StoredVariant::Zstd(bytes) => zstd::decode_all(bytes.as_slice())
                .map_err(|e| ApiError::InternalError(format!("cache decompression failed: {e}")))
                .and_then(|raw| {
                    String::from_utf8(raw)
                        .map_err(|e| ApiError::InternalError(format!("cache decompression produced invalid utf8: {e}")))
                }),
        }
    }
}

pub struct CacheEntry {
    pub queue: VecDeque<StoredVariant>,
    pub capacity: u32,
    pub is_primed: bool,
    pub refill_in_flight: bool,
    pub created_at: Instant,
    pub last_accessed: Instant,
}

impl CacheEntry {
    pub fn new(capacity: u32) -> Self {
        let now = Instant::now();
        Self {
            queue: VecDeque::new(),
            capacity,
            is_primed: false,
            refill_in_flight: false,
            created_at: now,
            last_accessed: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    pub fn needs_refill(&self) -> bool {
        !self.is_primed || self.queue.len() < (self.capacity as usize / 2).max(1)
    }
}
