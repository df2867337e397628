//! Payload codec for the shared tier.
//!
//! Entries are serialized to compact JSON and gzip-compressed before they
//! leave the process. Anything that fails to inflate or parse on the way
//! back is reported as a corrupt entry.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use super::{CacheEntry, CacheKey, CacheTier, TierError, TierResult};

/// Compress bytes with gzip at the given level (0-9)
pub fn compress(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress gzip data
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Entry encoder for one tier
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    tier: CacheTier,
    level: u32,
}

impl Codec {
    /// Codec reporting errors against `tier`
    pub fn new(tier: CacheTier, level: u32) -> Self {
        Self {
            tier,
            level: level.min(9),
        }
    }

    /// Serialize and compress an entry
    pub fn encode(&self, entry: &CacheEntry) -> TierResult<Vec<u8>> {
        let json = serde_json::to_vec(entry).map_err(|e| self.corrupt(&entry.key, e))?;
        compress(&json, self.level).map_err(|source| TierError::Io {
            tier: self.tier,
            source,
        })
    }

    /// Decompress and deserialize an entry stored under `key`
    pub fn decode(&self, key: &CacheKey, bytes: &[u8]) -> TierResult<CacheEntry> {
        let json = decompress(bytes).map_err(|e| self.corrupt(key, e))?;
        let entry: CacheEntry = serde_json::from_slice(&json).map_err(|e| self.corrupt(key, e))?;
        if entry.key != *key {
            return Err(self.corrupt(key, format!("entry belongs to {}", entry.key)));
        }
        Ok(entry)
    }

    fn corrupt(&self, key: &CacheKey, err: impl std::fmt::Display) -> TierError {
        TierError::Corrupt {
            tier: self.tier,
            key: key.storage_name(),
            message: err.to_string(),
        }
    }
}
