//! Chunk Model and Blob Envelope
//!
//! A chunk is an immutable block of compressed time-series samples together
//! with the label set that identifies its series and the `[from, through]`
//! time bounds it covers. Chunks are written once, read many times, and
//! never mutated.
//!
//! ## Chunk IDs
//!
//! A chunk ID is an opaque string of the shape
//! `<fingerprint>/<fromMs>/<throughMs>`. The fingerprint identifies the
//! series; the bounds are embedded so the read path can time-filter index
//! rows without fetching bodies. Parsing and re-formatting an ID yields the
//! identical string - blob keys and index rows are derived from it, so the
//! round trip must be exact.
//!
//! ## Blob Envelope
//!
//! The body stored in the object store is a self-describing envelope:
//!
//! ```text
//! ┌──────────────┬───────────────────┬─────────────┬───────────┐
//! │ meta_len u32 │ metadata (JSON)   │ sample data │ CRC32 u32 │
//! │ big-endian   │ id/metric/bounds  │ opaque      │ of prior  │
//! └──────────────┴───────────────────┴─────────────┴───────────┘
//! ```
//!
//! The CRC covers everything before it. Decoding validates length fields
//! and the checksum before touching the JSON, so a truncated or corrupted
//! object surfaces as `ChunkDecode` rather than garbage samples.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::labels::LabelSet;

/// The parsed form of a chunk ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkIdParts {
    pub fingerprint: String,
    pub from: i64,
    pub through: i64,
}

impl ChunkIdParts {
    /// Parse `<fingerprint>/<fromMs>/<throughMs>`.
    pub fn parse(id: &str) -> Result<Self> {
        let mut parts = id.splitn(3, '/');
        let (Some(fingerprint), Some(from), Some(through)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidChunkId(id.to_string()));
        };
        if fingerprint.is_empty() {
            return Err(Error::InvalidChunkId(id.to_string()));
        }
        let from: i64 = from
            .parse()
            .map_err(|_| Error::InvalidChunkId(id.to_string()))?;
        let through: i64 = through
            .parse()
            .map_err(|_| Error::InvalidChunkId(id.to_string()))?;
        Ok(Self {
            fingerprint: fingerprint.to_string(),
            from,
            through,
        })
    }

    /// Format back into the canonical ID string.
    pub fn format(&self) -> String {
        format!("{}/{}/{}", self.fingerprint, self.from, self.through)
    }
}

/// Metadata carried in the blob envelope.
#[derive(Debug, Serialize, Deserialize)]
struct ChunkMeta {
    id: String,
    metric: LabelSet,
    from: i64,
    through: i64,
}

/// An immutable block of time-series samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Opaque ID encoding `(fingerprint, from, through)`.
    pub id: String,

    /// Label set of the series, including `__name__`.
    pub metric: LabelSet,

    /// Inclusive lower time bound (milliseconds since epoch).
    pub from: i64,

    /// Inclusive upper time bound (milliseconds since epoch).
    pub through: i64,

    /// Opaque encoded sample payload.
    pub data: Bytes,

    /// Whether the label set was recovered from an index row rather than
    /// the blob body. Transient; never persisted.
    pub metadata_in_index: bool,
}

impl Chunk {
    /// Create a chunk, deriving its ID from the fingerprint and bounds.
    pub fn new(
        fingerprint: impl Into<String>,
        metric: LabelSet,
        from: i64,
        through: i64,
        data: Bytes,
    ) -> Self {
        let id = ChunkIdParts {
            fingerprint: fingerprint.into(),
            from,
            through,
        }
        .format();
        Self {
            id,
            metric,
            from,
            through,
            data,
            metadata_in_index: false,
        }
    }

    /// A chunk known only by ID, as recovered from an index row. The label
    /// set and data are filled in once the body is fetched and decoded.
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metric: LabelSet::new(),
            from: 0,
            through: 0,
            data: Bytes::new(),
            metadata_in_index: false,
        }
    }

    /// Encode the chunk into its blob envelope.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let meta = ChunkMeta {
            id: self.id.clone(),
            metric: self.metric.clone(),
            from: self.from,
            through: self.through,
        };
        let meta_json =
            serde_json::to_vec(&meta).map_err(|e| Error::ChunkDecode(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(4 + meta_json.len() + self.data.len() + 4);
        buf.put_u32(meta_json.len() as u32);
        buf.put_slice(&meta_json);
        buf.put_slice(&self.data);
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);
        Ok(buf.freeze())
    }

    /// Decode a blob envelope back into a chunk.
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        if body.len() < 8 {
            return Err(Error::ChunkDecode(format!(
                "body too short: {} bytes",
                body.len()
            )));
        }

        let (payload, crc_bytes) = body.split_at(body.len() - 4);
        let stored_crc =
            u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed_crc = crc32fast::hash(payload);
        if stored_crc != computed_crc {
            return Err(Error::ChunkDecode(format!(
                "CRC mismatch: stored {stored_crc:#x}, computed {computed_crc:#x}"
            )));
        }

        let meta_len =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        if payload.len() < 4 + meta_len {
            return Err(Error::ChunkDecode(format!(
                "metadata length {meta_len} exceeds body"
            )));
        }
        let meta: ChunkMeta = serde_json::from_slice(&payload[4..4 + meta_len])
            .map_err(|e| Error::ChunkDecode(e.to_string()))?;

        Ok(Self {
            id: meta.id,
            metric: meta.metric,
            from: meta.from,
            through: meta.through,
            data: Bytes::copy_from_slice(&payload[4 + meta_len..]),
            metadata_in_index: false,
        })
    }

    /// Whether the chunk's bounds overlap `[from, through]`.
    pub fn overlaps(&self, from: i64, through: i64) -> bool {
        self.through >= from && self.from <= through
    }
}

/// Sort chunks by ID in place.
pub fn sort_by_id(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| a.id.cmp(&b.id));
}

/// Remove adjacent duplicates from a sorted-by-ID vector.
pub fn dedup_by_id(chunks: &mut Vec<Chunk>) {
    chunks.dedup_by(|a, b| a.id == b.id);
}

/// Order-preserving union of two sorted-by-ID vectors.
pub fn merge_sorted(left: Vec<Chunk>, right: Vec<Chunk>) -> Vec<Chunk> {
    let mut result = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => match l.id.cmp(&r.id) {
                std::cmp::Ordering::Less => result.push(left.next().unwrap()),
                std::cmp::Ordering::Greater => result.push(right.next().unwrap()),
                std::cmp::Ordering::Equal => {
                    result.push(left.next().unwrap());
                    right.next();
                }
            },
            (Some(_), None) => result.push(left.next().unwrap()),
            (None, Some(_)) => result.push(right.next().unwrap()),
            (None, None) => break,
        }
    }
    result
}

/// N-way intersection of sorted-by-ID vectors.
pub fn intersect_sorted(mut sets: Vec<Vec<Chunk>>) -> Vec<Chunk> {
    match sets.len() {
        0 => Vec::new(),
        1 => sets.pop().unwrap(),
        _ => {
            let first = sets.remove(0);
            sets.into_iter().fold(first, intersect_pair)
        }
    }
}

fn intersect_pair(left: Vec<Chunk>, right: Vec<Chunk>) -> Vec<Chunk> {
    let mut result = Vec::with_capacity(left.len().min(right.len()));
    let mut right = right.into_iter().peekable();

    for chunk in left {
        while right.peek().is_some_and(|r| r.id < chunk.id) {
            right.next();
        }
        if right.peek().is_some_and(|r| r.id == chunk.id) {
            result.push(chunk);
            right.next();
        }
    }
    result
}
