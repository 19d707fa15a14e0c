//! Persisted embedding store layout
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "NZRFACE\0"
//! 0x08     4       u32 LE      Format version (1)
//! 0x0C     4       u32 LE      D: embedding dimension (0 = not yet established)
//! 0x10     4       u32 LE      N: identity count
//! 0x14     ...                 N identity records
//!
//! Identity record:
//!          4       u32 LE      label length in bytes
//!          L       [u8]        label (UTF-8)
//!          4       u32 LE      M: embedding count
//!          M*D*4   [f32]       embeddings (Little Endian)
//! ```

use crate::models::{Embedding, UNKNOWN_LABEL};

use super::{EmbeddingStore, StoreError};

pub const MAGIC: [u8; 8] = *b"NZRFACE\0";
pub const FORMAT_VERSION: u32 = 1;

/// 8 (magic) + 4 (version) + 4 (dimension) + 4 (identity count)
pub const HEADER_SIZE: usize = 20;

pub fn encode(store: &EmbeddingStore) -> Vec<u8> {
    let dim = store.dimension().unwrap_or(0);
    let mut buf = Vec::with_capacity(HEADER_SIZE + store.total_embeddings() * dim * 4);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(dim as u32).to_le_bytes());
    buf.extend_from_slice(&(store.len() as u32).to_le_bytes());

    for (label, embeddings) in store.iter() {
        buf.extend_from_slice(&(label.len() as u32).to_le_bytes());
        buf.extend_from_slice(label.as_bytes());
        buf.extend_from_slice(&(embeddings.len() as u32).to_le_bytes());
        for embedding in embeddings {
            for &v in embedding.as_slice() {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    buf
}

pub fn decode(bytes: &[u8]) -> Result<EmbeddingStore, StoreError> {
    let mut r = Reader { bytes, pos: 0 };

    if r.take(MAGIC.len())? != MAGIC {
        return Err(corrupt("invalid magic bytes"));
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", version)));
    }
    let dim = r.u32()? as usize;
    let identities = r.u32()? as usize;

    let mut store = if dim == 0 {
        EmbeddingStore::new()
    } else {
        EmbeddingStore::with_dimension(dim)
    };

    for _ in 0..identities {
        let label_len = r.u32()? as usize;
        let label = std::str::from_utf8(r.take(label_len)?)
            .map_err(|_| corrupt("identity label is not valid UTF-8"))?
            .to_string();
        if label.is_empty() || label == UNKNOWN_LABEL {
            return Err(corrupt(format!("invalid identity label {:?}", label)));
        }
        if store.contains(&label) {
            return Err(corrupt(format!("duplicate identity {:?}", label)));
        }

        let count = r.u32()? as usize;
        if count > 0 && dim == 0 {
            return Err(corrupt("embeddings present but dimension is 0"));
        }
        let byte_len = count
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt("embedding block size overflows"))?;
        let block = r.take(byte_len)?;

        store.ensure_identity(&label).map_err(|e| corrupt(e.to_string()))?;
        if dim > 0 {
            for chunk in block.chunks_exact(dim * 4) {
                let values = chunk
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect::<Vec<_>>();
                store
                    .add(&label, Embedding::new(values))
                    .map_err(|e| corrupt(e.to_string()))?;
            }
        }
    }

    if r.pos != bytes.len() {
        return Err(corrupt(format!("{} trailing bytes", bytes.len() - r.pos)));
    }
    Ok(store)
}

fn corrupt(msg: impl Into<String>) -> StoreError {
    StoreError::CorruptFormat(msg.into())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| corrupt(format!("unexpected end of data at offset {}", self.pos)))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
