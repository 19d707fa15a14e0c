pub mod format;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Embedding, UNKNOWN_LABEL};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Corrupt store: {0}")]
    CorruptFormat(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Identity label must not be empty")]
    EmptyIdentity,

    #[error("Identity label {0:?} is reserved")]
    ReservedIdentity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity -> ordered embeddings, iterated in insertion order.
///
/// Every embedding in the store has the same dimension. The dimension is
/// either fixed up front with [`EmbeddingStore::with_dimension`] or taken
/// from the first embedding added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingStore {
    dimension: Option<usize>,
    entries: Vec<(String, Vec<Embedding>)>,
    positions: HashMap<String, usize>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension: Some(dimension), ..Self::default() }
    }

    pub fn dimension(&self) -> Option<usize> { self.dimension }

    /// Number of identities.
    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn total_embeddings(&self) -> usize {
        self.entries.iter().map(|(_, e)| e.len()).sum()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.positions.contains_key(identity)
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn embeddings(&self, identity: &str) -> Option<&[Embedding]> {
        self.positions
            .get(identity)
            .map(|&i| self.entries[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Embedding])> {
        self.entries
            .iter()
            .map(|(label, embeddings)| (label.as_str(), embeddings.as_slice()))
    }

    /// Register an identity with no embeddings yet. No-op if already present.
    pub fn ensure_identity(&mut self, identity: &str) -> Result<(), StoreError> {
        self.slot(identity).map(|_| ())
    }

    pub fn add(&mut self, identity: &str, embedding: Embedding) -> Result<(), StoreError> {
        validate_label(identity)?;
        match self.dimension {
            Some(expected) if expected != embedding.dim() => {
                return Err(StoreError::DimensionMismatch { expected, actual: embedding.dim() });
            }
            Some(_) => {}
            None => {
                if embedding.dim() == 0 {
                    return Err(StoreError::DimensionMismatch { expected: 1, actual: 0 });
                }
                self.dimension = Some(embedding.dim());
            }
        }
        let idx = self.slot(identity)?;
        self.entries[idx].1.push(embedding);
        Ok(())
    }

    fn slot(&mut self, identity: &str) -> Result<usize, StoreError> {
        validate_label(identity)?;
        if let Some(&idx) = self.positions.get(identity) {
            return Ok(idx);
        }
        let idx = self.entries.len();
        self.entries.push((identity.to_string(), Vec::new()));
        self.positions.insert(identity.to_string(), idx);
        Ok(idx)
    }

    /// Write the store to `path`. The bytes go to a sibling temp file that is
    /// renamed into place once synced.
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = format::encode(self);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        let written = write_synced(&tmp_path, &bytes).and_then(|_| std::fs::rename(&tmp_path, path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        info!(
            "Persisted {} identities ({} embeddings, {} bytes) to {:?}",
            self.len(),
            self.total_embeddings(),
            bytes.len(),
            path
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let store = format::decode(&bytes)?;
        debug!("Loaded store from {:?}: {} identities, dim={:?}", path, store.len(), store.dimension);
        Ok(store)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn validate_label(identity: &str) -> Result<(), StoreError> {
    if identity.is_empty() {
        return Err(StoreError::EmptyIdentity);
    }
    if identity == UNKNOWN_LABEL {
        return Err(StoreError::ReservedIdentity(identity.to_string()));
    }
    Ok(())
}
