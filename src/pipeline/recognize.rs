// Nearest-neighbour recognition
// -----------------------------
//
// The store is flattened once into a row-major matrix with a parallel label
// vector. Queries are a brute-force Euclidean scan over every row, which is
// plenty for a few hundred enrolled samples.

use std::path::Path;

use image::RgbImage;
use ndarray::Array2;
use tracing::{debug, info};

use crate::models::{euclidean_distance, FaceBox, Identity, RecognitionResult};
use crate::pipeline::{Encoder, PipelineError};
use crate::store::{EmbeddingStore, StoreError};

pub struct FlatIndex {
    embeddings: Array2<f32>,
    identities: Vec<String>,
}

impl FlatIndex {
    /// Rows follow store order: identities in insertion order, then each
    /// identity's embeddings in list order.
    pub fn build(store: &EmbeddingStore) -> Self {
        let dim = store.dimension().unwrap_or(0);
        let mut flat = Vec::with_capacity(store.total_embeddings() * dim);
        let mut identities = Vec::with_capacity(store.total_embeddings());
        for (label, embeddings) in store.iter() {
            for embedding in embeddings {
                flat.extend_from_slice(embedding.as_slice());
                identities.push(label.to_string());
            }
        }
        let rows = identities.len();
        let embeddings = Array2::from_shape_vec((rows, if rows == 0 { 0 } else { dim }), flat)
            .unwrap_or_else(|_| Array2::zeros((0, 0)));
        Self { embeddings, identities }
    }

    pub fn len(&self) -> usize { self.identities.len() }
    pub fn is_empty(&self) -> bool { self.identities.is_empty() }
    pub fn dimension(&self) -> usize { self.embeddings.ncols() }

    pub fn identity(&self, row: usize) -> Option<&str> {
        self.identities.get(row).map(String::as_str)
    }

    /// Row and distance of the closest entry. Equal distances resolve to the
    /// lowest row. `None` when the index is empty.
    pub fn nearest(&self, query: &[f32]) -> Result<Option<(usize, f32)>, StoreError> {
        if self.is_empty() {
            return Ok(None);
        }
        if query.len() != self.dimension() {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        let mut best: Option<(usize, f32)> = None;
        for (row, known) in self.embeddings.outer_iter().enumerate() {
            let d = match known.as_slice() {
                Some(known) => euclidean_distance(known, query),
                None => known
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
                    .sqrt(),
            };
            if d.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((row, d));
            }
        }
        Ok(best)
    }
}

pub struct Recognizer {
    index: FlatIndex,
}

impl Recognizer {
    pub fn new(store: &EmbeddingStore) -> Self {
        let index = FlatIndex::build(store);
        info!("Loaded {} face embeddings for {} identities", index.len(), store.len());
        Self { index }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let store = EmbeddingStore::load(path)?;
        Ok(Self::new(&store))
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn recognize(&self, query: &[f32], tolerance: f32) -> Result<Identity, StoreError> {
        self.classify(query, tolerance).map(|(identity, _)| identity)
    }

    /// Identity plus the distance to the nearest entry (infinite when empty).
    /// A match requires `distance < tolerance`.
    pub fn classify(&self, query: &[f32], tolerance: f32) -> Result<(Identity, f32), StoreError> {
        let Some((row, distance)) = self.index.nearest(query)? else {
            return Ok((Identity::Unknown, f32::INFINITY));
        };
        let identity = match self.index.identity(row) {
            Some(label) if distance < tolerance => Identity::Known(label.to_string()),
            _ => Identity::Unknown,
        };
        Ok((identity, distance))
    }

    /// Encode and classify every detection independently. Several faces in a
    /// frame may resolve to the same identity.
    pub fn recognize_frame<E: Encoder + ?Sized>(
        &self,
        encoder: &E,
        frame: &RgbImage,
        detections: &[FaceBox],
        tolerance: f32,
    ) -> Result<Vec<RecognitionResult>, PipelineError> {
        let mut results = Vec::with_capacity(detections.len());
        for bbox in detections {
            let embedding = encoder.encode(frame, bbox).map_err(PipelineError::Model)?;
            let (identity, distance) = self.classify(embedding.as_slice(), tolerance)?;
            debug!("Face {:?} -> {} (distance={:.4})", bbox, identity, distance);
            results.push(RecognitionResult { bbox: *bbox, identity, distance });
        }
        Ok(results)
    }
}
