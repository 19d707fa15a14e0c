use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::models::{Embedding, UNKNOWN_LABEL};
use crate::pipeline::{Detector, Encoder, PipelineError};
use crate::store::EmbeddingStore;
use crate::utils::config::Config;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdentityCount {
    pub identity: String,
    pub embeddings: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrollmentReport {
    /// Per-identity embedding counts, in store order.
    pub identities: Vec<IdentityCount>,
    pub unreadable: usize,
    pub no_face: usize,
    /// Samples the detector or encoder failed on.
    pub model_errors: usize,
    /// Identity directories that were not enrolled (reserved or non UTF-8 names).
    pub rejected: Vec<String>,
}

impl EnrollmentReport {
    fn from_store(store: &EmbeddingStore) -> Self {
        Self {
            identities: store
                .iter()
                .map(|(identity, embeddings)| IdentityCount {
                    identity: identity.to_string(),
                    embeddings: embeddings.len(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn count(&self, identity: &str) -> Option<usize> {
        self.identities
            .iter()
            .find(|c| c.identity == identity)
            .map(|c| c.embeddings)
    }

    pub fn total(&self) -> usize {
        self.identities.iter().map(|c| c.embeddings).sum()
    }
}

/// Builds an embedding store from `<faces_dir>/<identity>/<image>` samples.
///
/// When a sample contains several faces the first box returned by the
/// detector is enrolled. No size or position heuristic is applied.
pub struct Enrollment<'a, D: ?Sized, E: ?Sized> {
    config: &'a Config,
    detector: &'a D,
    encoder: &'a E,
}

impl<'a, D, E> Enrollment<'a, D, E>
where
    D: Detector + ?Sized,
    E: Encoder + ?Sized,
{
    pub fn new(config: &'a Config, detector: &'a D, encoder: &'a E) -> Self {
        Self { config, detector, encoder }
    }

    /// Enroll `config.faces_dir` and persist the result to `config.store_path`.
    pub fn run(&self) -> Result<EnrollmentReport, PipelineError> {
        let (store, report) = self.build_store(&self.config.faces_dir)?;
        store.persist(&self.config.store_path)?;
        Ok(report)
    }

    pub fn build_store(&self, faces_dir: &Path) -> Result<(EmbeddingStore, EnrollmentReport), PipelineError> {
        if !faces_dir.is_dir() {
            return Err(PipelineError::MissingResource(faces_dir.to_path_buf()));
        }

        let mut store = EmbeddingStore::new();
        let mut unreadable = 0;
        let mut no_face = 0;
        let mut model_errors = 0;
        let mut rejected = Vec::new();

        let people = WalkDir::new(faces_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir());

        for person in people {
            let Some(identity) = person.file_name().to_str().map(str::to_string) else {
                warn!("Skipping identity directory with non UTF-8 name: {:?}", person.path());
                rejected.push(person.file_name().to_string_lossy().into_owned());
                continue;
            };
            if identity == UNKNOWN_LABEL {
                warn!("Skipping identity directory {:?}: \"{}\" is reserved", person.path(), UNKNOWN_LABEL);
                rejected.push(identity);
                continue;
            }
            store.ensure_identity(&identity)?;

            let samples = WalkDir::new(person.path())
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file());

            for sample in samples {
                match self.enroll_image(sample.path()) {
                    Ok(embedding) => {
                        store.add(&identity, embedding)?;
                        info!("Encoded: {}/{}", identity, sample.file_name().to_string_lossy());
                    }
                    Err(e @ PipelineError::UnreadableImage { .. }) => {
                        unreadable += 1;
                        debug!("{}", e);
                    }
                    Err(e @ PipelineError::NoFaceDetected(_)) => {
                        no_face += 1;
                        warn!("{}", e);
                    }
                    Err(PipelineError::Model(e)) => {
                        model_errors += 1;
                        warn!("Skipping {:?}: {:#}", sample.path(), e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let report = EnrollmentReport { unreadable, no_face, model_errors, rejected, ..EnrollmentReport::from_store(&store) };
        info!(
            "Enrollment finished: {} identities, {} embeddings ({} unreadable, {} without a face, {} model errors)",
            report.identities.len(),
            report.total(),
            report.unreadable,
            report.no_face,
            report.model_errors
        );
        Ok((store, report))
    }

    fn enroll_image(&self, path: &Path) -> Result<Embedding, PipelineError> {
        let image = image::open(path)
            .map_err(|e| PipelineError::UnreadableImage { path: path.to_path_buf(), reason: e.to_string() })?
            .to_rgb8();
        let faces = self.detector.detect(&image).map_err(PipelineError::Model)?;
        let Some(face) = faces.first() else {
            return Err(PipelineError::NoFaceDetected(path.to_path_buf()));
        };
        if faces.len() > 1 {
            debug!("{} faces in {:?}, enrolling the first", faces.len(), path);
        }
        self.encoder.encode(&image, face).map_err(PipelineError::Model)
    }
}
