pub mod enroll;
pub mod recognize;
pub mod stream;
#[cfg(feature = "facial-recognition")]
pub mod face;

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;

use crate::models::{Embedding, FaceBox};
use crate::store::StoreError;

/// Locates faces in an image.
///
/// The returned order must be stable for a given input; enrollment keeps the
/// first box when a sample contains several faces.
pub trait Detector {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<FaceBox>>;
}

/// Turns one detected face into a fixed-length embedding.
pub trait Encoder {
    fn encode(&self, image: &RgbImage, face: &FaceBox) -> anyhow::Result<Embedding>;
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing resource: {0:?}")]
    MissingResource(PathBuf),

    #[error("Unreadable image {path:?}: {reason}")]
    UnreadableImage { path: PathBuf, reason: String },

    #[error("No face detected in {0:?}")]
    NoFaceDetected(PathBuf),

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Frame read failed: {0}")]
    FrameReadFailure(String),

    #[error("Model error: {0:#}")]
    Model(anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
