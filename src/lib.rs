pub mod models;
pub mod pipeline;
pub mod store;
pub mod utils;

pub use models::{Embedding, FaceBox, Identity, RecognitionResult};
pub use pipeline::recognize::Recognizer;
pub use pipeline::{Detector, Encoder, PipelineError};
pub use store::{EmbeddingStore, StoreError};
