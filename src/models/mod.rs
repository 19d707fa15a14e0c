pub mod face;

pub use face::{euclidean_distance, Embedding, FaceBox, Identity, RecognitionResult, EMBEDDING_DIM, UNKNOWN_LABEL};
