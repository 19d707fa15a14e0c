use serde::{Deserialize, Serialize};
use std::fmt;

/// Label reserved for "no enrolled match within tolerance".
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Output dimension of the production face encoder.
pub const EMBEDDING_DIM: usize = 128;

/// Face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FaceBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 { self.right - self.left }
    pub fn height(&self) -> i32 { self.bottom - self.top }

    /// Intersect with a `width` x `height` frame and return `(x, y, w, h)`,
    /// or `None` when nothing of the box lies inside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.left.max(0) as i64;
        let y1 = self.top.max(0) as i64;
        let x2 = (self.right as i64).min(width as i64);
        let y2 = (self.bottom as i64).min(height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

/// Face feature vector produced by an encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize { self.0.len() }
    pub fn as_slice(&self) -> &[f32] { &self.0 }
    pub fn into_vec(self) -> Vec<f32> { self.0 }

    /// Euclidean distance. Callers must ensure equal dimensions.
    pub fn distance(&self, other: &[f32]) -> f32 {
        euclidean_distance(&self.0, other)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Outcome of classifying one embedding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn label(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub bbox: FaceBox,
    pub identity: Identity,
    /// Distance to the nearest enrolled embedding; infinite when nothing is enrolled.
    pub distance: f32,
}
