use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::models::{Embedding, FaceBox};
use crate::pipeline::{Detector, Encoder, PipelineError};
use crate::utils::config::Config;

const SCRFD_INPUT: u32 = 640;
const SCRFD_STRIDES: [u32; 3] = [8, 16, 32];
const ENCODER_INPUT: u32 = 112;
const MIN_FACE_PX: f32 = 8.0;

/// Scored detection in source-image coordinates, before rounding to a `FaceBox`.
#[derive(Debug, Clone, Copy)]
struct ScoredBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
}

/// ONNX Runtime models behind the `Detector` and `Encoder` capabilities:
/// an SCRFD face detector and a crop-based embedding network.
pub struct FaceProcessor {
    detector: Mutex<Session>,
    encoder: Mutex<Session>,
    confidence_threshold: f32,
    nms_iou_threshold: f32,
    embedding_dim: usize,
}

impl FaceProcessor {
    pub fn load(config: &Config) -> Result<Self, PipelineError> {
        config.check_models()?;
        let detector = open_session(&config.detector_model).map_err(PipelineError::Model)?;
        let encoder = open_session(&config.encoder_model).map_err(PipelineError::Model)?;
        info!(
            "Face models loaded: detector={:?} encoder={:?}",
            config.detector_model, config.encoder_model
        );
        Ok(Self {
            detector: Mutex::new(detector),
            encoder: Mutex::new(encoder),
            confidence_threshold: config.confidence_threshold,
            nms_iou_threshold: config.nms_iou_threshold,
            embedding_dim: config.embedding_dim,
        })
    }

    fn preprocess_scrfd(&self, image: &RgbImage) -> ([i64; 4], Vec<f32>, f32) {
        // Resize with padding to 640x640 (NCHW), normalize to [-1, 1]
        let (ow, oh) = (image.width() as f32, image.height() as f32);
        let scale = SCRFD_INPUT as f32 / ow.max(oh);
        let nw = ((ow * scale) as u32).max(1);
        let nh = ((oh * scale) as u32).max(1);
        let resized = image::imageops::resize(image, nw, nh, FilterType::Triangle);
        let mut padded = RgbImage::new(SCRFD_INPUT, SCRFD_INPUT);
        image::imageops::overlay(&mut padded, &resized, 0, 0);

        let side = SCRFD_INPUT as usize;
        let mut data = Vec::with_capacity(3 * side * side);
        // InsightFace models expect BGR
        for c in [2usize, 1, 0] {
            for p in padded.pixels() {
                data.push((p[c] as f32 - 127.5) / 128.0);
            }
        }
        ([1, 3, SCRFD_INPUT as i64, SCRFD_INPUT as i64], data, scale)
    }

    fn preprocess_encoder(&self, face_crop: &DynamicImage) -> ([i64; 4], Vec<f32>) {
        let resized = face_crop
            .resize_exact(ENCODER_INPUT, ENCODER_INPUT, FilterType::Triangle)
            .to_rgb8();
        let side = ENCODER_INPUT as usize;
        let mut data = Vec::with_capacity(3 * side * side);
        for c in 0..3 {
            for p in resized.pixels() {
                data.push((p[c] as f32 - 127.5) / 128.0);
            }
        }
        ([1, 3, ENCODER_INPUT as i64, ENCODER_INPUT as i64], data)
    }

    fn decode_scrfd(&self, scores: &[f32], boxes: &[f32], stride: u32, scale: f32, img_w: f32, img_h: f32) -> Vec<ScoredBox> {
        let width = (SCRFD_INPUT / stride) as usize;
        let grid_points = width * width;
        if grid_points == 0 || scores.len() % grid_points != 0 || boxes.len() < scores.len() * 4 {
            warn!(
                "SCRFD stride {}: unexpected output sizes (scores={}, boxes={})",
                stride,
                scores.len(),
                boxes.len()
            );
            return Vec::new();
        }
        let anchors = scores.len() / grid_points;
        let stride = stride as f32;

        let mut out = Vec::new();
        for i in 0..grid_points {
            let cy = (i / width) as f32 * stride;
            let cx = (i % width) as f32 * stride;
            for a in 0..anchors {
                let idx = i * anchors + a;
                let confidence = scores[idx];
                if confidence < self.confidence_threshold {
                    continue;
                }
                // distances to the box edges (l, t, r, b), in stride units
                let b = &boxes[idx * 4..idx * 4 + 4];
                let x1 = ((cx - b[0] * stride) / scale).clamp(0.0, img_w);
                let y1 = ((cy - b[1] * stride) / scale).clamp(0.0, img_h);
                let x2 = ((cx + b[2] * stride) / scale).clamp(0.0, img_w);
                let y2 = ((cy + b[3] * stride) / scale).clamp(0.0, img_h);
                if x2 - x1 < MIN_FACE_PX || y2 - y1 < MIN_FACE_PX {
                    continue;
                }
                out.push(ScoredBox { x1, y1, x2, y2, confidence });
            }
        }
        out
    }
}

impl Detector for FaceProcessor {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let (shape, data, scale) = self.preprocess_scrfd(image);
        let img_w = image.width() as f32;
        let img_h = image.height() as f32;

        let mut session = self.detector.lock();
        let input_name = session.inputs[0].name.clone();
        let input = Value::from_array((shape.to_vec(), data))
            .context("Failed to create SCRFD input tensor")?;
        let outputs = session
            .run(ort::inputs![input_name => input])
            .context("SCRFD inference failed")?;

        let mut raw = Vec::new();
        for stride in SCRFD_STRIDES {
            let score = outputs.get(&format!("score_{}", stride));
            let bbox = outputs.get(&format!("bbox_{}", stride));
            let (Some(score), Some(bbox)) = (score, bbox) else {
                debug!("SCRFD output for stride {} not present", stride);
                continue;
            };
            let (_, scores) = score.try_extract_tensor::<f32>().context("SCRFD score tensor")?;
            let (_, boxes) = bbox.try_extract_tensor::<f32>().context("SCRFD bbox tensor")?;
            raw.extend(self.decode_scrfd(scores, boxes, stride, scale, img_w, img_h));
        }

        let kept = nms(&raw, self.nms_iou_threshold);
        debug!("SCRFD: {} candidates, {} after NMS", raw.len(), kept.len());
        Ok(kept
            .into_iter()
            .map(|b| FaceBox::new(b.x1.round() as i32, b.y1.round() as i32, b.x2.round() as i32, b.y2.round() as i32))
            .collect())
    }
}

impl Encoder for FaceProcessor {
    fn encode(&self, image: &RgbImage, face: &FaceBox) -> Result<Embedding> {
        let (x, y, w, h) = face
            .clamp_to(image.width(), image.height())
            .with_context(|| format!("Face box {:?} lies outside the frame", face))?;
        let crop = DynamicImage::ImageRgb8(image::imageops::crop_imm(image, x, y, w, h).to_image());
        let (shape, data) = self.preprocess_encoder(&crop);

        let mut session = self.encoder.lock();
        let input_name = session.inputs[0].name.clone();
        let input = Value::from_array((shape.to_vec(), data))
            .context("Failed to create encoder input tensor")?;
        let outputs = session
            .run(ort::inputs![input_name => input])
            .context("Encoder inference failed")?;
        let (_, output) = outputs
            .iter()
            .next()
            .context("Encoder produced no outputs")?;
        let (_, values) = output
            .try_extract_tensor::<f32>()
            .context("Encoder output is not an f32 tensor")?;

        if values.len() != self.embedding_dim {
            anyhow::bail!(
                "Encoder produced {} values, expected {}",
                values.len(),
                self.embedding_dim
            );
        }
        let mut v = values.to_vec();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(Embedding::new(v))
    }
}

fn open_session(path: &Path) -> Result<Session> {
    Session::builder()?
        .commit_from_file(path)
        .with_context(|| format!("Failed to create session for {:?}", path))
}

/// Greedy NMS. Survivors come back in descending confidence order.
fn nms(boxes: &[ScoredBox], iou_threshold: f32) -> Vec<ScoredBox> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep: Vec<ScoredBox> = Vec::new();
    for idx in order {
        let candidate = boxes[idx];
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &ScoredBox, b: &ScoredBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let intersection = (x2 - x1) * (y2 - y1);
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sb(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> ScoredBox {
        ScoredBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn test_iou() {
        let a = sb(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &sb(20.0, 20.0, 30.0, 30.0, 1.0)), 0.0);
        let half = sb(5.0, 0.0, 15.0, 10.0, 1.0);
        assert!((iou(&a, &half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_and_orders_by_confidence() {
        let boxes = vec![
            sb(0.0, 0.0, 10.0, 10.0, 0.6),
            sb(1.0, 1.0, 11.0, 11.0, 0.9),
            sb(50.0, 50.0, 60.0, 60.0, 0.7),
        ];
        let kept = nms(&boxes, 0.4);
        let confidences: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }
}
