#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};
use nazr_face::pipeline::stream::{Display, FrameSource};
use nazr_face::utils::config::Config;
use nazr_face::{Detector, Embedding, Encoder, FaceBox, PipelineError, RecognitionResult};
use tempfile::TempDir;

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const BLACK: [u8; 3] = [0, 0, 0];

/// Reports one face covering the whole image unless the image is entirely black.
#[derive(Default)]
pub struct ColorDetector {
    pub calls: AtomicUsize,
}

impl ColorDetector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for ColorDetector {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<FaceBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image.pixels().all(|p| p.0 == BLACK) {
            return Ok(Vec::new());
        }
        Ok(vec![FaceBox::new(0, 0, image.width() as i32, image.height() as i32)])
    }
}

/// Embedding = mean colour of the face crop, scaled to [0, 1].
pub struct ColorEncoder;

impl Encoder for ColorEncoder {
    fn encode(&self, image: &RgbImage, face: &FaceBox) -> anyhow::Result<Embedding> {
        let (x, y, w, h) = face
            .clamp_to(image.width(), image.height())
            .ok_or_else(|| anyhow::anyhow!("box outside image"))?;
        let mut sum = [0f32; 3];
        for py in y..y + h {
            for px in x..x + w {
                let p = image.get_pixel(px, py);
                for c in 0..3 {
                    sum[c] += p[c] as f32 / 255.0;
                }
            }
        }
        let n = (w * h) as f32;
        Ok(Embedding::new(sum.iter().map(|s| s / n).collect()))
    }
}

pub fn solid(color: [u8; 3], width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

pub fn write_face(path: &Path, color: [u8; 3]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    solid(color, 16, 16).save(path).unwrap();
}

pub fn write_corrupt(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"definitely not a jpeg").unwrap();
}

/// Temp workspace with `faces/` and a store path, plus a config pointing at them.
pub fn setup_workspace() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        faces_dir: tmp.path().join("faces"),
        store_path: tmp.path().join("encodings.bin"),
        ..Config::default()
    };
    (tmp, config)
}

pub fn faces(config: &Config) -> PathBuf {
    config.faces_dir.clone()
}

/// Serves the given frames in order, then fails.
pub struct VecCamera {
    frames: std::vec::IntoIter<RgbImage>,
    pub released: Arc<AtomicBool>,
}

impl VecCamera {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self { frames: frames.into_iter(), released: Arc::new(AtomicBool::new(false)) }
    }
}

impl FrameSource for VecCamera {
    fn read(&mut self) -> Result<RgbImage, PipelineError> {
        self.frames
            .next()
            .ok_or_else(|| PipelineError::FrameReadFailure("no more frames".into()))
    }
}

impl Drop for VecCamera {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Records every frame it is asked to show.
#[derive(Default)]
pub struct CapturingDisplay {
    pub shown: Arc<Mutex<Vec<(u64, Vec<RecognitionResult>)>>>,
    pub quit_after: Option<usize>,
    pub fail_after: Option<usize>,
    pub released: Arc<AtomicBool>,
}

impl Display for CapturingDisplay {
    fn show(&mut self, _frame: RgbImage, results: &[RecognitionResult], frame_index: u64) -> anyhow::Result<()> {
        let mut shown = self.shown.lock().unwrap();
        if self.fail_after.map_or(false, |n| shown.len() >= n) {
            anyhow::bail!("window closed");
        }
        shown.push((frame_index, results.to_vec()));
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        let shown = self.shown.lock().unwrap().len();
        self.quit_after.map_or(false, |n| shown >= n)
    }
}

impl Drop for CapturingDisplay {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
