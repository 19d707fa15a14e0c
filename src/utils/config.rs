use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::EMBEDDING_DIM;
use crate::pipeline::PipelineError;

#[derive(Clone, Debug)]
pub struct Config {
    pub detector_model: PathBuf,
    pub encoder_model: PathBuf,
    pub faces_dir: PathBuf,
    pub store_path: PathBuf,
    pub tolerance: f32,
    pub cadence: u64,
    pub camera_index: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
    pub embedding_dim: usize,
    pub headless: bool,
    pub font_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detector_model: PathBuf::from("models/scrfd_500m_bnkps.onnx"),
            encoder_model: PathBuf::from("models/face_embedding_128.onnx"),
            faces_dir: PathBuf::from("faces"),
            store_path: PathBuf::from("encodings.bin"),
            tolerance: 0.6,
            cadence: 5,
            camera_index: 0,
            frame_width: 640,
            frame_height: 480,
            confidence_threshold: 0.5,
            nms_iou_threshold: 0.4,
            embedding_dim: EMBEDDING_DIM,
            headless: false,
            font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            detector_model: path_var("NAZR_FACE_DETECTOR_MODEL").unwrap_or(d.detector_model),
            encoder_model: path_var("NAZR_FACE_ENCODER_MODEL").unwrap_or(d.encoder_model),
            faces_dir: path_var("NAZR_FACE_DIR").unwrap_or(d.faces_dir),
            store_path: path_var("NAZR_FACE_STORE").unwrap_or(d.store_path),
            tolerance: parsed_var::<f32>("NAZR_FACE_TOLERANCE")
                .filter(|t| *t > 0.0 && t.is_finite())
                .unwrap_or(d.tolerance),
            cadence: parsed_var::<u64>("NAZR_FACE_CADENCE").filter(|c| *c > 0).unwrap_or(d.cadence),
            camera_index: parsed_var("NAZR_FACE_CAMERA").unwrap_or(d.camera_index),
            frame_width: parsed_var::<u32>("NAZR_FACE_FRAME_WIDTH").filter(|w| *w > 0).unwrap_or(d.frame_width),
            frame_height: parsed_var::<u32>("NAZR_FACE_FRAME_HEIGHT").filter(|h| *h > 0).unwrap_or(d.frame_height),
            confidence_threshold: parsed_var("NAZR_FACE_CONFIDENCE_THRESHOLD").unwrap_or(d.confidence_threshold),
            nms_iou_threshold: parsed_var("NAZR_FACE_NMS_IOU_THRESHOLD").unwrap_or(d.nms_iou_threshold),
            embedding_dim: parsed_var::<usize>("NAZR_FACE_EMBEDDING_DIM").filter(|n| *n > 0).unwrap_or(d.embedding_dim),
            headless: env::var("NAZR_FACE_HEADLESS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
                .unwrap_or(d.headless),
            font_path: path_var("NAZR_FACE_FONT").unwrap_or(d.font_path),
        }
    }

    /// First model file that does not exist on disk.
    pub fn check_models(&self) -> Result<(), PipelineError> {
        for path in [&self.detector_model, &self.encoder_model] {
            if !path.exists() {
                return Err(PipelineError::MissingResource(path.clone()));
            }
        }
        Ok(())
    }
}

fn path_var(key: &str) -> Option<PathBuf> {
    env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "NAZR_FACE_DETECTOR_MODEL",
        "NAZR_FACE_ENCODER_MODEL",
        "NAZR_FACE_DIR",
        "NAZR_FACE_STORE",
        "NAZR_FACE_TOLERANCE",
        "NAZR_FACE_CADENCE",
        "NAZR_FACE_CAMERA",
        "NAZR_FACE_FRAME_WIDTH",
        "NAZR_FACE_FRAME_HEIGHT",
        "NAZR_FACE_CONFIDENCE_THRESHOLD",
        "NAZR_FACE_NMS_IOU_THRESHOLD",
        "NAZR_FACE_EMBEDDING_DIM",
        "NAZR_FACE_HEADLESS",
        "NAZR_FACE_FONT",
    ];

    fn clear_vars(vars: &[&str]) -> Vec<(String, Option<String>)> {
        let mut saved = Vec::new();
        for &k in vars {
            let prev = env::var(k).ok();
            saved.push((k.to_string(), prev));
            env::remove_var(k);
        }
        saved
    }

    fn restore_vars(saved: Vec<(String, Option<String>)>) {
        for (k, v) in saved {
            if let Some(val) = v {
                env::set_var(k, val);
            } else {
                env::remove_var(k);
            }
        }
    }

    // Both cases share one test so they never race on the process environment.
    #[test]
    fn test_config_defaults_and_overrides() {
        let saved = clear_vars(VARS);

        let config = Config::from_env();
        assert_eq!(config.detector_model, PathBuf::from("models/scrfd_500m_bnkps.onnx"));
        assert_eq!(config.encoder_model, PathBuf::from("models/face_embedding_128.onnx"));
        assert_eq!(config.faces_dir, PathBuf::from("faces"));
        assert_eq!(config.store_path, PathBuf::from("encodings.bin"));
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.cadence, 5);
        assert_eq!(config.camera_index, 0);
        assert_eq!((config.frame_width, config.frame_height), (640, 480));
        assert_eq!(config.embedding_dim, 128);
        assert!(!config.headless);

        env::set_var("NAZR_FACE_STORE", "/tmp/custom.bin");
        env::set_var("NAZR_FACE_TOLERANCE", "0.45");
        env::set_var("NAZR_FACE_CADENCE", "3");
        env::set_var("NAZR_FACE_CAMERA", "2");
        env::set_var("NAZR_FACE_HEADLESS", "1");
        let config = Config::from_env();
        assert_eq!(config.store_path, PathBuf::from("/tmp/custom.bin"));
        assert_eq!(config.tolerance, 0.45);
        assert_eq!(config.cadence, 3);
        assert_eq!(config.camera_index, 2);
        assert!(config.headless);

        // invalid values fall back to defaults
        env::set_var("NAZR_FACE_TOLERANCE", "-1");
        env::set_var("NAZR_FACE_CADENCE", "0");
        env::set_var("NAZR_FACE_CAMERA", "front");
        let config = Config::from_env();
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.cadence, 5);
        assert_eq!(config.camera_index, 0);

        restore_vars(saved);
    }

    #[test]
    fn test_check_models_reports_first_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let detector = tmp.path().join("det.onnx");
        std::fs::write(&detector, b"x").unwrap();
        let config = Config {
            detector_model: detector,
            encoder_model: tmp.path().join("enc.onnx"),
            ..Config::default()
        };
        match config.check_models() {
            Err(PipelineError::MissingResource(p)) => assert_eq!(p, tmp.path().join("enc.onnx")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
