mod common;

use common::*;
use image::RgbImage;
use nazr_face::pipeline::enroll::Enrollment;
use nazr_face::{Detector, Embedding, EmbeddingStore, Encoder, FaceBox, PipelineError, StoreError};

/// Reports the right half of the image first, then the left half.
struct TwoFaceDetector;

impl Detector for TwoFaceDetector {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<FaceBox>> {
        let (w, h) = (image.width() as i32, image.height() as i32);
        Ok(vec![FaceBox::new(w / 2, 0, w, h), FaceBox::new(0, 0, w / 2, h)])
    }
}

/// Fails on faces of one colour, encodes the rest by colour.
struct FailingEncoder {
    fail_on: [u8; 3],
}

impl Encoder for FailingEncoder {
    fn encode(&self, image: &RgbImage, face: &FaceBox) -> anyhow::Result<Embedding> {
        if image.get_pixel(face.left as u32, face.top as u32).0 == self.fail_on {
            anyhow::bail!("model failed on this sample");
        }
        ColorEncoder.encode(image, face)
    }
}

/// Drops the last component for blue faces.
struct ShortBlueEncoder;

impl Encoder for ShortBlueEncoder {
    fn encode(&self, image: &RgbImage, face: &FaceBox) -> anyhow::Result<Embedding> {
        let mut values = ColorEncoder.encode(image, face)?.into_vec();
        if image.get_pixel(face.left as u32, face.top as u32).0 == BLUE {
            values.pop();
        }
        Ok(Embedding::new(values))
    }
}

#[test]
fn enrolls_identities_in_name_order_and_skips_bad_samples() {
    let (_tmp, config) = setup_workspace();
    let dir = faces(&config);
    write_face(&dir.join("bob/1.png"), BLUE);
    write_face(&dir.join("bob/2.png"), BLUE);
    write_face(&dir.join("alice/a.png"), RED);
    write_corrupt(&dir.join("alice/broken.jpg"));
    write_face(&dir.join("alice/empty.png"), BLACK);
    std::fs::write(dir.join("README.txt"), "not an identity").unwrap();

    let detector = ColorDetector::default();
    let report = Enrollment::new(&config, &detector, &ColorEncoder).run().unwrap();

    let names: Vec<&str> = report.identities.iter().map(|c| c.identity.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(report.count("alice"), Some(1));
    assert_eq!(report.count("bob"), Some(2));
    assert_eq!(report.unreadable, 1);
    assert_eq!(report.no_face, 1);
    assert_eq!(report.total(), 3);

    let store = EmbeddingStore::load(&config.store_path).unwrap();
    assert_eq!(store.identities().collect::<Vec<_>>(), vec!["alice", "bob"]);
    assert_eq!(store.dimension(), Some(3));
    assert_eq!(store.embeddings("alice").unwrap()[0].as_slice(), &[1.0, 0.0, 0.0]);
    assert_eq!(store.total_embeddings(), 3);
}

#[test]
fn identity_without_usable_images_is_kept_empty() {
    let (_tmp, config) = setup_workspace();
    let dir = faces(&config);
    write_face(&dir.join("alice/a.png"), RED);
    write_face(&dir.join("carol/dark.png"), BLACK);

    let detector = ColorDetector::default();
    let (store, report) = Enrollment::new(&config, &detector, &ColorEncoder)
        .build_store(&dir)
        .unwrap();

    assert!(store.contains("carol"));
    assert_eq!(store.embeddings("carol").unwrap().len(), 0);
    assert_eq!(report.count("carol"), Some(0));
    assert_eq!(report.no_face, 1);
}

#[test]
fn reserved_directory_name_is_rejected() {
    let (_tmp, config) = setup_workspace();
    let dir = faces(&config);
    write_face(&dir.join("Unknown/x.png"), GREEN);
    write_face(&dir.join("alice/a.png"), RED);

    let detector = ColorDetector::default();
    let (store, report) = Enrollment::new(&config, &detector, &ColorEncoder)
        .build_store(&dir)
        .unwrap();

    assert_eq!(store.len(), 1);
    assert!(!store.contains("Unknown"));
    assert_eq!(report.rejected, vec!["Unknown".to_string()]);
}

#[test]
fn missing_faces_directory_is_a_missing_resource() {
    let (_tmp, config) = setup_workspace();
    let detector = ColorDetector::default();
    let err = Enrollment::new(&config, &detector, &ColorEncoder).run().unwrap_err();
    assert!(matches!(err, PipelineError::MissingResource(p) if p == config.faces_dir));
    assert!(!config.store_path.exists());
}

#[test]
fn empty_faces_directory_produces_empty_store() {
    let (_tmp, config) = setup_workspace();
    std::fs::create_dir_all(&config.faces_dir).unwrap();
    let detector = ColorDetector::default();
    let report = Enrollment::new(&config, &detector, &ColorEncoder).run().unwrap();
    assert!(report.identities.is_empty());

    let store = EmbeddingStore::load(&config.store_path).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.dimension(), None);
}

#[test]
fn model_failure_on_one_sample_keeps_the_rest() {
    let (_tmp, config) = setup_workspace();
    let dir = faces(&config);
    write_face(&dir.join("alice/a.png"), RED);
    write_face(&dir.join("bob/b.png"), BLUE);
    write_face(&dir.join("carol/c.png"), GREEN);

    let detector = ColorDetector::default();
    let encoder = FailingEncoder { fail_on: GREEN };
    let report = Enrollment::new(&config, &detector, &encoder).run().unwrap();

    assert_eq!(report.model_errors, 1);
    assert_eq!(report.count("alice"), Some(1));
    assert_eq!(report.count("bob"), Some(1));
    assert_eq!(report.count("carol"), Some(0));

    let store = EmbeddingStore::load(&config.store_path).unwrap();
    assert_eq!(store.total_embeddings(), 2);
    assert_eq!(store.embeddings("bob").unwrap()[0].as_slice(), &[0.0, 0.0, 1.0]);
}

#[test]
fn first_detection_is_enrolled_when_several_faces() {
    let (_tmp, config) = setup_workspace();
    let dir = faces(&config);
    let mut pair = solid(RED, 32, 16);
    for y in 0..16 {
        for x in 16..32 {
            pair.put_pixel(x, y, image::Rgb(BLUE));
        }
    }
    std::fs::create_dir_all(dir.join("alice")).unwrap();
    pair.save(dir.join("alice/pair.png")).unwrap();

    let (store, report) = Enrollment::new(&config, &TwoFaceDetector, &ColorEncoder)
        .build_store(&dir)
        .unwrap();

    assert_eq!(report.count("alice"), Some(1));
    assert_eq!(store.embeddings("alice").unwrap()[0].as_slice(), &[0.0, 0.0, 1.0]);
}

#[test]
fn dimension_mismatch_aborts_without_writing_store() {
    let (_tmp, config) = setup_workspace();
    let dir = faces(&config);
    write_face(&dir.join("alice/a.png"), RED);
    write_face(&dir.join("bob/b.png"), BLUE);

    let detector = ColorDetector::default();
    let err = Enrollment::new(&config, &detector, &ShortBlueEncoder).run().unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Store(StoreError::DimensionMismatch { expected: 3, actual: 2 })
    ));
    assert!(!config.store_path.exists());
}
