use nazr_face::pipeline::enroll::Enrollment;
use nazr_face::pipeline::face::FaceProcessor;
use nazr_face::pipeline::PipelineError;
use nazr_face::utils::config::Config;
use nazr_face::utils::logging;
use tracing::{debug, error, info};

fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();

    let processor = match FaceProcessor::load(&cfg) {
        Ok(p) => p,
        Err(PipelineError::MissingResource(path)) => {
            error!("Model file not found: {:?}", path);
            error!(
                "Place the detector at {:?} and the encoder at {:?} (or set NAZR_FACE_DETECTOR_MODEL / NAZR_FACE_ENCODER_MODEL)",
                cfg.detector_model, cfg.encoder_model
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let report = match Enrollment::new(&cfg, &processor, &processor).run() {
        Ok(report) => report,
        Err(PipelineError::MissingResource(dir)) => {
            error!("Enrollment directory not found: {:?}", dir);
            error!("Expected layout: {}/<name>/<image>.jpg, one directory per person", dir.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for count in &report.identities {
        info!("{}: {} images", count.identity, count.embeddings);
    }
    if !report.rejected.is_empty() {
        info!("Skipped directories: {}", report.rejected.join(", "));
    }
    debug!("Report: {}", serde_json::to_string(&report)?);
    info!("Saved {} encodings to {:?}", report.total(), cfg.store_path);
    Ok(())
}
