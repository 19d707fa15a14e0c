use nazr_face::pipeline::face::FaceProcessor;
use nazr_face::pipeline::recognize::Recognizer;
use nazr_face::pipeline::stream::StreamingPipeline;
use nazr_face::pipeline::PipelineError;
use nazr_face::store::StoreError;
use nazr_face::utils::camera::FfmpegCamera;
use nazr_face::utils::config::Config;
use nazr_face::utils::display::{open_display, OverlayMode, QuitSignal};
use nazr_face::utils::logging;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();

    let processor = match FaceProcessor::load(&cfg) {
        Ok(p) => p,
        Err(PipelineError::MissingResource(path)) => {
            error!("Model file not found: {:?}", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let recognizer = match Recognizer::load(&cfg.store_path) {
        Ok(r) => r,
        Err(StoreError::NotFound(path)) => {
            error!("Encodings file not found: {:?}. Run face_enroll first.", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if recognizer.index().is_empty() {
        warn!("Store has no embeddings; every face will be reported as Unknown");
    }

    let quit = QuitSignal::from_stdin();
    let pipeline = StreamingPipeline::new(&cfg, &processor, &processor, &recognizer);
    info!("Press q (then Enter) to quit");
    let summary = pipeline.run(
        || FfmpegCamera::open(&cfg),
        || open_display(&cfg, "Face Recognition - press q to quit", OverlayMode::Recognition, quit),
    );
    info!(
        "{} frames, {} recognition passes, stopped: {:?}",
        summary.frames, summary.passes, summary.stop_reason
    );
    Ok(())
}
