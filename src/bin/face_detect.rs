use nazr_face::pipeline::face::FaceProcessor;
use nazr_face::pipeline::stream::DetectionPreview;
use nazr_face::pipeline::PipelineError;
use nazr_face::utils::camera::FfmpegCamera;
use nazr_face::utils::config::Config;
use nazr_face::utils::display::{open_display, OverlayMode, QuitSignal};
use nazr_face::utils::logging;
use tracing::{error, info};

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

    let quit = QuitSignal::from_stdin();
    info!("Press q (then Enter) to quit");
    let summary = DetectionPreview::new(&processor).run(
        || FfmpegCamera::open(&cfg),
        || open_display(&cfg, "Face Detection - press q to quit", OverlayMode::Detection, quit),
    );
    info!("{} frames, stopped: {:?}", summary.frames, summary.stop_reason);
    Ok(())
}
