use image::RgbImage;
use tracing::{error, info, warn};

use crate::models::{Identity, RecognitionResult};
use crate::pipeline::recognize::Recognizer;
use crate::pipeline::{Detector, Encoder, PipelineError};
use crate::utils::config::Config;

/// Blocking frame producer. There is no read timeout: a stalled source
/// stalls the loop.
pub trait FrameSource {
    fn read(&mut self) -> Result<RgbImage, PipelineError>;
}

/// Rendering surface for annotated frames.
pub trait Display {
    /// Draw `results` over `frame` plus the HUD and present it.
    fn show(&mut self, frame: RgbImage, results: &[RecognitionResult], frame_index: u64) -> anyhow::Result<()>;

    /// Non-blocking check for a user quit request.
    fn quit_requested(&mut self) -> bool;
}

impl<T: Display + ?Sized> Display for Box<T> {
    fn show(&mut self, frame: RgbImage, results: &[RecognitionResult], frame_index: u64) -> anyhow::Result<()> {
        (**self).show(frame, results, frame_index)
    }

    fn quit_requested(&mut self) -> bool {
        (**self).quit_requested()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    CameraUnavailable,
    FrameReadFailure,
    DisplayClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Active,
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: u64,
    /// Frames that went through detection (and recognition, when enabled).
    pub passes: u64,
    pub stop_reason: StopReason,
}

/// Single-threaded capture → recognize → render loop.
///
/// Recognition only runs when `frame_count % cadence == 0`; the frames in
/// between are drawn with the last result set, so boxes can trail the face by
/// up to `cadence - 1` frames. A failed pass clears the result set.
pub struct StreamingPipeline<'a, D: ?Sized, E: ?Sized> {
    detector: &'a D,
    encoder: &'a E,
    recognizer: &'a Recognizer,
    tolerance: f32,
    cadence: u64,
}

impl<'a, D, E> StreamingPipeline<'a, D, E>
where
    D: Detector + ?Sized,
    E: Encoder + ?Sized,
{
    pub fn new(config: &Config, detector: &'a D, encoder: &'a E, recognizer: &'a Recognizer) -> Self {
        Self {
            detector,
            encoder,
            recognizer,
            tolerance: config.tolerance,
            cadence: config.cadence.max(1),
        }
    }

    pub fn cadence(&self) -> u64 {
        self.cadence
    }

    /// Open the camera, then the display, and run until a stop condition.
    /// The display is only opened once the camera is up. Both are owned by
    /// this call and dropped on every exit path.
    pub fn run<S, V, F, G>(&self, open_camera: F, open_display: G) -> StreamSummary
    where
        S: FrameSource,
        V: Display,
        F: FnOnce() -> Result<S, PipelineError>,
        G: FnOnce() -> V,
    {
        info!("Streaming started (cadence={}, tolerance={})", self.cadence, self.tolerance);
        drive(open_camera, open_display, self.cadence, |frame| {
            let detections = self.detector.detect(frame).map_err(PipelineError::Model)?;
            self.recognizer
                .recognize_frame(self.encoder, frame, &detections, self.tolerance)
        })
    }
}

/// Detection-only live preview: every frame is run through the detector and
/// drawn without identities.
pub struct DetectionPreview<'a, D: ?Sized> {
    detector: &'a D,
}

impl<'a, D: Detector + ?Sized> DetectionPreview<'a, D> {
    pub fn new(detector: &'a D) -> Self {
        Self { detector }
    }

    pub fn run<S, V, F, G>(&self, open_camera: F, open_display: G) -> StreamSummary
    where
        S: FrameSource,
        V: Display,
        F: FnOnce() -> Result<S, PipelineError>,
        G: FnOnce() -> V,
    {
        info!("Detection preview started");
        drive(open_camera, open_display, 1, |frame| {
            let detections = self.detector.detect(frame).map_err(PipelineError::Model)?;
            Ok(detections
                .into_iter()
                .map(|bbox| RecognitionResult { bbox, identity: Identity::Unknown, distance: f32::INFINITY })
                .collect())
        })
    }
}

fn drive<S, V, F, G, A>(open_camera: F, open_display: G, cadence: u64, mut analyze: A) -> StreamSummary
where
    S: FrameSource,
    V: Display,
    F: FnOnce() -> Result<S, PipelineError>,
    G: FnOnce() -> V,
    A: FnMut(&RgbImage) -> Result<Vec<RecognitionResult>, PipelineError>,
{
    let mut camera = match open_camera() {
        Ok(camera) => camera,
        Err(e) => {
            error!("{}", e);
            return StreamSummary { frames: 0, passes: 0, stop_reason: StopReason::CameraUnavailable };
        }
    };
    let mut display = open_display();

    let mut frame_count: u64 = 0;
    let mut frames: u64 = 0;
    let mut passes: u64 = 0;
    let mut held: Vec<RecognitionResult> = Vec::new();
    let mut state = StreamState::Active;

    while state == StreamState::Active {
        state = tick(&mut camera, &mut display, frame_count, cadence, &mut analyze, &mut held, &mut frames, &mut passes);
        if state == StreamState::Active {
            frame_count += 1;
        }
    }

    let stop_reason = match state {
        StreamState::Stopped(reason) => reason,
        StreamState::Active => StopReason::Quit,
    };
    drop(camera);
    drop(display);
    info!("Streaming stopped after {} frames ({:?})", frames, stop_reason);
    StreamSummary { frames, passes, stop_reason }
}

#[allow(clippy::too_many_arguments)]
fn tick<S, V, A>(
    camera: &mut S,
    display: &mut V,
    frame_count: u64,
    cadence: u64,
    analyze: &mut A,
    held: &mut Vec<RecognitionResult>,
    frames: &mut u64,
    passes: &mut u64,
) -> StreamState
where
    S: FrameSource,
    V: Display,
    A: FnMut(&RgbImage) -> Result<Vec<RecognitionResult>, PipelineError>,
{
    let frame = match camera.read() {
        Ok(frame) => frame,
        Err(e) => {
            error!("{}", e);
            return StreamState::Stopped(StopReason::FrameReadFailure);
        }
    };
    *frames += 1;

    if frame_count % cadence == 0 {
        *passes += 1;
        match analyze(&frame) {
            Ok(results) => *held = results,
            Err(e) => {
                warn!("Recognition failed on frame {}: {}", frame_count, e);
                held.clear();
            }
        }
    }

    if let Err(e) = display.show(frame, held, frame_count) {
        warn!("Display closed: {:#}", e);
        return StreamState::Stopped(StopReason::DisplayClosed);
    }

    if display.quit_requested() {
        return StreamState::Stopped(StopReason::Quit);
    }
    StreamState::Active
}
