use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::models::RecognitionResult;
use crate::pipeline::stream::Display;
use crate::pipeline::PipelineError;
use crate::utils::config::Config;

pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_STRIP_PX: u32 = 30;

/// What the overlay shows: identities with a frame counter, or bare
/// detections with a face count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayMode {
    #[default]
    Recognition,
    Detection,
}

/// Draws boxes, name strips and the HUD onto frames.
/// Text is skipped when no font could be loaded.
pub struct Annotator {
    font: Option<FontVec>,
    mode: OverlayMode,
}

impl Annotator {
    pub fn new(font_path: &Path) -> Self {
        let font = std::fs::read(font_path)
            .ok()
            .and_then(|bytes| FontVec::try_from_vec(bytes).ok());
        if font.is_none() {
            warn!("Font {:?} not available; labels will not be drawn", font_path);
        }
        Self { font, mode: OverlayMode::default() }
    }

    pub fn without_text() -> Self {
        Self { font: None, mode: OverlayMode::default() }
    }

    pub fn with_mode(mut self, mode: OverlayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn annotate(&self, frame: &mut RgbImage, results: &[RecognitionResult], frame_index: u64) {
        let (fw, fh) = frame.dimensions();
        for result in results {
            let Some((x, y, w, h)) = result.bbox.clamp_to(fw, fh) else {
                continue;
            };
            let color = match self.mode {
                OverlayMode::Detection => KNOWN_COLOR,
                OverlayMode::Recognition if result.identity.is_known() => KNOWN_COLOR,
                OverlayMode::Recognition => UNKNOWN_COLOR,
            };
            let (x, y) = (x as i32, y as i32);
            draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(w, h), color);
            if w > 2 && h > 2 {
                draw_hollow_rect_mut(frame, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), color);
            }
            if self.mode == OverlayMode::Detection {
                continue;
            }
            let strip_y = y + h as i32;
            draw_filled_rect_mut(frame, Rect::at(x, strip_y).of_size(w, LABEL_STRIP_PX), color);
            if let Some(font) = &self.font {
                draw_text_mut(frame, TEXT_COLOR, x + 6, strip_y + 5, PxScale::from(20.0), font, result.identity.label());
            }
        }
        if let Some(font) = &self.font {
            let hud = match self.mode {
                OverlayMode::Recognition => format!("Frame: {}", frame_index),
                OverlayMode::Detection => format!("Faces: {}", results.len()),
            };
            draw_text_mut(frame, KNOWN_COLOR, 10, 10, PxScale::from(24.0), font, &hud);
        }
    }
}

/// Cooperative quit flag, set when the user types `q` + Enter on the terminal.
#[derive(Clone, Default)]
pub struct QuitSignal(Arc<AtomicBool>);

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stdin() -> Self {
        let signal = Self::new();
        let flag = signal.clone();
        let spawned = std::thread::Builder::new()
            .name("quit-listener".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(l) if l.trim().eq_ignore_ascii_case("q") => {
                            flag.trigger();
                            break;
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Quit listener not started: {}", e);
        }
        signal
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Window output through an `ffplay` child fed raw RGB24 frames. Pressing
/// `q` in the window closes ffplay, which also counts as a quit request.
pub struct FfplayDisplay {
    child: Child,
    stdin: Option<ChildStdin>,
    annotator: Annotator,
    quit: QuitSignal,
    width: u32,
    height: u32,
}

impl FfplayDisplay {
    pub fn open(config: &Config, title: &str, annotator: Annotator, quit: QuitSignal) -> Result<Self, PipelineError> {
        let ffplay = which::which("ffplay")
            .map_err(|_| PipelineError::MissingResource("ffplay".into()))?;
        let (width, height) = (config.frame_width, config.frame_height);
        let size = format!("{}x{}", width, height);
        let mut child = Command::new(ffplay)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-window_title",
                title,
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgb24",
                "-video_size",
                size.as_str(),
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|_| PipelineError::MissingResource("ffplay".into()))?;
        let stdin = child.stdin.take();
        Ok(Self { child, stdin, annotator, quit, width, height })
    }
}

impl Display for FfplayDisplay {
    fn show(&mut self, frame: RgbImage, results: &[RecognitionResult], frame_index: u64) -> anyhow::Result<()> {
        let mut frame = frame;
        self.annotator.annotate(&mut frame, results, frame_index);
        if frame.dimensions() != (self.width, self.height) {
            frame = image::imageops::resize(&frame, self.width, self.height, image::imageops::FilterType::Triangle);
        }
        let stdin = self.stdin.as_mut().context("display pipe already closed")?;
        stdin.write_all(frame.as_raw()).context("ffplay pipe closed")?;
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        self.quit.is_set() || matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl Drop for FfplayDisplay {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("Display released");
    }
}

/// Window when one can be opened, otherwise (or when `config.headless`)
/// a log-only display.
pub fn open_display(config: &Config, title: &str, mode: OverlayMode, quit: QuitSignal) -> Box<dyn Display> {
    if !config.headless {
        let annotator = Annotator::new(&config.font_path).with_mode(mode);
        match FfplayDisplay::open(config, title, annotator, quit.clone()) {
            Ok(window) => return Box::new(window),
            Err(e) => warn!("{}; continuing headless", e),
        }
    }
    Box::new(HeadlessDisplay::new(quit).with_mode(mode))
}

/// No window: logs whenever the set of recognized faces changes.
pub struct HeadlessDisplay {
    quit: QuitSignal,
    mode: OverlayMode,
    last: Option<Vec<String>>,
}

impl HeadlessDisplay {
    pub fn new(quit: QuitSignal) -> Self {
        Self { quit, mode: OverlayMode::default(), last: None }
    }

    pub fn with_mode(mut self, mode: OverlayMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, _frame: RgbImage, results: &[RecognitionResult], frame_index: u64) -> anyhow::Result<()> {
        let labels: Vec<String> = results.iter().map(|r| r.identity.label().to_string()).collect();
        if self.last.as_ref() == Some(&labels) {
            return Ok(());
        }
        if self.mode == OverlayMode::Detection {
            info!("Frame {}: {} faces", frame_index, results.len());
        } else {
            for r in results {
                info!(
                    "Frame {}: {} at ({}, {}, {}, {}) distance={:.3}",
                    frame_index, r.identity, r.bbox.left, r.bbox.top, r.bbox.right, r.bbox.bottom, r.distance
                );
            }
            if results.is_empty() {
                info!("Frame {}: no faces", frame_index);
            }
        }
        self.last = Some(labels);
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        self.quit.is_set()
    }
}
