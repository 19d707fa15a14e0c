use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;
use tracing::{debug, info};

use crate::pipeline::stream::FrameSource;
use crate::pipeline::PipelineError;
use crate::utils::config::Config;

/// Live camera read through an `ffmpeg` child process that emits raw RGB24
/// frames of a fixed size on stdout.
pub struct FfmpegCamera {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl FfmpegCamera {
    pub fn open(config: &Config) -> Result<Self, PipelineError> {
        let ffmpeg = which::which("ffmpeg")
            .map_err(|_| PipelineError::CameraUnavailable("ffmpeg not found in PATH".into()))?;
        let (width, height) = (config.frame_width, config.frame_height);

        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        args.extend(capture_input_args(config.camera_index, width, height)?);
        args.extend([
            "-vf".into(),
            format!("scale={}:{}", width, height),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-f".into(),
            "rawvideo".into(),
            "-".into(),
        ]);
        debug!("Starting camera: {:?} {:?}", ffmpeg, args);

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| PipelineError::CameraUnavailable(format!("failed to start ffmpeg: {}", e)))?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PipelineError::CameraUnavailable("ffmpeg stdout not captured".into()));
        };
        info!("Camera {} opened at {}x{}", config.camera_index, width, height);
        Ok(Self { child, stdout, width, height })
    }
}

fn capture_input_args(index: u32, width: u32, height: u32) -> Result<Vec<String>, PipelineError> {
    let size = format!("{}x{}", width, height);
    if cfg!(target_os = "linux") {
        let device = PathBuf::from(format!("/dev/video{}", index));
        if !device.exists() {
            return Err(PipelineError::CameraUnavailable(format!("{:?} does not exist", device)));
        }
        Ok(vec![
            "-f".into(),
            "v4l2".into(),
            "-video_size".into(),
            size,
            "-i".into(),
            device.to_string_lossy().into_owned(),
        ])
    } else if cfg!(target_os = "macos") {
        Ok(vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            "30".into(),
            "-video_size".into(),
            size,
            "-i".into(),
            format!("{}:none", index),
        ])
    } else {
        Err(PipelineError::CameraUnavailable(format!(
            "no capture backend for {}",
            std::env::consts::OS
        )))
    }
}

impl FrameSource for FfmpegCamera {
    fn read(&mut self) -> Result<RgbImage, PipelineError> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        self.stdout
            .read_exact(&mut buf)
            .map_err(|e| PipelineError::FrameReadFailure(e.to_string()))?;
        RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| PipelineError::FrameReadFailure("short frame buffer".into()))
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("Camera released");
    }
}
