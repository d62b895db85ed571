//! Capturing rendered frames to image files.
//!
//! Captures are taken from the same target that was presented, so a
//! progressive capture contains the running average rather than one noisy
//! sample.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgba};
use thiserror::Error;
use tracing::info;

use crate::backend::Readback;

/// Which frames to capture and where to write them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConfig {
    pub enabled: bool,
    /// Output path pattern; `{}` is replaced by the frame number.
    pub output_pattern: String,
    /// Frame indices to capture.
    pub frames: BTreeSet<u64>,
    /// Also capture the first frame whose progressive sample count reaches this.
    pub at_samples: Option<u32>,
    /// Quit once every requested capture has been written.
    pub exit_after_capture: bool,
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, pattern: impl Into<String>) -> Self {
        self.enabled = true;
        self.output_pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.enabled = true;
        self.frames.extend(frames);
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.enabled = true;
        self.at_samples = Some(samples);
        self
    }

    #[must_use]
    pub fn with_exit_after(mut self, exit: bool) -> Self {
        self.exit_after_capture = exit;
        self
    }

    pub fn output_path(&self, frame: u64) -> PathBuf {
        PathBuf::from(self.output_pattern.replace("{}", &frame.to_string()))
    }

    /// Should the frame numbered `frame`, holding `samples` accumulated
    /// samples, be captured?
    pub fn should_capture(&self, frame: u64, samples: u32) -> bool {
        self.enabled
            && (self.frames.contains(&frame) || self.at_samples.is_some_and(|n| samples == n))
    }

    /// Every frame-indexed capture is behind us and no sample-count capture is
    /// pending.
    pub fn all_captured(&self, current_frame: u64, samples_captured: bool) -> bool {
        if !self.enabled {
            return false;
        }
        let frames_done = self.frames.last().map_or(true, |last| current_frame > *last);
        let samples_done = self.at_samples.is_none() || samples_captured;
        frames_done && samples_done
    }

    pub fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::parse_args(&args)
    }

    /// Recognized flags:
    /// - `-S`, `--screenshot`: enable capture
    /// - `-o`, `--output <PATTERN>`: output pattern (`{}` = frame number)
    /// - `-f`, `--frames <FRAMES>`: frame indices, e.g. `0,5,10-15`
    /// - `--at-samples <N>`: capture once a still image has `N` samples
    /// - `--exit-after`: quit after the last capture
    pub fn parse_args(args: &[String]) -> Self {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-S" | "--screenshot" => config.enabled = true,
                "-o" | "--output" => {
                    if let Some(pattern) = args.get(i + 1) {
                        config.output_pattern.clone_from(pattern);
                        i += 1;
                    }
                }
                "-f" | "--frames" => {
                    if let Some(frames) = args.get(i + 1) {
                        config.frames = parse_frame_indices(frames);
                        i += 1;
                    }
                }
                "--at-samples" => {
                    if let Some(n) = args.get(i + 1) {
                        config.at_samples = n.parse().ok();
                        config.enabled |= config.at_samples.is_some();
                        i += 1;
                    }
                }
                "--exit-after" => config.exit_after_capture = true,
                _ => {}
            }
            i += 1;
        }

        if config.enabled {
            if config.output_pattern.is_empty() {
                config.output_pattern = "lumenray_{}.png".to_string();
            }
            if config.frames.is_empty() && config.at_samples.is_none() {
                config.frames.insert(0);
            }
        }

        config
    }
}

/// Parse `"0,5,10-15,20"` into frame indices. Malformed parts are skipped.
pub fn parse_frame_indices(s: &str) -> BTreeSet<u64> {
    let mut frames = BTreeSet::new();
    for part in s.split(',').map(str::trim) {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<u64>(), end.trim().parse::<u64>()) {
                frames.extend(start..=end);
            }
        } else if let Ok(frame) = part.parse::<u64>() {
            frames.insert(frame);
        }
    }
    frames
}

/// Encode a linear channel value for an 8-bit sRGB image.
pub fn linear_to_srgb8(value: f32) -> u8 {
    let v = value.clamp(0.0, 1.0);
    let encoded = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round() as u8
}

impl Readback {
    /// Tight RGBA8 bytes, sRGB-encoded, alpha forced opaque.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| {
                [
                    linear_to_srgb8(p[0]),
                    linear_to_srgb8(p[1]),
                    linear_to_srgb8(p[2]),
                    u8::MAX,
                ]
            })
            .collect()
    }
}

/// Write a readback to `path`; the format follows the extension.
pub fn save_capture(capture: &Readback, path: impl AsRef<Path>) -> Result<(), ScreenshotError> {
    let path = path.as_ref();
    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(capture.width, capture.height, capture.to_rgba8())
        .ok_or(ScreenshotError::InvalidImageData {
            width: capture.width,
            height: capture.height,
            pixels: capture.pixels.len(),
        })?;
    image.save(path)?;
    info!("Screenshot saved: {}", path.display());
    Ok(())
}

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("no readback was available for frame {0}")]
    Missing(u64),
    #[error("{pixels} pixels do not fill a {width}x{height} image")]
    InvalidImageData { width: u32, height: u32, pixels: usize },
    #[error("failed to save screenshot: {0}")]
    SaveFailed(#[from] image::ImageError),
}
