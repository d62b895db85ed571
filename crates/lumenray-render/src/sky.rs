//! Environment texture sampled by rays that leave the scene.

use std::path::Path;

use tracing::info;

use crate::error::Result;

/// Equirectangular RGBA image in linear float.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl SkyImage {
    /// Load any format `image` understands (HDR and EXR included).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)?.into_rgba32f();
        let (width, height) = img.dimensions();
        info!("Loaded sky {} ({width}x{height})", path.display());
        Ok(Self {
            width,
            height,
            pixels: img.pixels().map(|p| p.0).collect(),
        })
    }

    /// Load `path` if given, otherwise fall back to [`SkyImage::gradient`].
    pub fn load_or_gradient(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::gradient(256, 128)),
        }
    }

    /// Blue zenith fading to a pale horizon, with a dark ground below.
    pub fn gradient(width: u32, height: u32) -> Self {
        const ZENITH: [f32; 3] = [0.25, 0.45, 0.85];
        const HORIZON: [f32; 3] = [0.85, 0.9, 1.0];
        const GROUND: [f32; 3] = [0.2, 0.18, 0.16];

        let width = width.max(1);
        let height = height.max(2);
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            // +1 at the top row, -1 at the bottom row.
            let elevation = 1.0 - 2.0 * (y as f32 + 0.5) / height as f32;
            let colour = if elevation >= 0.0 {
                lerp(HORIZON, ZENITH, elevation.sqrt())
            } else {
                lerp(HORIZON, GROUND, (-elevation * 4.0).min(1.0))
            };
            let texel = [colour[0], colour[1], colour[2], 1.0];
            pixels.extend(std::iter::repeat(texel).take(width as usize));
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
}

fn lerp(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_is_complete_and_bright_overhead() {
        let sky = SkyImage::gradient(8, 4);
        assert_eq!(sky.pixels.len(), 32);
        assert_eq!(sky.as_bytes().len(), 32 * 16);
        let top = sky.pixels[0];
        let bottom = sky.pixels[31];
        assert!(top[2] > bottom[2]);
        assert!(sky.pixels.iter().all(|p| p[3] == 1.0));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(SkyImage::load("/nonexistent/sky.hdr").is_err());
    }
}
