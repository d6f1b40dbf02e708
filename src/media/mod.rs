//! Media sources feeding projection surfaces
//!
//! The compositor only sees the [`MediaSource`] contract: the newest frame (or
//! nothing, when the source is not ready) and the native pixel size. The
//! concrete backing (still image, looping frame sequence, looping video file,
//! live camera) is picked once, at load time, by a [`MediaLoader`].

mod camera;
mod sequence;
mod still;
mod video;

pub use camera::{bgr_to_rgb, yuyv_to_rgb, CameraSource};
pub use sequence::FrameSequence;
pub use still::StillImage;
pub use video::{VideoSource, VIDEO_EXTENSIONS};

use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

use crate::config::CameraConfig;
use crate::error::{EngineError, EngineResult};

/// Native size reported when a backend cannot determine one
pub const FALLBACK_NATIVE_SIZE: (u32, u32) = (1920, 1080);

/// File extensions decoded as still images or sequence frames
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// A source of RGB frames
pub trait MediaSource: Send {
    /// The frame to show this tick, or `None` when the source is not ready.
    /// Must never block.
    fn current_frame(&mut self) -> Option<Arc<RgbImage>>;

    /// Native frame dimensions `(width, height)`
    fn native_size(&self) -> (u32, u32);
}

/// Opens media by path
pub trait MediaLoader {
    fn open(&self, path: &Path) -> EngineResult<Box<dyn MediaSource>>;
}

/// Default loader: V4L2 devices, video files, frame directories, animated GIFs
/// and stills
#[derive(Debug, Clone, Default)]
pub struct FileMediaLoader {
    camera: CameraConfig,
}

impl FileMediaLoader {
    pub fn new(camera: CameraConfig) -> Self {
        Self { camera }
    }
}

impl MediaLoader for FileMediaLoader {
    fn open(&self, path: &Path) -> EngineResult<Box<dyn MediaSource>> {
        if is_capture_device(path) {
            let source = CameraSource::open(path, &self.camera)?;
            return Ok(Box::new(source));
        }

        if !path.exists() {
            return Err(EngineError::media(path, "no such file or directory"));
        }

        if path.is_dir() {
            return Ok(Box::new(FrameSequence::from_directory(path)?));
        }

        if is_video_file(path) {
            return Ok(Box::new(VideoSource::open(path)?));
        }

        if has_extension(path, "gif") {
            let mut frames = sequence::decode_gif(path)?;
            if frames.len() > 1 {
                return Ok(Box::new(FrameSequence::new(path, frames)?));
            }
            if let Some(frame) = frames.pop() {
                return Ok(Box::new(StillImage::from_frame(frame)));
            }
            return Err(EngineError::media(path, "GIF contains no frames"));
        }

        Ok(Box::new(StillImage::open(path)?))
    }
}

fn is_capture_device(path: &Path) -> bool {
    path.to_str()
        .map(|s| s.starts_with("/dev/video"))
        .unwrap_or(false)
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

pub(crate) fn is_image_file(path: &Path) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

pub(crate) fn is_video_file(path: &Path) -> bool {
    VIDEO_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}
