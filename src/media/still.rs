//! Single-frame media

use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::MediaSource;
use crate::error::{EngineError, EngineResult};

/// A decoded image that yields the same frame every tick
pub struct StillImage {
    frame: Arc<RgbImage>,
}

impl StillImage {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let img = image::open(path)
            .map_err(|e| {
                EngineError::media(path, format!("unsupported or unreadable image: {}", e))
            })?;
        let frame = img.to_rgb8();
        debug!("Decoded still {:?} ({}x{})", path, frame.width(), frame.height());
        Ok(Self::from_frame(frame))
    }

    pub fn from_frame(frame: RgbImage) -> Self {
        Self {
            frame: Arc::new(frame),
        }
    }
}

impl MediaSource for StillImage {
    fn current_frame(&mut self) -> Option<Arc<RgbImage>> {
        Some(Arc::clone(&self.frame))
    }

    fn native_size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}
