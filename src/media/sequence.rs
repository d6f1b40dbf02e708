//! Looping frame sequences (animated GIFs and image directories)

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{is_image_file, MediaSource};
use crate::error::{EngineError, EngineResult};

/// Pre-decoded frames played back one per tick, looping at the end
pub struct FrameSequence {
    frames: Vec<Arc<RgbImage>>,
    cursor: usize,
    size: (u32, u32),
}

impl FrameSequence {
    /// Build from decoded frames. All frames must share the first frame's size;
    /// mismatched frames are dropped.
    pub fn new(path: &Path, frames: Vec<RgbImage>) -> EngineResult<Self> {
        let size = frames
            .first()
            .map(|f| f.dimensions())
            .ok_or_else(|| EngineError::media(path, "sequence has no frames"))?;

        let total = frames.len();
        let frames: Vec<Arc<RgbImage>> = frames
            .into_iter()
            .filter(|f| f.dimensions() == size)
            .map(Arc::new)
            .collect();
        if frames.len() < total {
            warn!(
                "Dropped {} frame(s) of {:?} not matching {}x{}",
                total - frames.len(),
                path,
                size.0,
                size.1
            );
        }

        debug!("Loaded {} frame sequence from {:?}", frames.len(), path);
        Ok(Self {
            frames,
            cursor: 0,
            size,
        })
    }

    /// Every image file in `dir`, in lexical file name order
    pub fn from_directory(dir: &Path) -> EngineResult<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| EngineError::media(dir, format!("cannot read directory: {}", e)))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            match image::open(path) {
                Ok(img) => frames.push(img.to_rgb8()),
                Err(e) => warn!("Skipping unreadable frame {:?}: {}", path, e),
            }
        }

        Self::new(dir, frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl MediaSource for FrameSequence {
    fn current_frame(&mut self) -> Option<Arc<RgbImage>> {
        let frame = self.frames.get(self.cursor).cloned();
        // Loop back to the first frame at the end of the stream
        self.cursor = (self.cursor + 1) % self.frames.len().max(1);
        frame
    }

    fn native_size(&self) -> (u32, u32) {
        self.size
    }
}

/// Decode every frame of a GIF, fully composited
pub(super) fn decode_gif(path: &Path) -> EngineResult<Vec<RgbImage>> {
    let file = File::open(path).map_err(|e| EngineError::media(path, e.to_string()))?;
    let decoder = GifDecoder::new(BufReader::new(file))
        .map_err(|e| EngineError::media(path, format!("unreadable GIF: {}", e)))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| EngineError::media(path, format!("unreadable GIF frame: {}", e)))?;

    Ok(frames
        .into_iter()
        .map(|f| DynamicImage::ImageRgba8(f.into_buffer()).to_rgb8())
        .collect())
}
