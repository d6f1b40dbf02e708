// Frame output for composed canvases
//
// Presentation proper (a window, a projector surface) lives outside the
// engine. The sink here stands in for it: every Nth composed frame is written
// as a numbered PNG, and failed writes are counted as dropped frames instead
// of stopping the render loop.

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::OutputConfig;

/// Minimum spacing between dropped-frame warnings
const DROP_WARN_INTERVAL: Duration = Duration::from_secs(5);

pub struct FrameSink {
    directory: Option<PathBuf>,
    every: u64,
    frame_count: u64,
    written_count: u64,
    dropped_count: u64,
    /// Track when we last logged a warning about dropped frames
    last_drop_warn: Option<Instant>,
}

impl FrameSink {
    pub fn new(config: &OutputConfig) -> Self {
        if let Some(dir) = &config.directory {
            info!("Writing every {} frame(s) to {:?}", config.every.max(1), dir);
        } else {
            debug!("No output directory configured; frames are counted only");
        }

        Self {
            directory: config.directory.clone(),
            every: config.every.max(1),
            frame_count: 0,
            written_count: 0,
            dropped_count: 0,
            last_drop_warn: None,
        }
    }

    /// Hand one composed frame to the sink
    pub fn present(&mut self, frame: &RgbImage) {
        let index = self.frame_count;
        self.frame_count += 1;
        if index % self.every != 0 {
            return;
        }
        let Some(dir) = self.directory.clone() else {
            return;
        };

        match write_frame(&dir, index, frame) {
            Ok(path) => {
                self.written_count += 1;
                debug!("Wrote {:?}", path);
            }
            Err(e) => {
                self.dropped_count += 1;
                let should_warn = self
                    .last_drop_warn
                    .map(|t| t.elapsed() >= DROP_WARN_INTERVAL)
                    .unwrap_or(true);
                if should_warn {
                    warn!("Dropped frame {} ({} total): {}", index, self.dropped_count, e);
                    self.last_drop_warn = Some(Instant::now());
                }
            }
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn written_count(&self) -> u64 {
        self.written_count
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }
}

fn write_frame(dir: &Path, index: u64, frame: &RgbImage) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("frame_{:06}.png", index));
    frame.save(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_counts_without_directory() {
        let mut sink = FrameSink::new(&OutputConfig::default());
        let frame = RgbImage::new(4, 4);
        for _ in 0..3 {
            sink.present(&frame);
        }
        assert_eq!(sink.frame_count(), 3);
        assert_eq!(sink.written_count(), 0);
        assert_eq!(sink.dropped_count(), 0);
    }

    #[test]
    fn test_writes_every_nth_frame() {
        let dir = std::env::temp_dir().join(format!("quadmap_sink_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut sink = FrameSink::new(&OutputConfig {
            directory: Some(dir.clone()),
            every: 2,
        });

        let frame = RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]));
        for _ in 0..5 {
            sink.present(&frame);
        }
        assert_eq!(sink.written_count(), 3);
        assert!(dir.join("frame_000000.png").exists());
        assert!(dir.join("frame_000004.png").exists());
        assert!(!dir.join("frame_000001.png").exists());

        let back = image::open(dir.join("frame_000002.png")).unwrap().to_rgb8();
        assert_eq!(back.get_pixel(2, 1), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_unwritable_directory_drops() {
        // A regular file where the directory should be
        let blocker = std::env::temp_dir()
            .join(format!("quadmap_sink_blocker_{}", std::process::id()));
        std::fs::write(&blocker, b"x").unwrap();
        let mut sink = FrameSink::new(&OutputConfig {
            directory: Some(blocker.clone()),
            every: 1,
        });
        sink.present(&RgbImage::new(2, 2));
        sink.present(&RgbImage::new(2, 2));
        assert_eq!(sink.dropped_count(), 2);
        let _ = std::fs::remove_file(&blocker);
    }
}
