//! Looping video files decoded by an `ffmpeg` subprocess
//!
//! `ffprobe` reports the stream size and rate when the file is opened. A
//! background thread then reads raw `rgb24` frames from `ffmpeg`'s stdout,
//! paces them at the stream rate and publishes the newest one through an
//! [`ArcSwapOption`]. At end of stream the decoder is restarted from the top.

use arc_swap::ArcSwapOption;
use image::RgbImage;
use serde::Deserialize;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::MediaSource;
use crate::error::{EngineError, EngineResult};

/// Container extensions handed to ffmpeg
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "mpg", "mpeg", "wmv",
];

/// Used when the stream reports no usable frame rate
const FALLBACK_FPS: f64 = 30.0;

/// Stream facts reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl VideoInfo {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }
}

/// A video file played in a loop
pub struct VideoSource {
    latest: Arc<ArcSwapOption<RgbImage>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    size: (u32, u32),
}

impl VideoSource {
    /// Probe the file and start decoding. Frames arrive asynchronously.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let info = probe(path)?;
        info!(
            "Video {:?}: {}x{} @ {:.2}fps",
            path, info.width, info.height, info.fps
        );

        let latest = Arc::new(ArcSwapOption::empty());
        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let latest = Arc::clone(&latest);
            let stop = Arc::clone(&stop);
            let video_path = path.to_path_buf();
            let video_info = info.clone();
            std::thread::Builder::new()
                .name(format!("video {}", path.display()))
                .spawn(move || decode_loop(&video_path, &video_info, latest, stop))
                .map_err(|e| EngineError::media(path, format!("cannot spawn decoder: {}", e)))?
        };

        Ok(Self {
            latest,
            stop,
            worker: Some(worker),
            size: (info.width, info.height),
        })
    }
}

impl MediaSource for VideoSource {
    fn current_frame(&mut self) -> Option<Arc<RgbImage>> {
        self.latest.load_full()
    }

    fn native_size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Ask ffprobe for the first video stream's size and frame rate
fn probe(path: &Path) -> EngineResult<VideoInfo> {
    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| EngineError::media(path, format!("failed to run ffprobe: {}", e)))?;
    if !out.status.success() {
        return Err(EngineError::media(
            path,
            format!("ffprobe failed: {}", String::from_utf8_lossy(&out.stderr).trim()),
        ));
    }
    parse_probe(&out.stdout).map_err(|reason| EngineError::media(path, reason))
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo, String> {
    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        avg_frame_rate: Option<String>,
        r_frame_rate: Option<String>,
    }
    #[derive(Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    let parsed: ProbeOut =
        serde_json::from_slice(json).map_err(|e| format!("ffprobe json parse failed: {}", e))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or("no video stream found")?;

    let width = stream.width.filter(|&w| w > 0).ok_or("missing video width")?;
    let height = stream.height.filter(|&h| h > 0).ok_or("missing video height")?;
    let fps = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .filter_map(|r| r.as_deref().and_then(parse_rate))
        .next()
        .unwrap_or(FALLBACK_FPS);

    Ok(VideoInfo { width, height, fps })
}

/// Parse an ffmpeg rational such as `30000/1001`
fn parse_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num = num.trim().parse::<f64>().ok()?;
    let den = den.trim().parse::<f64>().ok()?;
    let rate = num / den;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn spawn_decoder(path: &Path) -> io::Result<Child> {
    Command::new("ffmpeg")
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
}

/// Outcome of one pass through the file
enum Pass {
    /// Reached end of stream after this many frames
    Ended(u64),
    Stopped,
}

/// Decoder thread body: play the file, restart it at the end, until stopped
fn decode_loop(
    path: &Path,
    info: &VideoInfo,
    latest: Arc<ArcSwapOption<RgbImage>>,
    stop: Arc<AtomicBool>,
) {
    let mut loops = 0u64;
    while !stop.load(Ordering::SeqCst) {
        let mut child = match spawn_decoder(path) {
            Ok(child) => child,
            Err(e) => {
                warn!("Cannot start ffmpeg for {:?}: {}", path, e);
                return;
            }
        };

        let pass = match child.stdout.take() {
            Some(mut stdout) => play_pass(&mut stdout, info, &latest, &stop),
            None => Pass::Ended(0),
        };
        let _ = child.kill();
        let _ = child.wait();

        match pass {
            Pass::Stopped => break,
            Pass::Ended(0) => {
                warn!("ffmpeg produced no frames for {:?}; giving up", path);
                break;
            }
            Pass::Ended(frames) => {
                loops += 1;
                debug!("Video {:?} looped ({} frames, pass {})", path, frames, loops);
            }
        }
    }
}

/// Read frames until end of stream, publishing one per frame interval
fn play_pass<R: Read>(
    reader: &mut R,
    info: &VideoInfo,
    latest: &ArcSwapOption<RgbImage>,
    stop: &AtomicBool,
) -> Pass {
    let interval = info.frame_interval();
    let mut next_due = Instant::now();
    let mut frames = 0u64;

    loop {
        if stop.load(Ordering::SeqCst) {
            return Pass::Stopped;
        }

        let mut buf = vec![0u8; info.frame_len()];
        if reader.read_exact(&mut buf).is_err() {
            return Pass::Ended(frames);
        }

        let now = Instant::now();
        if next_due > now {
            std::thread::sleep(next_due - now);
        }
        next_due = next_due.max(now) + interval;

        if let Some(img) = RgbImage::from_raw(info.width, info.height, buf) {
            latest.store(Some(Arc::new(img)));
            frames += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn info(width: u32, height: u32) -> VideoInfo {
        VideoInfo {
            width,
            height,
            fps: 1000.0,
        }
    }

    #[test]
    fn test_parse_probe() {
        let json = br#"{
            "streams": [
                { "codec_type": "audio" },
                { "codec_type": "video", "width": 640, "height": 360,
                  "avg_frame_rate": "0/0", "r_frame_rate": "30000/1001" }
            ]
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!((info.width, info.height), (640, 360));
        assert!((info.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_without_video() {
        assert!(parse_probe(br#"{ "streams": [ { "codec_type": "audio" } ] }"#).is_err());
        let zero_width =
            br#"{ "streams": [ { "codec_type": "video", "width": 0, "height": 4 } ] }"#;
        assert!(parse_probe(zero_width).is_err());
        assert!(parse_probe(b"not json").is_err());
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("24"), None);
    }

    #[test]
    fn test_pass_publishes_frames_until_end() {
        // Two 2x1 frames followed by a truncated one
        let mut data = vec![10u8; 6];
        data.extend_from_slice(&[20u8; 6]);
        data.extend_from_slice(&[30u8; 4]);
        let latest = ArcSwapOption::empty();
        let stop = AtomicBool::new(false);

        let pass = play_pass(&mut data.as_slice(), &info(2, 1), &latest, &stop);
        assert!(matches!(pass, Pass::Ended(2)));
        let frame = latest.load_full().unwrap();
        assert_eq!(frame.get_pixel(1, 0), &Rgb([20, 20, 20]));
    }

    #[test]
    fn test_pass_honours_stop() {
        let data = vec![1u8; 60];
        let latest = ArcSwapOption::empty();
        let stop = AtomicBool::new(true);
        let pass = play_pass(&mut data.as_slice(), &info(2, 1), &latest, &stop);
        assert!(matches!(pass, Pass::Stopped));
        assert!(latest.load_full().is_none());
    }

    #[test]
    fn test_unreadable_video_fails() {
        let path = std::env::temp_dir().join(format!("quadmap_video_{}.mp4", std::process::id()));
        std::fs::write(&path, b"definitely not a video").unwrap();
        let err = VideoSource::open(&path).err().unwrap();
        assert!(matches!(err, EngineError::MediaLoadFailed { .. }));
        let _ = std::fs::remove_file(&path);
    }
}
