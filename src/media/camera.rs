//! Live capture from V4L2 devices
//!
//! A background thread owns the device, converts every captured frame to RGB
//! and publishes it through an [`ArcSwapOption`]. The render tick only ever
//! loads the newest published frame, so a slow camera can never stall it.
//!
//! Supported input formats: MJPEG (turbojpeg, with a jpeg-decoder fallback),
//! YUYV (integer BT.601 conversion), RGB3 and BGR3.

use arc_swap::ArcSwapOption;
use image::RgbImage;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::{MediaSource, FALLBACK_NATIVE_SIZE};
use crate::config::CameraConfig;
use crate::error::{EngineError, EngineResult};

/// Thread-local turbojpeg decompressor for hardware-accelerated MJPEG decoding
thread_local! {
    static JPEG_DECOMPRESSOR: std::cell::RefCell<Option<turbojpeg::Decompressor>> =
        std::cell::RefCell::new(turbojpeg::Decompressor::new().ok());
}

/// Supported pixel formats in order of preference
const PREFERRED_FORMATS: &[&[u8; 4]] = &[b"MJPG", b"YUYV", b"RGB3", b"BGR3"];

/// How long `open` waits for the capture thread to negotiate a format
const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single dequeue wait, so a stalled camera still sees `stop`
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq)]
enum InputFormat {
    Mjpeg,
    Yuyv,
    Rgb,
    Bgr,
}

impl InputFormat {
    fn from_fourcc(repr: &[u8; 4]) -> Self {
        match repr {
            b"MJPG" => InputFormat::Mjpeg,
            b"YUYV" => InputFormat::Yuyv,
            b"BGR3" => InputFormat::Bgr,
            _ => InputFormat::Rgb,
        }
    }
}

/// A V4L2 camera exposed as a media source
pub struct CameraSource {
    latest: Arc<ArcSwapOption<RgbImage>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    size: (u32, u32),
}

impl CameraSource {
    /// Open the device and start capturing. Returns once the format is
    /// negotiated; frames arrive asynchronously afterwards.
    pub fn open(device: &Path, config: &CameraConfig) -> EngineResult<Self> {
        let device_path = device.to_string_lossy().into_owned();
        let latest = Arc::new(ArcSwapOption::empty());
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let worker = {
            let latest = Arc::clone(&latest);
            let stop = Arc::clone(&stop);
            let config = config.clone();
            let device_path = device_path.clone();
            std::thread::Builder::new()
                .name(format!("capture {}", device_path))
                .spawn(move || capture_loop(&device_path, &config, latest, stop, ready_tx))
                .map_err(|e| {
                    EngineError::media(device, format!("cannot spawn capture thread: {}", e))
                })?
        };

        let size = match ready_rx.recv_timeout(NEGOTIATION_TIMEOUT) {
            Ok(Ok(size)) => size,
            Ok(Err(reason)) => {
                let _ = worker.join();
                return Err(EngineError::media(device, reason));
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                return Err(EngineError::media(device, "timed out negotiating capture format"));
            }
        };

        let size = if size.0 == 0 || size.1 == 0 {
            FALLBACK_NATIVE_SIZE
        } else {
            size
        };
        info!("Camera {} streaming at {}x{}", device_path, size.0, size.1);

        Ok(Self {
            latest,
            stop,
            worker: Some(worker),
            size,
        })
    }
}

impl MediaSource for CameraSource {
    fn current_frame(&mut self) -> Option<Arc<RgbImage>> {
        self.latest.load_full()
    }

    fn native_size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Capture thread body: negotiate, report the size, then publish frames
fn capture_loop(
    device_path: &str,
    config: &CameraConfig,
    latest: Arc<ArcSwapOption<RgbImage>>,
    stop: Arc<AtomicBool>,
    ready: mpsc::SyncSender<Result<(u32, u32), String>>,
) {
    let opened = open_stream(device_path, config);
    let (dev, format) = match opened {
        Ok(v) => v,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Create the capture stream with memory mapping
    let mut stream = match Stream::with_buffers(&dev, Type::VideoCapture, 4) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(format!("cannot create capture stream: {}", e)));
            return;
        }
    };

    stream.set_timeout(DEQUEUE_TIMEOUT);

    let width = format.width as usize;
    let height = format.height as usize;
    let input = InputFormat::from_fourcc(&format.fourcc.repr);
    let _ = ready.send(Ok((format.width, format.height)));

    let mut frame_count = 0u64;
    while !stop.load(Ordering::SeqCst) {
        let (buf, _meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) if is_idle_timeout(&e) => continue,
            Err(e) => {
                warn!("Capture on {} failed: {}", device_path, e);
                break;
            }
        };

        let mut rgb = vec![0u8; width * height * 3];
        let converted = match input {
            InputFormat::Mjpeg => decode_mjpeg(buf, &mut rgb, width, height).is_ok(),
            InputFormat::Yuyv => {
                yuyv_to_rgb(buf, &mut rgb, width, height);
                true
            }
            InputFormat::Bgr => {
                bgr_to_rgb(buf, &mut rgb);
                true
            }
            InputFormat::Rgb => {
                let copy_len = buf.len().min(rgb.len());
                rgb[..copy_len].copy_from_slice(&buf[..copy_len]);
                true
            }
        };

        if !converted {
            if frame_count % 100 == 0 {
                warn!("Failed to decode frame from {}", device_path);
            }
            frame_count += 1;
            continue;
        }

        if let Some(img) = RgbImage::from_raw(format.width, format.height, rgb) {
            latest.store(Some(Arc::new(img)));
        }
        frame_count += 1;
    }

    debug!("Capture thread for {} exiting after {} frames", device_path, frame_count);
}

/// A dequeue that timed out only means no frame arrived yet
fn is_idle_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn open_stream(device_path: &str, config: &CameraConfig) -> Result<(Device, v4l::Format), String> {
    let dev = Device::with_path(device_path)
        .map_err(|e| format!("cannot open device: {}", e))?;

    if let Ok(caps) = dev.query_caps() {
        info!("Camera: {} (driver: {})", caps.card, caps.driver);
    }

    let format = configure_capture_format(&dev, config.width, config.height)?;

    let mut params = dev.params().map_err(|e| format!("cannot read parameters: {}", e))?;
    params.interval = v4l::Fraction::new(1, config.fps.max(1));
    if let Err(e) = dev.set_params(&params) {
        warn!("Could not set frame rate to {} fps: {}", config.fps, e);
    }

    Ok((dev, format))
}

/// Configure the capture format, trying preferred formats in order
fn configure_capture_format(dev: &Device, width: u32, height: u32) -> Result<v4l::Format, String> {
    let formats = dev
        .enum_formats()
        .map_err(|e| format!("cannot enumerate formats: {}", e))?;

    for preferred in PREFERRED_FORMATS {
        let fourcc = FourCC::new(preferred);
        if !formats.iter().any(|f| f.fourcc == fourcc) {
            continue;
        }

        let mut format = dev
            .format()
            .map_err(|e| format!("cannot read current format: {}", e))?;
        format.width = width;
        format.height = height;
        format.fourcc = fourcc;

        match dev.set_format(&format) {
            Ok(actual) => {
                debug!(
                    "Negotiated {}x{} {:?}",
                    actual.width,
                    actual.height,
                    String::from_utf8_lossy(&actual.fourcc.repr)
                );
                return Ok(actual);
            }
            Err(e) => warn!(
                "Could not set format {:?} at {}x{}: {}",
                String::from_utf8_lossy(*preferred),
                width,
                height,
                e
            ),
        }
    }

    // Fall back to whatever the device gives us
    dev.format().map_err(|e| format!("cannot read device format: {}", e))
}

/// Decode MJPEG frame to RGB using turbojpeg (hardware-accelerated via libjpeg-turbo)
/// Falls back to software jpeg-decoder if turbojpeg fails
fn decode_mjpeg(
    mjpeg_data: &[u8],
    rgb_buffer: &mut [u8],
    width: usize,
    height: usize,
) -> Result<(), ()> {
    let expected_size = width * height * 3;

    let turbo_ok = JPEG_DECOMPRESSOR.with(|decomp| {
        let mut guard = decomp.borrow_mut();
        let Some(decompressor) = guard.as_mut() else {
            return false;
        };
        let Ok(header) = decompressor.read_header(mjpeg_data) else {
            return false;
        };
        if header.width * header.height * 3 != expected_size {
            return false;
        }

        let image = turbojpeg::Image {
            pixels: &mut rgb_buffer[..expected_size],
            width: header.width,
            pitch: header.width * 3,
            height: header.height,
            format: turbojpeg::PixelFormat::RGB,
        };
        decompressor.decompress(mjpeg_data, image).is_ok()
    });

    if turbo_ok {
        return Ok(());
    }

    decode_mjpeg_software(mjpeg_data, rgb_buffer, width, height)
}

/// Software fallback MJPEG decoder using jpeg-decoder crate
fn decode_mjpeg_software(
    mjpeg_data: &[u8],
    rgb_buffer: &mut [u8],
    width: usize,
    height: usize,
) -> Result<(), ()> {
    let mut decoder = jpeg_decoder::Decoder::new(std::io::Cursor::new(mjpeg_data));
    let pixels = decoder.decode().map_err(|_| ())?;
    let info = decoder.info().ok_or(())?;

    match info.pixel_format {
        jpeg_decoder::PixelFormat::L8 => {
            // Grayscale - expand to RGB
            for (gray, rgb) in pixels
                .iter()
                .take(width * height)
                .zip(rgb_buffer.chunks_exact_mut(3))
            {
                rgb.fill(*gray);
            }
        }
        _ => {
            let copy_len = pixels.len().min(rgb_buffer.len()).min(width * height * 3);
            rgb_buffer[..copy_len].copy_from_slice(&pixels[..copy_len]);
        }
    }

    Ok(())
}

/// Convert YUYV to RGB using fixed-point BT.601 (scaled by 256)
#[inline]
pub fn yuyv_to_rgb(yuyv: &[u8], rgb: &mut [u8], width: usize, height: usize) {
    let pixels = width * height;

    // 4 bytes YUYV -> 2 RGB pixels
    for (yuyv, rgb) in yuyv
        .chunks_exact(4)
        .zip(rgb.chunks_exact_mut(6))
        .take(pixels / 2)
    {
        let y0 = yuyv[0] as i32;
        let u = yuyv[1] as i32 - 128;
        let y1 = yuyv[2] as i32;
        let v = yuyv[3] as i32 - 128;

        let v_r = (359 * v) >> 8;
        let uv_g = (88 * u + 183 * v) >> 8;
        let u_b = (454 * u) >> 8;

        rgb[0] = (y0 + v_r).clamp(0, 255) as u8;
        rgb[1] = (y0 - uv_g).clamp(0, 255) as u8;
        rgb[2] = (y0 + u_b).clamp(0, 255) as u8;

        rgb[3] = (y1 + v_r).clamp(0, 255) as u8;
        rgb[4] = (y1 - uv_g).clamp(0, 255) as u8;
        rgb[5] = (y1 + u_b).clamp(0, 255) as u8;
    }
}

/// Convert BGR to RGB (swap R and B channels)
#[inline]
pub fn bgr_to_rgb(bgr: &[u8], rgb: &mut [u8]) {
    for (bgr_chunk, rgb_chunk) in bgr.chunks_exact(3).zip(rgb.chunks_exact_mut(3)) {
        rgb_chunk[0] = bgr_chunk[2];
        rgb_chunk[1] = bgr_chunk[1];
        rgb_chunk[2] = bgr_chunk[0];
    }
}
