//! Sensors module.
//!
//! A [`FrameFeed`] holds the latest JPEG frame of the camera. The live stream and the
//! frame sampler both read from it, only the capture thread writes.
//!
use std::{io::Cursor, path::Path, time::Duration};

use anyhow::{Context, Result};
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, ImageFormat, RgbImage};
use tokio::sync::watch;

use crate::meter::METER;

/// Camera used when no better candidate is found.
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

const VIDEO4LINUX_CLASS: &str = "/sys/class/video4linux";

/// Device name fragments of cameras facing away from the user.
const ENVIRONMENT_FACING_HINTS: [&str; 4] = ["back", "rear", "environment", "world"];

const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(200);

const JPEG_QUALITY: u8 = 90;

/// Capture function returning one JPEG frame per call.
pub type CaptureFn = Box<dyn Fn() -> Option<Bytes> + Send>;

/// Read access to the current video frame.
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Result<RgbImage>;
}

/// Latest frame of a video source.
#[derive(Clone)]
pub struct FrameFeed {
    rx: watch::Receiver<Option<Bytes>>,
}

impl FrameFeed {
    /// Run `capture_fn` on a dedicated thread and publish every frame.
    ///
    /// The thread stops on the first frame captured after every handle of the feed is dropped.
    pub fn spawn_capture(capture_fn: CaptureFn) -> Result<Self> {
        let (tx, rx) = watch::channel(None);

        std::thread::Builder::new()
            .name("camera-feed".into())
            .spawn(move || {
                loop {
                    match capture_fn() {
                        Some(frame) => {
                            METER.tick_captured();
                            if tx.send(Some(frame)).is_err() {
                                break;
                            }
                        }
                        None => {
                            log::error!("Error capturing frame");
                            std::thread::sleep(CAPTURE_RETRY_DELAY);
                        }
                    }
                }
                log::info!("Camera feed closed");
            })?;

        Ok(Self { rx })
    }

    /// Feed showing a single image.
    pub fn from_image(image: &RgbImage) -> Result<Self> {
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode(
            image,
            image.width(),
            image.height(),
            image::ColorType::Rgb8,
        )?;

        let (_tx, rx) = watch::channel(Some(Bytes::from(buf.into_inner())));
        Ok(Self { rx })
    }

    /// Feed showing a single image file.
    pub fn from_still(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to read image {}", path.display()))?
            .to_rgb8();
        log::info!("Using still image {}", path.display());

        Self::from_image(&image)
    }

    /// Latest JPEG frame, if any was captured yet.
    pub fn latest(&self) -> Option<Bytes> {
        self.rx.borrow().clone()
    }

    /// Receiver notified on every new frame.
    pub fn subscribe(&self) -> watch::Receiver<Option<Bytes>> {
        self.rx.clone()
    }
}

impl FrameSource for FrameFeed {
    fn current_frame(&self) -> Result<RgbImage> {
        let jpeg = self.latest().context("no camera frame captured yet")?;
        let frame = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .context("failed to decode camera frame")?
            .to_rgb8();

        Ok(frame)
    }
}

/// Pick a camera device, preferring one facing the environment.
pub fn find_preferred_device() -> String {
    let mut devices: Vec<(String, String)> = match std::fs::read_dir(VIDEO4LINUX_CLASS) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let node = entry.file_name().to_string_lossy().into_owned();
                let name = std::fs::read_to_string(entry.path().join("name")).unwrap_or_default();
                (format!("/dev/{node}"), name.trim().to_owned())
            })
            .collect(),
        Err(e) => {
            log::debug!("Could not list video devices: {e}");
            Vec::new()
        }
    };
    devices.sort();
    log::debug!("Found video devices: {:?}", &devices);

    pick_device(&devices).unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.into())
}

/// Choose among `(device path, device name)` pairs.
fn pick_device(devices: &[(String, String)]) -> Option<String> {
    devices
        .iter()
        .find(|(_, name)| {
            let name = name.to_ascii_lowercase();
            ENVIRONMENT_FACING_HINTS
                .iter()
                .any(|hint| name.contains(hint))
        })
        .or_else(|| devices.first())
        .map(|(path, _)| path.clone())
}

#[cfg(feature = "camera")]
pub use camera::get_capture_fn_linux;

#[cfg(feature = "camera")]
mod camera {
    use anyhow::{anyhow, Result};
    use bytes::Bytes;
    use rscam::{Camera, Config};

    use super::CaptureFn;

    /// Get a capture function to a video device on a Linux machine.
    pub fn get_capture_fn_linux(
        device_name: &str,
        resolution: Option<(u32, u32)>,
        frame_rate: Option<(u32, u32)>,
    ) -> Result<CaptureFn> {
        let format = "MJPG";
        let mut cam = Camera::new(device_name)?;
        log_supported_formats(&cam, format);
        let format = format.as_bytes();

        log::info!("Using camera {}", device_name);

        let resolution = resolution
            .map(Ok)
            .unwrap_or_else(|| get_max_resolution(&cam, format))?;

        let frame_rate = frame_rate
            .map(Ok)
            .unwrap_or_else(|| get_max_frame_rate(&cam, format, resolution))?;

        cam.start(&Config {
            interval: frame_rate,
            resolution,
            format,
            ..Default::default()
        })?;

        let callback = move || {
            cam.capture()
                .ok()
                .map(|frame| Bytes::copy_from_slice(&frame[..]))
        };
        Ok(Box::new(callback))
    }

    /// Get the maximum supported resolution for the given format.
    fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
        let resolution_info = cam.resolutions(format)?;
        log::debug!("Found resolutions: {:?}", &resolution_info);
        match resolution_info {
            rscam::ResolutionInfo::Discretes(resolutions) => resolutions
                .iter()
                // Highest resolution in terms of number of pixels
                .max_by_key(|res| res.0 * res.1)
                .copied(),
            rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
        }
        .ok_or_else(|| anyhow!("No resolution found"))
    }

    /// Get the maximum supported frame rate for the given format and resolution.
    fn get_max_frame_rate(
        cam: &Camera,
        format: &[u8],
        resolution: (u32, u32),
    ) -> Result<(u32, u32)> {
        let interval_info = cam.intervals(format, resolution)?;
        log::debug!("Found frame rates: {:?}", &interval_info);
        match interval_info {
            // Intervals are (numerator, denominator) seconds per frame
            rscam::IntervalInfo::Discretes(intervals) => intervals
                .iter()
                .max_by_key(|(numerator, denominator)| denominator / numerator.max(&1))
                .copied(),
            rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
        }
        .ok_or_else(|| anyhow!("No frame rate found"))
    }

    fn log_supported_formats(cam: &Camera, format: &str) {
        let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
        log::debug!(
            "Supported formats: {:?}, using format {:?}",
            formats,
            format
        );
    }
}

#[cfg(test)]
mod test {

    use std::time::Instant;

    use image::Rgb;

    use super::*;

    fn device(path: &str, name: &str) -> (String, String) {
        (path.into(), name.into())
    }

    #[test]
    fn test_prefers_environment_facing_camera() {
        let devices = vec![
            device("/dev/video0", "Integrated Camera: Front"),
            device("/dev/video2", "USB Rear Camera"),
        ];
        assert_eq!(pick_device(&devices).as_deref(), Some("/dev/video2"));
    }

    #[test]
    fn test_falls_back_to_first_camera() {
        let devices = vec![
            device("/dev/video0", "Integrated Camera"),
            device("/dev/video1", "Integrated Camera"),
        ];
        assert_eq!(pick_device(&devices).as_deref(), Some("/dev/video0"));
        assert_eq!(pick_device(&[]), None);
    }

    #[test]
    fn test_image_feed_decodes_frame() -> Result<()> {
        let feed = FrameFeed::from_image(&RgbImage::from_pixel(64, 48, Rgb([10, 200, 30])))?;
        let frame = feed.current_frame()?;
        assert_eq!(frame.dimensions(), (64, 48));

        Ok(())
    }

    #[test]
    fn test_missing_still_image() {
        assert!(FrameFeed::from_still("does/not/exist.jpg").is_err());
    }

    #[test]
    fn test_capture_thread_publishes_frames() -> Result<()> {
        let jpeg = FrameFeed::from_image(&RgbImage::new(32, 32))?
            .latest()
            .context("no frame")?;
        let capture_fn: CaptureFn = Box::new(move || {
            std::thread::sleep(Duration::from_millis(5));
            Some(jpeg.clone())
        });

        let feed = FrameFeed::spawn_capture(capture_fn)?;
        let start = Instant::now();
        while feed.latest().is_none() && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(feed.current_frame()?.dimensions(), (32, 32));

        Ok(())
    }

    #[test]
    fn test_failing_capture_has_no_frame() -> Result<()> {
        let feed = FrameFeed::spawn_capture(Box::new(|| None))?;
        assert!(feed.current_frame().is_err());

        Ok(())
    }
}
