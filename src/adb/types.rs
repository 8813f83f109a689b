// Core transport types and traits
use serde::Serialize;
use std::future::Future;
use std::time::Instant;

/// An attached endpoint as reported by `adb devices -l`, filtered to the
/// `device` (ready/online) state.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct Device {
    /// Serial or `ip:port`; this is what `-s` takes.
    pub name: String,
    pub model: Option<String>,
    pub transport_id: Option<String>,
}

/// A full-screen capture. Immutable once captured.
#[derive(Debug, Clone)]
pub struct Frame {
    bytes: Vec<u8>,
    captured_at: Instant,
    duration_ms: u128,
}

impl Frame {
    pub fn new(bytes: Vec<u8>, duration_ms: u128) -> Self {
        Self {
            bytes,
            captured_at: Instant::now(),
            duration_ms,
        }
    }

    /// Encoded image bytes (PNG from `screencap -p`).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// How long the capture command took.
    pub fn duration_ms(&self) -> u128 {
        self.duration_ms
    }

    pub fn decode(&self) -> Result<image::DynamicImage, image::ImageError> {
        image::load_from_memory(&self.bytes)
    }
}

/// Properties shown on the device info page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub model: Option<String>,
    pub brand: Option<String>,
    pub android_version: Option<String>,
    pub screen_size: Option<(u32, u32)>,
    pub battery_level: Option<u8>,
}

/// The capture/input surface the automation core drives.
///
/// Every method degrades to `false`/`None` on failure instead of returning an
/// error: scripts poll in tight loops and a single flaky call must not end a
/// run. The device is passed explicitly on every call.
pub trait Transport: Send + Sync {
    fn capture_frame(&self, device: &str) -> impl Future<Output = Option<Frame>> + Send;

    fn tap(&self, device: &str, x: u32, y: u32) -> impl Future<Output = bool> + Send;

    fn swipe(
        &self,
        device: &str,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u32,
    ) -> impl Future<Output = bool> + Send;
}
