// Recording transport used by the automation tests
use crate::adb::{Frame, Transport};
use crate::config::AppConfig;
use crate::game_automation::{CancelToken, Session};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swipe {
    pub from: (u32, u32),
    pub to: (u32, u32),
    pub duration_ms: u32,
}

/// Serves frames from a queue (the last one repeats) and records input.
#[derive(Debug, Default)]
pub struct FakeTransport {
    frames: Mutex<Vec<Option<Vec<u8>>>>,
    pub captures: AtomicUsize,
    pub taps: Mutex<Vec<(u32, u32)>>,
    pub swipes: Mutex<Vec<Swipe>>,
}

impl FakeTransport {
    /// Every capture fails.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Every capture returns `png`.
    pub fn showing(png: Vec<u8>) -> Self {
        Self::with_frames(vec![Some(png)])
    }

    pub fn with_frames(frames: Vec<Option<Vec<u8>>>) -> Self {
        Self {
            frames: Mutex::new(frames),
            ..Self::default()
        }
    }

    pub fn taps(&self) -> Vec<(u32, u32)> {
        self.taps.lock().unwrap().clone()
    }

    pub fn swipes(&self) -> Vec<Swipe> {
        self.swipes.lock().unwrap().clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    async fn capture_frame(&self, _device: &str) -> Option<Frame> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let mut frames = self.frames.lock().unwrap();
        let next = if frames.len() > 1 {
            frames.remove(0)
        } else {
            frames.first().cloned().flatten()
        };
        next.map(|bytes| Frame::new(bytes, 0))
    }

    async fn tap(&self, _device: &str, x: u32, y: u32) -> bool {
        self.taps.lock().unwrap().push((x, y));
        true
    }

    async fn swipe(&self, _device: &str, from: (u32, u32), to: (u32, u32), duration_ms: u32) -> bool {
        self.swipes.lock().unwrap().push(Swipe {
            from,
            to,
            duration_ms,
        });
        true
    }
}

/// Session on a fake device with the given configuration tweaks applied.
pub fn session_with(
    transport: FakeTransport,
    tweak: impl FnOnce(&mut AppConfig),
) -> (Arc<FakeTransport>, Session<FakeTransport>) {
    let mut config = AppConfig::default();
    tweak(&mut config);
    let transport = Arc::new(transport);
    let session = Session::new(
        Arc::clone(&transport),
        "emulator-5554",
        CancelToken::new(),
        Arc::new(config),
    );
    (transport, session)
}

/// Fast session: no settle or pre/post delays, short poll.
pub fn quick_session(transport: FakeTransport) -> (Arc<FakeTransport>, Session<FakeTransport>) {
    session_with(transport, |c| {
        c.actions.settle_ms = 0;
        c.actions.pre_delay_min_ms = 0;
        c.actions.pre_delay_max_ms = 0;
        c.actions.post_delay_ms = 0;
        c.wait.poll_interval_ms = 100;
    })
}

/// Textured grayscale PNG of the given size, with a `w`x`h` patch of a
/// second texture at `(x, y)` when `patch` is set.
pub fn screen_png(width: u32, height: u32, patch: Option<(u32, u32)>) -> Vec<u8> {
    let mut screen = image::GrayImage::from_fn(width, height, |x, y| {
        image::Luma([90 + ((x + 2 * y) % 17) as u8])
    });
    if let Some((x, y)) = patch {
        image::imageops::replace(&mut screen, &button(), x as i64, y as i64);
    }
    encode(&screen)
}

/// Blocky pseudo-random texture; different seeds do not correlate.
pub fn texture(width: u32, height: u32, seed: u32) -> image::GrayImage {
    image::GrayImage::from_fn(width, height, |x, y| {
        let v = (x / 4)
            .wrapping_mul(374761393)
            .wrapping_add((y / 4).wrapping_mul(668265263))
            .wrapping_add(seed)
            .wrapping_mul(1274126177);
        image::Luma([40 + ((v >> 24) as u8) % 180])
    })
}

/// 40x30 texture standing in for a UI button.
pub fn button() -> image::GrayImage {
    texture(40, 30, 0)
}

pub fn encode(image: &image::GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Writes [`button`] to `dir/name.png`.
pub fn button_template(dir: &std::path::Path, name: &str) -> crate::template_matching::Template {
    let path = dir.join(format!("{name}.png"));
    button().save(&path).unwrap();
    crate::template_matching::Template::new(path)
}

/// Executable shell script that writes `title|message` to `marker`.
#[cfg(unix)]
pub fn recording_script(dir: &std::path::Path, marker: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("notify.sh");
    let body = format!("#!/bin/sh\nprintf '%s|%s\\n' \"$1\" \"$2\" > '{}'\n", marker.display());
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
