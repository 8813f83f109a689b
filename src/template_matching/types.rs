/// Template matching data types
use crate::error::{AutomationError, AutomationResult};
use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};

/// A reference image on disk. Loaded fresh on every match; nothing is cached
/// in process.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    /// Template label (file stem unless given explicitly)
    pub name: String,
    pub path: PathBuf,
}

impl Template {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self { name, path }
    }

    pub fn named(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An unreadable template is a configuration error, not a transient one.
    pub fn load(&self) -> AutomationResult<DynamicImage> {
        image::open(&self.path).map_err(|source| AutomationError::TemplateLoad {
            path: self.path.clone(),
            source,
        })
    }

    pub fn load_luma(&self) -> AutomationResult<GrayImage> {
        Ok(self.load()?.to_luma8())
    }
}

/// Screen rectangle with `x2`/`y2` one past the last pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    /// Corners may be given in any order.
    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn from_origin(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + width,
            y2: y + height,
        }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (u32, u32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    /// Clip to an image of the given size; `None` if nothing is left.
    pub fn clipped(&self, width: u32, height: u32) -> Option<Self> {
        let clipped = Self {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        };
        (clipped.width() > 0 && clipped.height() > 0).then_some(clipped)
    }
}

/// Outcome of comparing a template against a frame or region.
///
/// `bounding_box` is present only when the result comes from a located
/// search (full-screen mode); region mode reports just the decision and
/// score.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    pub is_match: bool,
    /// Similarity in [0, 1]
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
    /// Template scale at which the best correlation was found
    pub scale: Option<f32>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            is_match: false,
            confidence: 0.0,
            bounding_box: None,
            scale: None,
        }
    }

    pub fn scored(confidence: f32, threshold: f32) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            is_match: confidence >= threshold,
            confidence,
            bounding_box: None,
            scale: None,
        }
    }

    /// Midpoint of the bounding box.
    pub fn center(&self) -> Option<(u32, u32)> {
        self.bounding_box.map(|b| b.center())
    }
}

impl std::fmt::Display for MatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let confidence_pct = (self.confidence * 100.0) as u32;
        match (self.bounding_box, self.scale) {
            (Some(b), Some(scale)) => write!(
                f,
                "match={} {}% at [{},{},{},{}] scale={:.2}",
                self.is_match, confidence_pct, b.x1, b.y1, b.x2, b.y2, scale
            ),
            (Some(b), None) => write!(
                f,
                "match={} {}% at [{},{},{},{}]",
                self.is_match, confidence_pct, b.x1, b.y1, b.x2, b.y2
            ),
            _ => write!(f, "match={} {}%", self.is_match, confidence_pct),
        }
    }
}
