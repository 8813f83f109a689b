//! Configuration for image matching operations

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Confidence threshold for template matching (0.0 to 1.0)
    pub threshold: f32,
    /// Template scale factors, tried in order
    pub scale_factors: Vec<f32>,
    /// Stop trying further scales once a correlation reaches this value
    pub early_exit: f32,
    /// Scaled templates with a side shorter than this are skipped
    pub min_template_side: u32,
    /// Width of the reduced frame each scale is searched on; the best hit is
    /// then refined at full resolution. `None` searches at full resolution.
    pub max_search_width: Option<u32>,
    /// Region-mode inputs with a pixel standard deviation below this are
    /// treated as blank and never match
    pub region_std_threshold: f64,
}

/// Nine scales covering 0.4x..1.2x, nearest to 1.0 first so the early exit
/// usually fires before the extreme scales are tried.
pub const DEFAULT_SCALE_FACTORS: [f32; 9] = [1.0, 0.9, 1.1, 0.8, 1.2, 0.7, 0.6, 0.5, 0.4];

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            scale_factors: DEFAULT_SCALE_FACTORS.to_vec(),
            early_exit: 0.95,
            min_template_side: 8,
            max_search_width: Some(240),
            region_std_threshold: 15.0,
        }
    }
}

impl MatchConfig {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Configuration preset for UI elements captured on the same device, where
/// scale is known
pub fn create_ui_config() -> MatchConfig {
    MatchConfig {
        threshold: 0.9,
        scale_factors: vec![1.0],
        ..MatchConfig::default()
    }
}
