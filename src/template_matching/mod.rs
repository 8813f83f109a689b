/// Template matching for locating UI elements in screen captures
///
/// Two modes are offered:
/// - Full-screen: multi-scale search over the whole frame, reporting where
///   the template was found
/// - Region: compare an already cropped area against a template after
///   binarization, reporting only the decision and score
pub mod config;
pub mod correlation;
pub mod matcher;
pub mod region;
pub mod types;


pub use config::{DEFAULT_SCALE_FACTORS, MatchConfig, create_ui_config};
pub use matcher::TemplateMatcher;
pub use region::match_region;
pub use types::{BoundingBox, MatchResult, Template};
