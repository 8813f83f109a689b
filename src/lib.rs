pub mod adb;
pub mod args;
pub mod config;
pub mod error;
pub mod game_automation;
pub mod template_matching;

pub use adb::{AdbShell, Transport};
pub use error::{AutomationError, AutomationResult};
