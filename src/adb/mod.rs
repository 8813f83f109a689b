// ADB module - device bridge transport
// Drives the `adb` command-line tool: device management, input injection and
// raw screen capture, one bounded subprocess per call.

pub mod error;
pub mod shell;
pub mod types;

// Re-export the main types for easy access
pub use error::{AdbError, AdbResult};
pub use shell::{AdbShell, DEFAULT_NETWORK_PORT};
pub use types::{Device, DeviceInfo, Frame, Transport};
