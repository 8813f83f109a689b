use super::error::{AdbError, AdbResult};
use super::types::{Device, DeviceInfo, Frame, Transport};
use crate::config::AdbConfig;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Temporary on-device path used by [`AdbShell::capture_to_file`].
const REMOTE_SCREENSHOT_PATH: &str = "/sdcard/screenshot_temp.png";

/// Port `adb tcpip` / `adb connect` use when none is given.
pub const DEFAULT_NETWORK_PORT: u16 = 5555;

/// Transport over the `adb` command-line bridge.
///
/// Every call spawns one subprocess bounded by a timeout; nothing is held
/// open between calls, so all operations are safe to repeat.
#[derive(Debug, Clone)]
pub struct AdbShell {
    program: String,
    command_timeout: Duration,
    long_timeout: Duration,
    capture_timeout: Duration,
}

impl AdbShell {
    pub fn new(config: &AdbConfig) -> Self {
        Self {
            program: config.resolve_program(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            long_timeout: Duration::from_secs(config.long_timeout_secs),
            capture_timeout: Duration::from_secs(config.capture_timeout_secs),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn describe(&self, device: Option<&str>, args: &[&str]) -> String {
        let mut parts = vec![self.program.as_str()];
        if let Some(d) = device {
            parts.push("-s");
            parts.push(d);
        }
        parts.extend_from_slice(args);
        parts.join(" ")
    }

    /// Run `<adb> [-s device] args...` and return its output if it exited
    /// successfully within `timeout`.
    async fn run(&self, device: Option<&str>, args: &[&str], timeout: Duration) -> AdbResult<Output> {
        let command = self.describe(device, args);
        log::debug!("adb: {}", command);

        let mut cmd = Command::new(&self.program);
        if let Some(d) = device {
            cmd.arg("-s").arg(d);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => {
                return Err(AdbError::Timeout {
                    command,
                    duration: timeout,
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AdbError::NotInstalled {
                    program: self.program.clone(),
                });
            }
            Ok(Err(source)) => return Err(AdbError::SpawnFailed { command, source }),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(AdbError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    async fn run_text(&self, device: Option<&str>, args: &[&str], timeout: Duration) -> AdbResult<String> {
        let output = self.run(device, args, timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Collapse a result to a boolean, logging the failure.
    fn succeeded<T>(what: &str, result: AdbResult<T>) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                log::warn!("{} failed: {}", what, e);
                false
            }
        }
    }

    pub async fn check_installed(&self) -> bool {
        Self::succeeded("adb version", self.run(None, &["version"], self.command_timeout).await)
    }

    /// Verify the bridge is installed and its server is up. A failure here is
    /// a configuration problem, so it is returned rather than absorbed.
    pub async fn ensure_ready(&self) -> AdbResult<()> {
        self.run(None, &["version"], self.command_timeout).await?;
        self.run(None, &["start-server"], self.long_timeout).await?;
        Ok(())
    }

    pub async fn start_server(&self) -> bool {
        Self::succeeded("adb start-server", self.run(None, &["start-server"], self.long_timeout).await)
    }

    pub async fn kill_server(&self) -> bool {
        Self::succeeded("adb kill-server", self.run(None, &["kill-server"], self.long_timeout).await)
    }

    pub fn parse_devices(output: &str) -> Vec<Device> {
        output
            .lines()
            .skip(1)
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 2 && parts[1] == "device" {
                    let field = |key: &str| {
                        parts[2..]
                            .iter()
                            .find_map(|part| part.strip_prefix(key).map(str::to_string))
                    };
                    Some(Device {
                        name: parts[0].to_string(),
                        model: field("model:"),
                        transport_id: field("transport_id:"),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Devices in the ready state, in the order adb reports them. Empty on
    /// timeout or non-zero exit.
    pub async fn list_devices(&self) -> Vec<Device> {
        match self.run_text(None, &["devices", "-l"], self.command_timeout).await {
            Ok(stdout) => Self::parse_devices(&stdout),
            Err(e) => {
                log::warn!("adb devices failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn is_device_connected(&self, device: &str) -> bool {
        self.list_devices().await.iter().any(|d| d.name == device)
    }

    /// `ip` may already carry a port, otherwise `port` (default 5555) is used.
    pub fn network_target(ip: &str, port: Option<u16>) -> String {
        if ip.contains(':') {
            ip.to_string()
        } else {
            format!("{}:{}", ip, port.unwrap_or(DEFAULT_NETWORK_PORT))
        }
    }

    /// `adb connect` exits 0 even when the connection is refused, so the
    /// message is inspected as well.
    fn connect_output_ok(stdout: &str) -> bool {
        let lower = stdout.to_lowercase();
        (lower.contains("connected to") || lower.contains("already connected"))
            && !lower.contains("failed")
            && !lower.contains("unable")
            && !lower.contains("refused")
    }

    pub async fn connect(&self, ip: &str, port: Option<u16>) -> bool {
        let target = Self::network_target(ip, port);
        match self.run_text(None, &["connect", &target], self.long_timeout).await {
            Ok(stdout) if Self::connect_output_ok(&stdout) => {
                log::info!("Connected to {}", target);
                true
            }
            Ok(stdout) => {
                log::warn!("adb connect {} refused: {}", target, stdout.trim());
                false
            }
            Err(e) => {
                log::warn!("adb connect {} failed: {}", target, e);
                false
            }
        }
    }

    pub async fn disconnect(&self, ip: &str, port: Option<u16>) -> bool {
        let target = Self::network_target(ip, port);
        Self::succeeded(
            "adb disconnect",
            self.run(None, &["disconnect", &target], self.long_timeout).await,
        )
    }

    /// Restart adbd on `device` listening on `port` so it can be reached with
    /// [`connect`](Self::connect).
    pub async fn enable_network_mode(&self, device: &str, port: Option<u16>) -> bool {
        let port = port.unwrap_or(DEFAULT_NETWORK_PORT).to_string();
        Self::succeeded(
            "adb tcpip",
            self.run(Some(device), &["tcpip", &port], self.long_timeout).await,
        )
    }

    pub async fn getprop(&self, device: &str, key: &str) -> Option<String> {
        match self
            .run_text(Some(device), &["shell", "getprop", key], self.command_timeout)
            .await
        {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                log::warn!("getprop {} failed: {}", key, e);
                None
            }
        }
    }

    /// Parse `wm size`, preferring an override size over the physical one.
    pub fn parse_screen_size(stdout: &str) -> AdbResult<(u32, u32)> {
        let parse = |prefix: &str| {
            stdout.lines().find_map(|line| {
                let size_str = line.trim().strip_prefix(prefix)?;
                let (x, y) = size_str.trim().split_once('x')?;
                Some((x.trim().parse::<u32>().ok()?, y.trim().parse::<u32>().ok()?))
            })
        };
        parse("Override size:")
            .or_else(|| parse("Physical size:"))
            .ok_or_else(|| AdbError::ParseFailed {
                what: "screen size",
                output: stdout.trim().to_string(),
            })
    }

    pub async fn screen_size(&self, device: &str) -> Option<(u32, u32)> {
        let result = match self
            .run_text(Some(device), &["shell", "wm", "size"], self.command_timeout)
            .await
        {
            Ok(stdout) => Self::parse_screen_size(&stdout),
            Err(e) => Err(e),
        };
        result
            .map_err(|e| log::warn!("wm size failed: {}", e))
            .ok()
    }

    pub fn parse_battery_level(stdout: &str) -> Option<u8> {
        stdout.lines().find_map(|line| {
            let value = line.trim().strip_prefix("level:")?;
            value.trim().parse::<u8>().ok()
        })
    }

    pub async fn device_info(&self, device: &str) -> DeviceInfo {
        let battery_level = match self
            .run_text(Some(device), &["shell", "dumpsys", "battery"], self.command_timeout)
            .await
        {
            Ok(stdout) => Self::parse_battery_level(&stdout),
            Err(e) => {
                log::warn!("dumpsys battery failed: {}", e);
                None
            }
        };
        DeviceInfo {
            name: device.to_string(),
            model: self.getprop(device, "ro.product.model").await,
            brand: self.getprop(device, "ro.product.brand").await,
            android_version: self.getprop(device, "ro.build.version.release").await,
            screen_size: self.screen_size(device).await,
            battery_level,
        }
    }

    async fn capture_bytes(&self, device: &str) -> AdbResult<Vec<u8>> {
        let args = ["exec-out", "screencap", "-p"];
        let output = self.run(Some(device), &args, self.capture_timeout).await?;
        if output.stdout.is_empty() {
            return Err(AdbError::EmptyOutput {
                command: self.describe(Some(device), &args),
            });
        }
        Ok(output.stdout)
    }

    /// Screenshot via a temporary file on the device, pulled to `local_path`.
    pub async fn capture_to_file(&self, device: &str, local_path: &str) -> bool {
        let result = async {
            self.run(
                Some(device),
                &["shell", "screencap", "-p", REMOTE_SCREENSHOT_PATH],
                self.long_timeout,
            )
            .await?;
            self.run(
                Some(device),
                &["pull", REMOTE_SCREENSHOT_PATH, local_path],
                self.long_timeout,
            )
            .await?;
            AdbResult::Ok(())
        }
        .await;
        // Best effort; a stale temp file is harmless.
        let _ = self
            .run(
                Some(device),
                &["shell", "rm", REMOTE_SCREENSHOT_PATH],
                self.command_timeout,
            )
            .await;
        Self::succeeded("screenshot to file", result)
    }
}

impl Transport for AdbShell {
    async fn capture_frame(&self, device: &str) -> Option<Frame> {
        let start = Instant::now();
        match self.capture_bytes(device).await {
            Ok(bytes) => {
                let frame = Frame::new(bytes, start.elapsed().as_millis());
                log::debug!(
                    "📸 Captured {} bytes from {} in {}ms",
                    frame.bytes().len(),
                    device,
                    frame.duration_ms()
                );
                Some(frame)
            }
            Err(e) => {
                log::warn!("Screen capture failed: {}", e);
                None
            }
        }
    }

    async fn tap(&self, device: &str, x: u32, y: u32) -> bool {
        let (x, y) = (x.to_string(), y.to_string());
        Self::succeeded(
            "adb tap",
            self.run(
                Some(device),
                &["shell", "input", "tap", &x, &y],
                self.command_timeout,
            )
            .await,
        )
    }

    async fn swipe(&self, device: &str, from: (u32, u32), to: (u32, u32), duration_ms: u32) -> bool {
        let args = [
            from.0.to_string(),
            from.1.to_string(),
            to.0.to_string(),
            to.1.to_string(),
            duration_ms.to_string(),
        ];
        let mut full = vec!["shell", "input", "swipe"];
        full.extend(args.iter().map(String::as_str));
        // Swipe blocks on the device for its whole duration.
        let timeout = self.command_timeout + Duration::from_millis(duration_ms as u64);
        Self::succeeded("adb swipe", self.run(Some(device), &full, timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_with(program: &str) -> AdbShell {
        AdbShell::new(&AdbConfig {
            path: Some(program.to_string()),
            command_timeout_secs: 2,
            ..AdbConfig::default()
        })
    }

    #[test]
    fn parse_devices_basic() {
        let adb_output = "List of devices attached\nabc123 device transport_id:5\n";
        let devs = AdbShell::parse_devices(adb_output);
        assert_eq!(devs.len(), 1);
        assert_eq!(devs[0].name, "abc123");
        assert_eq!(devs[0].transport_id, Some("5".to_string()));
        assert_eq!(devs[0].model, None);
    }

    #[test]
    fn test_parse_devices_multiple() {
        let adb_output = "List of devices attached\n1d36d8f1               device usb:1-4 product:OnePlus6 model:ONEPLUS_A6000 device:OnePlus6 transport_id:2\n192.168.1.20:5555          device product:OnePlus6 model:ONEPLUS_A6000 device:OnePlus6 transport_id:3\n";
        let devices = AdbShell::parse_devices(adb_output);
        assert_eq!(
            devices,
            vec![
                Device {
                    name: "1d36d8f1".to_string(),
                    model: Some("ONEPLUS_A6000".to_string()),
                    transport_id: Some("2".to_string())
                },
                Device {
                    name: "192.168.1.20:5555".to_string(),
                    model: Some("ONEPLUS_A6000".to_string()),
                    transport_id: Some("3".to_string())
                },
            ]
        );
    }

    #[test]
    fn parse_devices_skips_offline_and_unauthorized() {
        let adb_output = "List of devices attached\nemulator-5554\toffline\nR58M\tunauthorized usb:1-1 transport_id:7\nabc\tdevice\n\n";
        let devices = AdbShell::parse_devices(adb_output);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "abc");
    }

    #[test]
    fn parse_devices_empty_list() {
        assert!(AdbShell::parse_devices("List of devices attached\n\n").is_empty());
        assert!(AdbShell::parse_devices("").is_empty());
    }

    #[test]
    fn parse_screen_size_prefers_override() {
        let out = "Physical size: 1080x2400\nOverride size: 720x1600\n";
        assert_eq!(AdbShell::parse_screen_size(out).unwrap(), (720, 1600));
        let out = "Physical size: 1080x2400\n";
        assert_eq!(AdbShell::parse_screen_size(out).unwrap(), (1080, 2400));
        assert!(AdbShell::parse_screen_size("error: no devices").is_err());
    }

    #[test]
    fn parse_battery_level_from_dumpsys() {
        let out = "Current Battery Service state:\n  AC powered: false\n  USB powered: true\n  level: 87\n  scale: 100\n";
        assert_eq!(AdbShell::parse_battery_level(out), Some(87));
        assert_eq!(AdbShell::parse_battery_level("nothing here"), None);
    }

    #[test]
    fn network_target_defaults_port() {
        assert_eq!(AdbShell::network_target("10.0.0.5", None), "10.0.0.5:5555");
        assert_eq!(AdbShell::network_target("10.0.0.5", Some(5556)), "10.0.0.5:5556");
        assert_eq!(AdbShell::network_target("10.0.0.5:7000", None), "10.0.0.5:7000");
    }

    #[test]
    fn connect_output_detection() {
        assert!(AdbShell::connect_output_ok("connected to 10.0.0.5:5555\n"));
        assert!(AdbShell::connect_output_ok("already connected to 10.0.0.5:5555\n"));
        assert!(!AdbShell::connect_output_ok(
            "failed to connect to 10.0.0.5:5555: Connection refused\n"
        ));
        assert!(!AdbShell::connect_output_ok("cannot connect to 10.0.0.5:5555: No route to host\n"));
    }

    #[tokio::test]
    async fn missing_binary_degrades_to_absent_results() {
        let shell = shell_with("definitely-not-an-adb-binary-xyz");
        assert!(!shell.check_installed().await);
        assert!(!shell.start_server().await);
        assert!(!shell.kill_server().await);
        assert!(shell.list_devices().await.is_empty());
        assert!(shell.capture_frame("abc").await.is_none());
        assert!(!shell.tap("abc", 10, 10).await);
        assert!(!shell.swipe("abc", (0, 0), (10, 10), 100).await);
        assert!(matches!(
            shell.ensure_ready().await,
            Err(AdbError::NotInstalled { .. })
        ));
    }
}
