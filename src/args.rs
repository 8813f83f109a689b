use crate::template_matching::BoundingBox;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// List attached devices
    Devices,
    Connect { target: String },
    Disconnect { target: String },
    /// Switch a USB device to network mode
    Tcpip { device: String, port: Option<u16> },
    Info { device: String },
    Screenshot { device: String, out: PathBuf },
    /// Offline match of a template against a saved screenshot
    Match {
        frame: PathBuf,
        template: PathBuf,
        threshold: Option<f32>,
        region: Option<BoundingBox>,
    },
    Routines,
    Run { routine: String, device: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub command: Command,
    pub debug_mode: bool,
    pub config_path: Option<PathBuf>,
}

/// Result of parsing the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Run(Args),
    Help,
    Version,
}

fn parse_region(value: &str) -> Result<BoundingBox, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("Invalid region '{}', expected x1,y1,x2,y2", value))?;
    match parts[..] {
        [x1, y1, x2, y2] => Ok(BoundingBox::from_corners(x1, y1, x2, y2)),
        _ => Err(format!("Invalid region '{}', expected x1,y1,x2,y2", value)),
    }
}

impl Args {
    /// Parse the process arguments. `Break` carries the exit status when
    /// there is nothing left to do.
    pub fn parse() -> ControlFlow<ExitCode, Self> {
        Self::resolve(Self::parse_from(std::env::args().skip(1)))
    }

    /// Print help, version or the parse error and decide how to go on.
    /// Help and version exit successfully; bad arguments do not.
    pub fn resolve(parsed: Result<Parsed, String>) -> ControlFlow<ExitCode, Self> {
        match parsed {
            Ok(Parsed::Run(args)) => ControlFlow::Continue(args),
            Ok(Parsed::Help) => {
                print_help();
                ControlFlow::Break(ExitCode::SUCCESS)
            }
            Ok(Parsed::Version) => {
                println!(
                    "ADB Template Bot v{} (built {})",
                    env!("APP_VERSION_DISPLAY"),
                    env!("APP_BUILD_DATE")
                );
                ControlFlow::Break(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("❌ {}", e);
                eprintln!("Run with --help for usage.");
                ControlFlow::Break(ExitCode::FAILURE)
            }
        }
    }

    /// Parse arguments (without the program name).
    pub fn parse_from<I, S>(args: I) -> Result<Parsed, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut debug_mode = false;
        let mut config_path: Option<PathBuf> = None;
        let mut device: Option<String> = None;
        let mut out: Option<PathBuf> = None;
        let mut threshold: Option<f32> = None;
        let mut region: Option<BoundingBox> = None;
        let mut port: Option<u16> = None;
        let mut positional: Vec<String> = Vec::new();

        for arg in args.into_iter().map(Into::into) {
            if arg == "--help" || arg == "-h" {
                return Ok(Parsed::Help);
            } else if arg == "--version" || arg == "-v" {
                return Ok(Parsed::Version);
            } else if arg == "--debug" {
                debug_mode = true;
            } else if let Some(val) = arg.strip_prefix("--config=") {
                config_path = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--device=") {
                device = Some(val.to_string());
            } else if let Some(val) = arg.strip_prefix("--out=") {
                out = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--threshold=") {
                match val.parse::<f32>() {
                    Ok(t) if (0.0..=1.0).contains(&t) => threshold = Some(t),
                    _ => return Err(format!("Invalid threshold value: {}", val)),
                }
            } else if let Some(val) = arg.strip_prefix("--region=") {
                region = Some(parse_region(val)?);
            } else if let Some(val) = arg.strip_prefix("--port=") {
                port = Some(val.parse::<u16>().map_err(|_| format!("Invalid port value: {}", val))?);
            } else if arg.starts_with('-') {
                return Err(format!("Unknown argument: {}", arg));
            } else {
                positional.push(arg);
            }
        }

        let mut positional = positional.into_iter();
        let Some(name) = positional.next() else {
            return Ok(Parsed::Help);
        };
        let mut operand = |what: &str| {
            positional
                .next()
                .ok_or_else(|| format!("'{}' needs {}", name, what))
        };
        let require_device = |device: Option<String>| {
            device.ok_or_else(|| format!("'{}' needs --device=<serial> (see 'devices')", name))
        };

        let command = match name.as_str() {
            "devices" => Command::Devices,
            "connect" => Command::Connect {
                target: operand("an <ip[:port]>")?,
            },
            "disconnect" => Command::Disconnect {
                target: operand("an <ip[:port]>")?,
            },
            "tcpip" => Command::Tcpip {
                device: require_device(device)?,
                port,
            },
            "info" => Command::Info {
                device: require_device(device)?,
            },
            "screenshot" => Command::Screenshot {
                device: require_device(device)?,
                out: out.unwrap_or_else(|| PathBuf::from("screenshot.png")),
            },
            "match" => Command::Match {
                frame: PathBuf::from(operand("a <frame.png>")?),
                template: PathBuf::from(operand("a <template.png>")?),
                threshold,
                region,
            },
            "routines" => Command::Routines,
            "run" => Command::Run {
                routine: operand("a <routine> name")?,
                device: require_device(device)?,
            },
            other => return Err(format!("Unknown command: {}", other)),
        };

        if let Some(extra) = positional.next() {
            return Err(format!("Unexpected argument: {}", extra));
        }

        Ok(Parsed::Run(Args {
            command,
            debug_mode,
            config_path,
        }))
    }
}

fn print_help() {
    println!("🤖 ADB Template Bot");
    println!();
    println!("USAGE:");
    println!("    adb-template-bot [FLAGS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    devices                         List attached devices");
    println!("    connect <ip[:port]>             Connect over the network (port 5555 by default)");
    println!("    disconnect <ip[:port]>          Drop a network connection");
    println!("    tcpip --device=ID [--port=N]    Switch a USB device to network mode");
    println!("    info --device=ID                Show model, Android version, screen and battery");
    println!("    screenshot --device=ID [--out=FILE]");
    println!("                                    Save a screenshot (default screenshot.png)");
    println!("    match <frame> <template> [--threshold=T] [--region=x1,y1,x2,y2]");
    println!("                                    Match a template against a saved screenshot");
    println!("    routines                        List routines in the routines directory");
    println!("    run <routine> --device=ID       Run a routine until it finishes or Ctrl-C");
    println!();
    println!("FLAGS:");
    println!("    --config=FILE       Load settings from a TOML file");
    println!("    --debug             Enable debug logging (RUST_LOG overrides)");
    println!("    --help, -h          Show this help message");
    println!("    --version, -v       Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    adb-template-bot devices");
    println!("    adb-template-bot screenshot --device=emulator-5554 --out=screen.png");
    println!("    adb-template-bot match screen.png templates/restart.png --threshold=0.85");
    println!("    adb-template-bot --config=bot.toml run restart_loop --device=192.168.1.20:5555");
}
