use adb_template_bot::adb::{AdbShell, Frame, Transport};
use adb_template_bot::args::{Args, Command};
use adb_template_bot::config::AppConfig;
use adb_template_bot::error::{AutomationError, AutomationResult};
use adb_template_bot::game_automation::{CancelToken, RoutineRegistry, RunOutcome, RunnerEvent, ScriptRunner};
use adb_template_bot::template_matching::{Template, TemplateMatcher};
use std::ops::ControlFlow;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let args = match Args::parse() {
        ControlFlow::Continue(args) => args,
        ControlFlow::Break(code) => return code,
    };

    let default_level = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = match AppConfig::load_or_default(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("❌ Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(execute(args.command, config)) {
        Ok(code) => code,
        Err(e) => {
            log::error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn status(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

async fn execute(command: Command, config: AppConfig) -> AutomationResult<ExitCode> {
    let shell = AdbShell::new(&config.adb);
    match command {
        Command::Devices => {
            shell.ensure_ready().await?;
            let devices = shell.list_devices().await;
            if devices.is_empty() {
                println!("No devices attached");
            }
            for device in devices {
                println!(
                    "{}\t{}",
                    device.name,
                    device.model.as_deref().unwrap_or("unknown model")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Connect { target } => {
            shell.ensure_ready().await?;
            Ok(status(shell.connect(&target, None).await))
        }
        Command::Disconnect { target } => Ok(status(shell.disconnect(&target, None).await)),
        Command::Tcpip { device, port } => {
            require_device(&shell, &device).await?;
            Ok(status(shell.enable_network_mode(&device, port).await))
        }
        Command::Info { device } => {
            require_device(&shell, &device).await?;
            let info = shell.device_info(&device).await;
            let unknown = || "unknown".to_string();
            println!("📱 Device:   {}", info.name);
            println!("   Model:    {}", info.model.unwrap_or_else(unknown));
            println!("   Brand:    {}", info.brand.unwrap_or_else(unknown));
            println!("   Android:  {}", info.android_version.unwrap_or_else(unknown));
            match info.screen_size {
                Some((w, h)) => println!("   Screen:   {}x{}", w, h),
                None => println!("   Screen:   unknown"),
            }
            match info.battery_level {
                Some(level) => println!("   Battery:  {}%", level),
                None => println!("   Battery:  unknown"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Screenshot { device, out } => {
            require_device(&shell, &device).await?;
            screenshot(&shell, &device, &out).await
        }
        Command::Match {
            frame,
            template,
            threshold,
            region,
        } => {
            let bytes = tokio::fs::read(&frame).await?;
            let matcher = TemplateMatcher::new(config.matching.clone());
            let threshold = threshold.unwrap_or(config.matching.threshold);
            let template = Template::new(template);
            let frame = Frame::new(bytes, 0);
            let result = tokio::task::spawn_blocking(move || match region {
                Some(region) => matcher.match_in_region(&frame, &template, region, threshold),
                None => matcher.match_frame(&frame, &template, threshold, &CancelToken::new()),
            })
            .await??;
            println!("{}", result);
            if let Some((x, y)) = result.center() {
                println!("center=({}, {})", x, y);
            }
            Ok(status(result.is_match))
        }
        Command::Routines => {
            let registry = RoutineRegistry::load_dir(&config.routines_dir)?;
            if registry.is_empty() {
                println!("No routines in {}", config.routines_dir.display());
            }
            for routine in registry.iter() {
                println!("{}\t{}", routine.name, routine.description);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { routine, device } => {
            let registry = RoutineRegistry::load_dir(&config.routines_dir)?;
            let routine = registry.get(&routine)?.clone();
            require_device(&shell, &device).await?;
            run(shell, config, routine, &device).await
        }
    }
}

/// Fails fast when adb is unusable or `device` is not attached.
async fn require_device(shell: &AdbShell, device: &str) -> AutomationResult<()> {
    shell.ensure_ready().await?;
    if shell.is_device_connected(device).await {
        Ok(())
    } else {
        Err(AutomationError::DeviceNotConnected(device.to_string()))
    }
}

async fn screenshot(shell: &AdbShell, device: &str, out: &Path) -> AutomationResult<ExitCode> {
    if let Some(frame) = shell.capture_frame(device).await {
        tokio::fs::write(out, frame.bytes()).await?;
        println!(
            "✅ Screenshot ({} bytes, {}ms) saved to {}",
            frame.bytes().len(),
            frame.duration_ms(),
            out.display()
        );
        return Ok(ExitCode::SUCCESS);
    }
    log::warn!("Direct capture failed, retrying through a file on the device");
    let ok = shell.capture_to_file(device, &out.to_string_lossy()).await;
    if ok {
        println!("✅ Screenshot saved to {}", out.display());
    }
    Ok(status(ok))
}

async fn run(
    shell: AdbShell,
    config: AppConfig,
    routine: adb_template_bot::game_automation::Routine,
    device: &str,
) -> AutomationResult<ExitCode> {
    let (mut runner, mut events) = ScriptRunner::new(Arc::new(shell), Arc::new(config));

    let token = runner.token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("🛑 Ctrl-C received, stopping after the current step");
            token.stop();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RunnerEvent::Started { routine, device } => {
                    println!("▶️ Running '{}' on {} (Ctrl-C to stop)", routine, device)
                }
                RunnerEvent::RoundCompleted(n) => println!("🔁 Round {} complete", n),
                RunnerEvent::Finished(outcome) => match outcome {
                    RunOutcome::Completed { rounds } => println!("✅ Finished after {} round(s)", rounds),
                    RunOutcome::Stopped { rounds } => println!("⏹️ Stopped after {} round(s)", rounds),
                    RunOutcome::Failed { rounds, error } => {
                        println!("❌ Failed after {} round(s): {}", rounds, error)
                    }
                },
            }
        }
    });

    runner.start(routine, device)?;
    let outcome = runner.wait().await?;
    ctrl_c.abort();
    drop(runner);
    let _ = printer.await;

    Ok(status(outcome.is_none_or(|o| o.is_success())))
}
