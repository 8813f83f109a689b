use std::env;
use std::process::Command;
use time::OffsetDateTime;

/// `git describe --tags --exact-match`, if HEAD is tagged.
fn exact_tag() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");

    // Reproducible builds pin the date through SOURCE_DATE_EPOCH
    let built = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|epoch| OffsetDateTime::from_unix_timestamp(epoch).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    println!(
        "cargo:rustc-env=APP_BUILD_DATE={:04}-{:02}-{:02}",
        built.year(),
        u8::from(built.month()),
        built.day()
    );

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let release = env::var("PROFILE").is_ok_and(|p| p == "release");
    let display = if release || exact_tag().as_deref() == Some(format!("v{version}").as_str()) {
        version
    } else {
        format!("{version}-dev")
    };
    println!("cargo:rustc-env=APP_VERSION_DISPLAY={display}");
}
