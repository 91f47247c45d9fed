use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    // Best-effort; path is relative to the crate dir.
    println!("cargo:rerun-if-changed=../.git/HEAD");

    let hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=FIBER_ROUTE_GIT_HASH={hash}");
}
