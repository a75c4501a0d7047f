//! Stamps the binary with a version and commit for the startup log line.
//!
//! `SQUEEZE_VERSION` and `SQUEEZE_GIT_SHA` from the environment win (release
//! builds set them); otherwise the crate version and `git rev-parse` are used.

use std::env;
use std::process::Command;

const UNKNOWN: &str = "unknown";

fn main() {
    for var in ["SQUEEZE_VERSION", "SQUEEZE_GIT_SHA", "GITHUB_SHA"] {
        println!("cargo:rerun-if-env-changed={}", var);
    }

    let version = env::var("SQUEEZE_VERSION")
        .or_else(|_| env::var("CARGO_PKG_VERSION"))
        .unwrap_or_else(|_| UNKNOWN.to_string());

    let sha = env::var("SQUEEZE_GIT_SHA")
        .ok()
        .or_else(|| env::var("GITHUB_SHA").ok().map(short_sha))
        .or_else(git_head)
        .unwrap_or_else(|| UNKNOWN.to_string());

    println!("cargo:rustc-env=SQUEEZE_VERSION={}", version);
    println!("cargo:rustc-env=SQUEEZE_GIT_SHA={}", sha);
}

fn short_sha(sha: String) -> String {
    sha.chars().take(7).collect()
}

fn git_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8(output.stdout).ok()?;
    Some(sha.trim().to_string())
}
