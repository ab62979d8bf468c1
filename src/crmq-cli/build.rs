use std::process::Command;

fn main() {
    capture_build_info();
}

/// Run a command and return its trimmed stdout, if it succeeded
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn capture_build_info() {
    if let Some(git_hash) = command_output("git", &["rev-parse", "--short", "HEAD"]) {
        println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    }

    if let Some(build_date) = command_output("date", &["+%Y-%m-%d"]) {
        println!("cargo:rustc-env=BUILD_DATE={}", build_date);
    }

    // "rustc 1.82.0 (f6e511eec 2024-10-15)" -> "1.82.0"
    if let Some(rustc_version) = command_output("rustc", &["--version"]) {
        if let Some(version) = rustc_version.split_whitespace().nth(1) {
            println!("cargo:rustc-env=RUSTC_VERSION={}", version);
        }
    }

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
