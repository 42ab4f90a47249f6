use std::process::Command;

/// Trimmed stdout of a helper command, or `None` when it is missing,
/// fails or prints nothing (e.g. a source tarball without `.git`).
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    // Shown in the status panel footer so a redeploy can be confirmed from
    // the page the QR code is scanned on.
    let built_at = command_stdout("date", &["-u", "+%Y-%m-%d %H:%M UTC"])
        .unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=PAIRBOT_BUILD_TIME={built_at}");

    // Short SHA for `/health`, `--version` and the panel footer.
    let git_sha = command_stdout("git", &["rev-parse", "--short", "HEAD"])
        .unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=PAIRBOT_GIT_SHA={git_sha}");
}
