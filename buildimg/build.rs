use std::{env, fs, path::PathBuf, process::Command};

/// Returns the output of a successful git invocation, or `None` when git is unavailable or we are
/// not inside a checkout.
fn git<'a, I: IntoIterator<Item = &'a str>>(args: I) -> Option<Vec<u8>> {
    let output = Command::new("git").args(args).output().ok()?;
    output.status.success().then_some(output.stdout)
}

fn git_commit_hash() -> Option<String> {
    let stdout = git(["rev-parse", "--short", "HEAD"])?;
    let commit_hash = String::from_utf8(stdout).ok()?.trim().to_owned();
    (!commit_hash.is_empty()).then_some(commit_hash)
}

fn git_is_clean() -> bool {
    git(["status", "--porcelain"]).is_some_and(|stdout| stdout.is_empty())
}

fn main() {
    let doing_release = env::var("BUILDIMG_RELEASE")
        .map(|env| matches!(env.as_str(), "1" | "true"))
        .unwrap_or_default();

    let mut version = env!("CARGO_PKG_VERSION").to_owned();
    if !doing_release {
        if let Some(commit_hash) = git_commit_hash() {
            version.push('+');
            version.push_str(&commit_hash);
            if !git_is_clean() {
                version.push_str(".dirty");
            }
        }
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::write(
        out_dir.join("version.rs"),
        format!("pub const VERSION: &str = {version:?};"),
    )
    .unwrap();
}
