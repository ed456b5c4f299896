use log::debug;

use crate::{process, Result};

/// The number of leading characters of the commit hash used as the default image tag.
pub const SHORT_COMMIT_HASH_LEN: usize = 8;

/// Returns the commit hash of `HEAD`.
fn commit_hash() -> Result<String> {
    let output = process::command!("git", "rev-parse", "HEAD").output()?;

    Ok(std::str::from_utf8(&output.stdout)?.trim().to_owned())
}

fn shorten(commit_hash: &str) -> &str {
    commit_hash
        .get(..SHORT_COMMIT_HASH_LEN)
        .unwrap_or(commit_hash)
}

/// Returns the abbreviated commit hash of `HEAD`, which is the default image tag.
pub fn short_commit_hash() -> Result<String> {
    let commit_hash = commit_hash()?;
    debug!("git commit hash: {commit_hash}");

    Ok(shorten(&commit_hash).to_owned())
}
