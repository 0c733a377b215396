//! Shallow git clones into operation-scoped temporary directories.

use std::{
    path::{Component, Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    types::ParsedSource,
};

// Cloning shells out to the `git` binary; credential helpers and the SSH agent
// apply to private repositories.

const TEMP_PREFIX: &str = "skillpack-";
const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// A materialized source in a temporary directory owned by one operation.
///
/// The directory is removed when the checkout is dropped (error paths, panics,
/// cancelled futures) or explicitly through [`TempCheckout::cleanup`].
#[derive(Debug)]
pub struct TempCheckout {
    dir: tempfile::TempDir,
    subpath: Option<String>,
}

impl TempCheckout {
    /// Create a fresh, empty temporary directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()
            .map_err(|e| Error::filesystem(&std::env::temp_dir(), e))?;
        Ok(Self { dir, subpath: None })
    }

    /// Restrict [`TempCheckout::content_root`] to a path inside the checkout.
    #[must_use]
    pub fn with_subpath(mut self, subpath: Option<String>) -> Self {
        self.subpath = subpath;
        self
    }

    /// Top of the checkout.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory skill discovery should start from.
    pub fn content_root(&self) -> Result<PathBuf> {
        let Some(subpath) = &self.subpath else {
            return Ok(self.root().to_path_buf());
        };
        let relative = Path::new(subpath);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::invalid_source(
                subpath.as_str(),
                "subpath escapes the checkout",
            ));
        }
        let path = self.root().join(relative);
        if !path.is_dir() {
            return Err(Error::invalid_source(
                subpath.as_str(),
                "subpath does not exist in the fetched source",
            ));
        }
        Ok(path)
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn cleanup(self) -> Result<()> {
        let path = self.root().to_path_buf();
        self.dir
            .close()
            .map_err(|e| Error::filesystem(&path, e))?;
        debug!(path = %path.display(), "removed temporary checkout");
        Ok(())
    }
}

/// Shallow, ref-pinned clone of a git source into a new temporary directory.
///
/// On failure the directory is removed before the error is returned.
pub async fn clone_repo(source: &ParsedSource) -> Result<TempCheckout> {
    let url = source
        .clone_url()
        .ok_or_else(|| Error::unsupported("clone_repo", source.kind_name()))?;
    let checkout = clone_checkout(&url, source.git_ref(), TempCheckout::new()?).await?;
    Ok(checkout.with_subpath(source.subpath().map(ToOwned::to_owned)))
}

/// Clone into `checkout`, removing it when the clone fails.
async fn clone_checkout(url: &str, git_ref: Option<&str>, checkout: TempCheckout) -> Result<TempCheckout> {
    let cloned = tokio::time::timeout(CLONE_TIMEOUT, clone_into(url, git_ref, checkout.root()))
        .await
        .unwrap_or_else(|_| Err(Error::git_clone(url, "timed out")));

    if let Err(e) = cloned {
        if let Err(cleanup_err) = checkout.cleanup() {
            warn!(%url, error = %cleanup_err, "failed to remove temporary checkout");
        }
        return Err(e);
    }

    debug!(%url, ?git_ref, path = %checkout.root().display(), "cloned repository");
    Ok(checkout)
}

/// Remove a temporary directory. Missing paths are fine; calling this twice
/// is fine. Refuses to touch anything outside the system temp directory.
pub async fn cleanup_temp_dir(path: &Path) -> Result<()> {
    if !path.starts_with(std::env::temp_dir()) {
        return Err(Error::message(format!(
            "refusing to remove {}: not inside the temporary directory",
            path.display()
        )));
    }
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::filesystem(path, e)),
    }
}

/// Clone `url` into the (empty) directory `dest`.
pub(crate) async fn clone_into(url: &str, git_ref: Option<&str>, dest: &Path) -> Result<()> {
    match git_ref {
        Some(sha) if is_commit_sha(sha) => {
            run_git(url, dest, &["init", "--quiet"]).await?;
            run_git(url, dest, &["remote", "add", "origin", url]).await?;
            run_git(url, dest, &["fetch", "--quiet", "--depth", "1", "origin", sha]).await?;
            run_git(url, dest, &["checkout", "--quiet", "FETCH_HEAD"]).await
        },
        _ => {
            let mut args = vec!["clone", "--quiet", "--depth", "1"];
            if let Some(branch) = git_ref {
                args.extend(["--branch", branch]);
            }
            let dest_str = dest.to_string_lossy();
            args.extend([url, "--", dest_str.as_ref()]);
            run_git(url, dest, &args).await
        },
    }
}

async fn run_git(url: &str, cwd: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::git_clone(url, format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::git_clone(url, classify_failure(&stderr)));
    }
    Ok(())
}

fn is_commit_sha(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn classify_failure(stderr: &str) -> String {
    let lower = stderr.to_ascii_lowercase();
    let detail = stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("unknown error");

    let kind = if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied")
    {
        "authentication required"
    } else if lower.contains("repository not found") || lower.contains("does not exist") {
        "repository not found or private"
    } else if lower.contains("remote branch") && lower.contains("not found")
        || lower.contains("couldn't find remote ref")
    {
        "ref not found"
    } else if lower.contains("could not resolve host")
        || lower.contains("unable to access")
        || lower.contains("connection refused")
    {
        "host unreachable"
    } else {
        return detail.to_string();
    };
    format!("{kind}: {detail}")
}
