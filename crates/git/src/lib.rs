//! Local repository helpers.
//!
//! Everything here runs the user's `git` binary rather than linking a git
//! library, so existing credential and SSH-agent configuration applies
//! unchanged to commits and pushes.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Matches SSH and HTTPS GitHub remote URLs and captures `owner/name`.
static GITHUB_REMOTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:git@github\.com:|ssh://git@github\.com/|https://github\.com/)([A-Za-z0-9_-]+/[A-Za-z0-9._-]+?)(?:\.git)?/?$",
    )
    .unwrap()
});

/// Failures from local repository inspection and updates.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("no git repository found at or above {}", start.display())]
    NotARepository { start: PathBuf },

    #[error("no GitHub remote configured for this repository")]
    NoGitHubRemote,

    #[error("git {args} failed: {stderr}")]
    Command { args: String, stderr: String },

    #[error("commit message may not be empty")]
    EmptyCommitMessage,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Find the repository root at or above `start`.
///
/// Walks the ancestor chain looking for a `.git` entry; reaching the
/// filesystem root without finding one is a distinct error rather than a
/// generic lookup failure.
pub fn discover_repo(start: &Path) -> Result<PathBuf, GitError> {
    for dir in start.ancestors() {
        if dir.join(".git").exists() {
            debug!(root = %dir.display(), "found repository root");
            return Ok(dir.to_path_buf());
        }
    }

    Err(GitError::NotARepository {
        start: start.to_path_buf(),
    })
}

/// Determine the `owner/name` identifier from the repository's remotes.
///
/// Remotes are scanned in `git remote -v` order; the first GitHub URL wins.
pub async fn github_repo_id(root: &Path) -> Result<String, GitError> {
    let output = git(root, &["remote", "-v"]).await?;
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_name), Some(url)) = (fields.next(), fields.next()) else {
            continue;
        };
        if let Some(id) = parse_github_remote(url) {
            return Ok(id);
        }
    }

    Err(GitError::NoGitHubRemote)
}

/// Resolve the ref to dispatch against: the current branch name, or the
/// commit hash when HEAD is detached.
pub async fn current_ref(root: &Path) -> Result<String, GitError> {
    match git(root, &["symbolic-ref", "--short", "-q", "HEAD"]).await {
        Ok(branch) if !branch.is_empty() => Ok(branch),
        _ => git(root, &["rev-parse", "HEAD"]).await,
    }
}

/// Commit a dirty worktree, prompting on stdin for the message, and
/// optionally push. A clean worktree is a no-op.
pub async fn commit_if_dirty(root: &Path, push: bool) -> Result<(), GitError> {
    let status = git(root, &["status", "--porcelain"]).await?;
    if status.is_empty() {
        debug!("worktree clean, nothing to commit");
        return Ok(());
    }

    git(root, &["add", "--all"]).await?;
    let message = prompt_commit_message()?;
    git(root, &["commit", "-m", &message]).await?;

    if push {
        git(root, &["push"]).await?;
    }

    Ok(())
}

/// Extract `owner/name` from a single remote URL.
fn parse_github_remote(url: &str) -> Option<String> {
    GITHUB_REMOTE_RE
        .captures(url)
        .map(|captures| captures[1].to_string())
}

fn prompt_commit_message() -> Result<String, GitError> {
    print!("Commit message: ");
    io::stdout().flush()?;

    let mut message = String::new();
    io::stdin().read_line(&mut message)?;
    let message = message.trim().to_string();
    if message.is_empty() {
        return Err(GitError::EmptyCommitMessage);
    }

    Ok(message)
}

/// Run `git -C <root> <args>` and return trimmed stdout.
async fn git(root: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .await?;

    if !output.status.success() {
        return Err(GitError::Command {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
