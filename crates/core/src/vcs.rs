//! Narrow, read-only collaborator through which the core observes repository
//! metadata. Never invokes a destructive or mutating VCS subcommand. Every probe
//! is bounded by a timeout and maps any failure to "feature absent" rather than
//! an error the caller must handle — this is the concrete realization of the
//! `ExternalToolError` policy in SPEC_FULL.md §7.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

pub trait VcsAdapter {
    fn is_repository(&self, path: &Path) -> bool;
    fn commit_count(&self, path: &Path) -> Option<u64>;
    fn first_commit_unix_time(&self, path: &Path) -> Option<i64>;
    fn has_hosted_remote(&self, path: &Path) -> bool;
    fn has_ci_workflows(&self, path: &Path) -> bool;
    fn is_tracked(&self, path: &Path, file: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GitAdapter;

impl VcsAdapter for GitAdapter {
    fn is_repository(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    fn commit_count(&self, path: &Path) -> Option<u64> {
        let out = run_git(path, &["rev-list", "--count", "HEAD"])?;
        out.trim().parse().ok()
    }

    fn first_commit_unix_time(&self, path: &Path) -> Option<i64> {
        let out = run_git(path, &["log", "--reverse", "--format=%ct", "-n", "1"])?;
        out.lines().next()?.trim().parse().ok()
    }

    fn has_hosted_remote(&self, path: &Path) -> bool {
        run_git(path, &["remote", "-v"])
            .map(|out| out.contains("github.com") || out.contains("gitlab.com") || out.contains("bitbucket.org"))
            .unwrap_or(false)
    }

    fn has_ci_workflows(&self, path: &Path) -> bool {
        let workflows = path.join(".github").join("workflows");
        workflows
            .read_dir()
            .map(|mut entries| {
                entries.any(|e| {
                    e.ok()
                        .map(|e| {
                            let name = e.file_name();
                            let name = name.to_string_lossy();
                            name.ends_with(".yml") || name.ends_with(".yaml")
                        })
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    fn is_tracked(&self, path: &Path, file: &str) -> bool {
        run_git(path, &["ls-files", "--error-unmatch", file]).is_some()
    }
}

/// Runs `git <args>` rooted at `path` with a bounded wall-clock timeout. Any
/// spawn failure, non-zero exit, or timeout is treated as "feature absent" and
/// returns `None` — never propagated as an error.
fn run_git(path: &Path, args: &[&str]) -> Option<String> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .spawn()
        .ok()?;

    let start = std::time::Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    return None;
                }
                let mut out = String::new();
                use std::io::Read;
                child.stdout.take()?.read_to_string(&mut out).ok()?;
                return Some(out);
            }
            Ok(None) => {
                if start.elapsed() > PROBE_TIMEOUT {
                    let _ = child.kill();
                    tracing::warn!(?args, "git probe timed out, treating feature as absent");
                    return None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_repository_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = GitAdapter;
        assert!(!adapter.is_repository(dir.path()));
        assert!(adapter.commit_count(dir.path()).is_none());
    }

    #[test]
    fn missing_ci_dir_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = GitAdapter;
        assert!(!adapter.has_ci_workflows(dir.path()));
    }
}
