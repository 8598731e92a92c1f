use crate::error::{AiddError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Hard ceiling for any git invocation made from a hook.
pub const GIT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Run `git <args>` in `cwd` with [`GIT_TIMEOUT`]. Returns stdout on success.
///
/// Stdout/stderr are drained on dedicated threads so a chatty command cannot
/// fill the pipe buffer; the wait happens on a waiter thread so the timeout
/// does not busy-poll.
pub fn run_git(cwd: &Path, args: &[&str]) -> Result<String> {
    run_git_with_timeout(cwd, args, GIT_TIMEOUT)
}

pub fn run_git_with_timeout(cwd: &Path, args: &[&str], timeout: Duration) -> Result<String> {
    let git = which::which("git").map_err(|e| AiddError::Git(format!("git not found: {e}")))?;
    let mut child = Command::new(git)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let child_pid = child.id();
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stdout_handle {
            use std::io::Read;
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stderr_handle {
            use std::io::Read;
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait());
    });

    let status = match rx.recv_timeout(timeout) {
        Ok(result) => result?,
        Err(_) => {
            kill_process(child_pid);
            return Err(AiddError::GitTimeout(timeout.as_millis() as u64));
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    if !status.success() {
        return Err(AiddError::Git(format!(
            "git {} exited with {}: {}",
            args.join(" "),
            status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }
    Ok(stdout)
}

/// Terminate a process by PID using SIGKILL. Best-effort.
fn kill_process(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Repository top-level directory, if `cwd` is inside a work tree.
pub fn toplevel(cwd: &Path) -> Option<PathBuf> {
    let out = run_git(cwd, &["rev-parse", "--show-toplevel"]).ok()?;
    let line = out.trim();
    if line.is_empty() {
        None
    } else {
        Some(PathBuf::from(line))
    }
}

/// Current branch name; `None` when detached, outside a repo, or on timeout.
pub fn current_branch(cwd: &Path) -> Option<String> {
    let out = run_git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).ok()?;
    let branch = out.trim();
    if branch.is_empty() || branch == "HEAD" {
        None
    } else {
        Some(branch.to_string())
    }
}

/// `git status --porcelain -uno` lines. Failures become an empty list.
pub fn status_lines(cwd: &Path) -> Vec<String> {
    run_git(cwd, &["status", "--porcelain", "-uno"])
        .map(|out| {
            out.lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Zero-context diff of the working tree against HEAD, limited to `pathspecs`.
pub fn diff_against_head(cwd: &Path, pathspecs: &[String]) -> Result<String> {
    let mut args: Vec<&str> = vec!["diff", "--unified=0", "--no-color", "HEAD", "--"];
    args.extend(pathspecs.iter().map(String::as_str));
    run_git(cwd, &args)
}

fn nonempty_lines(out: &str) -> impl Iterator<Item = String> + '_ {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.replace('\\', "/"))
}

/// Files changed against HEAD: unstaged, staged and untracked, deduplicated
/// in that order. Paths are relative to the repository top level. `None`
/// outside a work tree.
pub fn changed_files(cwd: &Path) -> Option<Vec<String>> {
    let top = toplevel(cwd)?;
    let mut seen = std::collections::HashSet::new();
    let mut files = Vec::new();
    for args in [
        &["diff", "--name-only"][..],
        &["diff", "--name-only", "--cached"][..],
        &["ls-files", "--others", "--exclude-standard"][..],
    ] {
        let Ok(out) = run_git(&top, args) else {
            continue;
        };
        for file in nonempty_lines(&out) {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }
    Some(files)
}

/// Content of `rel` (relative to `cwd`) at HEAD. `None` when HEAD or the file
/// does not exist.
pub fn show_head(cwd: &Path, rel: &str) -> Option<String> {
    run_git(cwd, &["show", &format!("HEAD:./{rel}")]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn outside_repo_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let ceiling = dir.path().parent().unwrap();
        std::env::set_var("GIT_CEILING_DIRECTORIES", ceiling);
        assert_eq!(current_branch(dir.path()), None);
        assert!(status_lines(dir.path()).is_empty());
        assert_eq!(toplevel(dir.path()), None);
    }

    #[test]
    fn failing_git_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = run_git(dir.path(), &["definitely-not-a-git-command"]);
        assert!(result.is_err());
    }
}
