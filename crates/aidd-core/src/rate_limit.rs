//! Stamp-file rate limiting for guard warnings.
//!
//! A stamp holds one float (seconds since the epoch). The decision itself is
//! the pure [`decide`]; the filesystem part only reads and atomically
//! replaces the stamp.

use crate::error::Result;
use crate::io::atomic_write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub should_run: bool,
    /// Value to persist when running; `None` leaves the stamp untouched.
    pub new_stamp: Option<f64>,
}

pub fn decide(now: f64, last: Option<f64>, interval: f64) -> RateDecision {
    if interval <= 0.0 {
        return RateDecision {
            should_run: true,
            new_stamp: None,
        };
    }
    match last {
        Some(last) if now - last < interval => RateDecision {
            should_run: false,
            new_stamp: None,
        },
        _ => RateDecision {
            should_run: true,
            new_stamp: Some(now),
        },
    }
}

pub fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn stamp_path(log_dir: &Path, guard: &str) -> PathBuf {
    log_dir.join(format!(".context-gc-{guard}.stamp"))
}

pub fn read_stamp(path: &Path) -> Option<f64> {
    let text = std::fs::read_to_string(path).ok()?;
    match text.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(path = %path.display(), "unreadable rate-limit stamp; ignoring");
            None
        }
    }
}

pub fn write_stamp(path: &Path, ts: f64) -> Result<()> {
    atomic_write(path, format!("{ts}").as_bytes())
}

/// `true` when the guard fired within `interval` seconds. Otherwise records
/// `now` and returns `false`. A stamp that cannot be written never limits.
pub fn should_rate_limit(log_dir: &Path, guard: &str, interval: f64, now: f64) -> bool {
    let path = stamp_path(log_dir, guard);
    let decision = decide(now, read_stamp(&path), interval);
    if let Some(ts) = decision.new_stamp {
        if let Err(e) = write_stamp(&path, ts) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write rate-limit stamp");
        }
    }
    !decision.should_run
}

/// Resolve a configured log directory.
///
/// Absolute paths are used as-is. `aidd/`-prefixed paths are relative to the
/// directory holding the workflow when the root is itself named `aidd`, and to
/// the project dir otherwise. Anything else is relative to the workflow root.
pub fn resolve_log_dir(root: &Path, project_dir: &Path, raw: &str) -> PathBuf {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        return candidate;
    }
    if raw.starts_with("aidd/") {
        if root.file_name().is_some_and(|n| n == "aidd") {
            if let Some(parent) = root.parent() {
                return parent.join(candidate);
            }
        }
        return project_dir.join(candidate);
    }
    root.join(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn zero_interval_never_limits_or_stamps() {
        assert_eq!(
            decide(100.0, Some(99.0), 0.0),
            RateDecision {
                should_run: true,
                new_stamp: None
            }
        );
    }

    #[test]
    fn within_interval_limits() {
        let d = decide(100.0, Some(95.0), 10.0);
        assert!(!d.should_run);
        assert_eq!(d.new_stamp, None);
    }

    #[test]
    fn after_interval_runs_and_restamps() {
        let d = decide(100.0, Some(80.0), 10.0);
        assert!(d.should_run);
        assert_eq!(d.new_stamp, Some(100.0));
        assert_eq!(decide(5.0, None, 10.0).new_stamp, Some(5.0));
    }

    #[test]
    fn stamp_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        assert!(!should_rate_limit(dir.path(), "read_guard", 60.0, 1000.0));
        assert!(should_rate_limit(dir.path(), "read_guard", 60.0, 1030.0));
        assert!(!should_rate_limit(dir.path(), "read_guard", 60.0, 1061.0));
        assert_eq!(read_stamp(&stamp_path(dir.path(), "read_guard")), Some(1061.0));
    }

    #[test]
    fn log_dir_resolution() {
        let root = Path::new("/p/aidd");
        let project = Path::new("/p");
        assert_eq!(resolve_log_dir(root, project, "/abs/logs"), Path::new("/abs/logs"));
        assert_eq!(
            resolve_log_dir(root, project, "aidd/reports/logs"),
            Path::new("/p/aidd/reports/logs")
        );
        assert_eq!(
            resolve_log_dir(root, project, "reports/logs"),
            Path::new("/p/aidd/reports/logs")
        );
        let flat = Path::new("/w/flow");
        assert_eq!(
            resolve_log_dir(flat, Path::new("/w"), "aidd/reports/logs"),
            Path::new("/w/aidd/reports/logs")
        );
    }
}
