//! Transcript-size check on prompt submission.

use crate::context_config::{HardBehavior, TranscriptLimits};
use crate::messages;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptCheck {
    Ok,
    /// Soft limit reached, or hard limit under `warn_only`.
    Warn(String),
    /// Hard limit reached under `block_prompt`.
    Block(String),
}

pub fn check_size(size: u64, limits: &TranscriptLimits) -> TranscriptCheck {
    if size >= limits.hard_bytes {
        return match limits.hard_behavior {
            HardBehavior::BlockPrompt => TranscriptCheck::Block(messages::TRANSCRIPT_BLOCK_REASON.to_string()),
            HardBehavior::WarnOnly => TranscriptCheck::Warn(messages::transcript_hard_warning(size)),
        };
    }
    if size >= limits.soft_bytes {
        return TranscriptCheck::Warn(messages::transcript_soft(size));
    }
    TranscriptCheck::Ok
}

/// Stat the transcript file. Missing or unreadable files are fine.
pub fn check(path: Option<&Path>, limits: &TranscriptLimits) -> TranscriptCheck {
    match path.and_then(|p| std::fs::metadata(p).ok()) {
        Some(meta) => check_size(meta.len(), limits),
        None => TranscriptCheck::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(behavior: HardBehavior) -> TranscriptLimits {
        TranscriptLimits {
            soft_bytes: 100,
            hard_bytes: 200,
            hard_behavior: behavior,
        }
    }

    #[test]
    fn thresholds() {
        let l = limits(HardBehavior::BlockPrompt);
        assert_eq!(check_size(99, &l), TranscriptCheck::Ok);
        assert!(matches!(check_size(100, &l), TranscriptCheck::Warn(m) if m.contains("100 bytes")));
        assert_eq!(
            check_size(200, &l),
            TranscriptCheck::Block(messages::TRANSCRIPT_BLOCK_REASON.to_string())
        );
        let w = limits(HardBehavior::WarnOnly);
        assert!(matches!(check_size(500, &w), TranscriptCheck::Warn(m) if m.contains("Run /compact now")));
    }

    #[test]
    fn missing_transcript_is_ok() {
        let l = limits(HardBehavior::BlockPrompt);
        assert_eq!(check(None, &l), TranscriptCheck::Ok);
        assert_eq!(check(Some(Path::new("/definitely/not/here.jsonl")), &l), TranscriptCheck::Ok);
    }
}
