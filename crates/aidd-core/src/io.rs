use crate::error::Result;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Readers never observe a half-written identifier or stamp file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Append text to a file, creating it (and its parent) if it doesn't exist.
pub fn append_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    f.write_all(text.as_bytes())?;
    Ok(())
}

/// Read a file as UTF-8, replacing invalid sequences. Missing files yield `None`.
pub fn read_lossy(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read at most `limit` bytes from the start of a file.
pub fn read_head(path: &Path, limit: u64) -> Option<String> {
    let f = std::fs::File::open(path).ok()?;
    let mut buf = Vec::new();
    f.take(limit).read_to_end(&mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Read a single-line text file, trimmed. Empty content counts as absent.
pub fn read_trimmed(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let value = text.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs/nested/.active_ticket");
        atomic_write(&path, b"ABC-1\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ABC-1\n");
    }

    #[test]
    fn append_text_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/events/T.jsonl");
        append_text(&path, "a\n").unwrap();
        append_text(&path, "b\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn read_trimmed_treats_blank_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(read_trimmed(&path), None);
        std::fs::write(&path, " X-1 \n").unwrap();
        assert_eq!(read_trimmed(&path).as_deref(), Some("X-1"));
    }

    #[test]
    fn read_head_caps_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "abcdef").unwrap();
        assert_eq!(read_head(&path, 3).as_deref(), Some("abc"));
    }
}
