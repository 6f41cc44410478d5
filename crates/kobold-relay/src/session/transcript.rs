//! Append-only transcript files.
//!
//! A transcript is plain UTF-8 text with one `"speaker: text"` line per turn.
//! During normal operation lines are only ever appended; the file is
//! rewritten as a whole only on reset and when a reply is regenerated.
//! A multi-line reply is stored with its embedded newlines, so one entry may
//! occupy several file lines.

use crate::error::{RelayError, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Handle to one transcript file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Every line of the transcript, without line terminators.
    pub fn read_lines(&self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Replace the whole file with `content`.
    ///
    /// Atomic write: the content goes to a temp file which is then renamed
    /// into place, so a crash never leaves a half-written transcript.
    pub fn rewrite(&self, content: &str) -> Result<()> {
        self.ensure_parent()?;
        let tmp_path = self.path.with_extension("log.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;
        debug!(
            "Rewrote transcript {} ({} bytes)",
            self.path.display(),
            content.len()
        );
        Ok(())
    }

    /// Append lines, each terminated by a newline, in a single write.
    pub fn append<S: AsRef<str>>(&self, lines: &[S]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        self.ensure_parent()?;
        let mut buf = String::new();
        for line in lines {
            buf.push_str(line.as_ref());
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(buf.as_bytes())
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Replace the newest entry `old` with `replacement` in one atomic rewrite.
    ///
    /// `old` may span several file lines (multi-line replies are written with
    /// embedded newlines). The file must end with exactly those lines;
    /// otherwise nothing is written and an `InvalidData` error is returned.
    pub fn replace_tail<S: AsRef<str>>(&self, old: &str, replacement: &[S]) -> Result<()> {
        let mut lines = self.read_lines()?;
        let old_lines: Vec<&str> = old.lines().collect();
        let start = lines
            .len()
            .checked_sub(old_lines.len())
            .filter(|&start| {
                lines[start..]
                    .iter()
                    .map(String::as_str)
                    .eq(old_lines.iter().copied())
            })
            .ok_or_else(|| {
                self.io_error(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "transcript does not end with the entry being replaced",
                ))
            })?;
        lines.truncate(start);

        let mut content = String::new();
        let kept = lines.iter().map(String::as_str);
        for line in kept.chain(replacement.iter().map(AsRef::as_ref)) {
            content.push_str(line);
            content.push('\n');
        }
        self.rewrite(&content)
    }

    fn ensure_parent(&self) -> Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))
            }
            _ => Ok(()),
        }
    }

    fn io_error(&self, source: std::io::Error) -> RelayError {
        RelayError::transcript(&self.path, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_lines() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transcript::new(dir.path().join("bob.log"));
        assert!(!t.exists());
        t.append(&["Alice: hi", "Bob: hello"]).unwrap();
        t.append(&["Alice: bye"]).unwrap();
        assert!(t.exists());
        assert_eq!(
            t.read_lines().unwrap(),
            vec!["Alice: hi", "Bob: hello", "Alice: bye"]
        );
    }

    #[test]
    fn rewrite_creates_parent_dirs_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/bob.log");
        let t = Transcript::new(&path);
        t.rewrite("<START>\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<START>\n");
        assert!(!path.with_extension("log.tmp").exists());
    }

    #[test]
    fn rewrite_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transcript::new(dir.path().join("bob.log"));
        t.append(&["old line"]).unwrap();
        t.rewrite("new\n").unwrap();
        assert_eq!(t.read_lines().unwrap(), vec!["new"]);
    }

    #[test]
    fn replace_tail_swaps_newest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transcript::new(dir.path().join("bob.log"));
        t.append(&["Bob: one", "Alice: two", "Bob: three"]).unwrap();
        t.replace_tail("Bob: three", &["Bob: 3"]).unwrap();
        assert_eq!(
            std::fs::read_to_string(t.path()).unwrap(),
            "Bob: one\nAlice: two\nBob: 3\n"
        );
        assert!(!t.path().with_extension("log.tmp").exists());
    }

    #[test]
    fn replace_tail_handles_multiline_entry() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transcript::new(dir.path().join("bob.log"));
        t.append(&["Alice: q", "Bob: first\nsecond"]).unwrap();
        t.replace_tail("Bob: first\nsecond", &["Bob: fresh"]).unwrap();
        assert_eq!(t.read_lines().unwrap(), vec!["Alice: q", "Bob: fresh"]);
    }

    #[test]
    fn replace_tail_rejects_mismatched_tail() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transcript::new(dir.path().join("bob.log"));
        t.append(&["Bob: old", "Alice: later"]).unwrap();
        let err = t.replace_tail("Bob: old", &["Bob: new"]).unwrap_err();
        assert!(matches!(err, RelayError::Transcript { .. }));
        assert_eq!(t.read_lines().unwrap(), vec!["Bob: old", "Alice: later"]);

        let err = t.replace_tail("a\nb\nc", &["x"]).unwrap_err();
        assert!(matches!(err, RelayError::Transcript { .. }));
    }

    #[test]
    fn reading_missing_file_is_transcript_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transcript::new(dir.path().join("missing.log"));
        assert!(matches!(
            t.read_lines(),
            Err(RelayError::Transcript { .. })
        ));
    }
}
