//! Textual edits of descriptor files.
//!
//! Edits operate on raw text, never on a re-serialised tree. Bytes outside
//! the removed entries are left untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use vboxkit_shared::errors::{VboxError, VboxResult};

/// Writer for a single descriptor file.
#[derive(Debug, Clone)]
pub struct ConfigEditor {
    path: PathBuf,
}

impl ConfigEditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<descriptor>.bak`, next to the descriptor.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Remove every self-closing `entry` element inside `section` elements.
    ///
    /// When `backup` is set the original file is copied to
    /// [`backup_path`](Self::backup_path) before anything is written. The
    /// rewrite goes through a temporary file in the same directory and is
    /// renamed into place.
    ///
    /// # Returns
    /// Number of entries removed. Zero leaves the file untouched.
    pub fn remove_media_entries(&self, section: &str, entry: &str, backup: bool) -> VboxResult<usize> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            VboxError::ConfigUnavailable(format!("{}: {}", self.path.display(), e))
        })?;

        if backup {
            let target = self.backup_path();
            fs::copy(&self.path, &target).map_err(|e| {
                VboxError::Storage(format!("failed to back up to {}: {}", target.display(), e))
            })?;
            tracing::debug!(backup = %target.display(), "Backed up machine descriptor");
        }

        let (edited, removed) = strip_section_entries(&content, section, entry)?;
        if removed == 0 {
            return Ok(0);
        }

        self.write_atomic(&edited)?;
        tracing::info!(
            path = %self.path.display(),
            section,
            removed,
            "Removed media entries from descriptor"
        );
        Ok(removed)
    }

    pub fn remove_dvd_images(&self, backup: bool) -> VboxResult<usize> {
        self.remove_media_entries("DVDImages", "Image", backup)
    }

    fn write_atomic(&self, content: &str) -> VboxResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let storage = |e: std::io::Error| {
            VboxError::Storage(format!("failed to rewrite {}: {}", self.path.display(), e))
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage)?;
        tmp.write_all(content.as_bytes()).map_err(storage)?;
        tmp.as_file().sync_all().map_err(storage)?;
        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(tmp.path(), meta.permissions()).map_err(storage)?;
        }
        tmp.persist(&self.path).map_err(|e| storage(e.error))?;
        Ok(())
    }
}

/// Strip self-closing `entry` elements from every `section` block of `content`.
///
/// Whole lines are removed, including their indentation and line break.
/// Text outside the matched sections is returned unchanged.
pub fn strip_section_entries(content: &str, section: &str, entry: &str) -> VboxResult<(String, usize)> {
    let section_re = Regex::new(&format!(
        r"(?s)<(?:[\w.-]+:)?{0}(?:\s[^>]*[^/>])?\s*>.*?</(?:[\w.-]+:)?{0}\s*>",
        regex::escape(section)
    ))
    .map_err(|e| VboxError::InvalidArgument(format!("bad section name {:?}: {}", section, e)))?;
    let entry_re = Regex::new(&format!(
        r"[ \t]*<(?:[\w.-]+:)?{}(?:\s[^>]*)?/>[ \t]*(?:\r?\n)?",
        regex::escape(entry)
    ))
    .map_err(|e| VboxError::InvalidArgument(format!("bad entry name {:?}: {}", entry, e)))?;

    let mut removed = 0;
    let edited = section_re.replace_all(content, |caps: &Captures<'_>| {
        let block = &caps[0];
        removed += entry_re.find_iter(block).count();
        entry_re.replace_all(block, "").into_owned()
    });
    Ok((edited.into_owned(), removed))
}
