//! Staging store: the per-phase working directories of one run.
//!
//! Every phase writes into its own directory and the next phase reads it.
//! Before a producer writes, its directory is created and emptied
//! ([`ensure`] + [`clear`]) so leftovers from an earlier, possibly failed,
//! run can never leak into the output.
//!
//! Deletion is best-effort throughout: a file that cannot be removed is
//! logged and reported as a [`PipelineWarning`], never as an error.

use crate::error::{PdfGridError, PipelineWarning};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One staging directory per producing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Page images written by the rasteriser.
    Rasterized,
    /// Output of tonal stage 1.
    Stage1,
    /// Output of tonal stage 2.
    Stage2,
    /// Output of the final tonal stage; read by the grid assembler.
    Final,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Rasterized, Phase::Stage1, Phase::Stage2, Phase::Final];

    pub fn dir_name(self) -> &'static str {
        match self {
            Phase::Rasterized => "rasterized",
            Phase::Stage1 => "stage1",
            Phase::Stage2 => "stage2",
            Phase::Final => "final",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Create `dir` and its parents. Idempotent.
pub fn ensure(dir: &Path) -> Result<(), PdfGridError> {
    std::fs::create_dir_all(dir).map_err(|source| PdfGridError::StagingIo {
        path: dir.to_path_buf(),
        source,
    })
}

/// Delete every direct-child file of `dir`.
///
/// Subdirectories are left alone. A missing `dir` is a no-op.
pub fn clear(dir: &Path) -> Vec<PipelineWarning> {
    let mut warnings = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return warnings,
        Err(e) => {
            warn!("Could not list '{}' for clearing: {}", dir.display(), e);
            warnings.push(PipelineWarning::CleanupFailed {
                path: dir.to_path_buf(),
                detail: e.to_string(),
            });
            return warnings;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Could not read entry in '{}': {}", dir.display(), e);
                warnings.push(PipelineWarning::CleanupFailed {
                    path: dir.to_path_buf(),
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        if path.is_dir() {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale '{}'", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Could not delete '{}': {}", path.display(), e);
                warnings.push(PipelineWarning::CleanupFailed {
                    path,
                    detail: e.to_string(),
                });
            }
        }
    }

    warnings
}

/// Recursively delete `dir`. A missing `dir` is a no-op.
pub fn remove_all(dir: &Path) -> Option<PipelineWarning> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!("Removed '{}'", dir.display());
            None
        }
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Could not remove '{}': {}", dir.display(), e);
            Some(PipelineWarning::CleanupFailed {
                path: dir.to_path_buf(),
                detail: e.to_string(),
            })
        }
    }
}

/// The staging directories owned by one run, rooted at `<work_dir>/<run_id>`.
///
/// Directories are created lazily by [`StagingArea::prepare`]. Dropping the
/// area removes whatever is left of the root, so a panicking run still
/// cleans up after itself.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    warnings: Vec<PipelineWarning>,
}

impl StagingArea {
    pub fn new(work_dir: &Path, run_id: &str) -> Self {
        Self {
            root: work_dir.join(run_id),
            warnings: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, phase: Phase) -> PathBuf {
        self.root.join(phase.dir_name())
    }

    /// Ensure and clear the directory of `phase`, returning its path.
    pub fn prepare(&mut self, phase: Phase) -> Result<PathBuf, PdfGridError> {
        let dir = self.dir(phase);
        ensure(&dir)?;
        let stale = clear(&dir);
        self.warnings.extend(stale);
        Ok(dir)
    }

    /// Remove the directory of `phase`.
    pub fn release(&mut self, phase: Phase) {
        let dir = self.dir(phase);
        self.warnings.extend(remove_all(&dir));
    }

    /// Remove every phase directory and the run root.
    pub fn release_all(&mut self) {
        for phase in Phase::ALL {
            self.release(phase);
        }
        let root = self.root.clone();
        self.warnings.extend(remove_all(&root));
    }

    /// Record warnings produced by a component that manages a staging
    /// directory itself.
    pub fn absorb(&mut self, warnings: impl IntoIterator<Item = PipelineWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn take_warnings(&mut self) -> Vec<PipelineWarning> {
        std::mem::take(&mut self.warnings)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.root.exists() {
            if let Some(w) = remove_all(&self.root) {
                warn!("Staging area dropped with leftovers: {}", w);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a/b/c");
        ensure(&dir).unwrap();
        ensure(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn clear_missing_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert!(clear(&tmp.path().join("absent")).is_empty());
    }

    #[test]
    fn clear_removes_files_but_not_subdirs() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("one.png"), b"x").unwrap();
        std::fs::write(tmp.path().join("two.txt"), b"y").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested/keep.png"), b"z").unwrap();

        let warnings = clear(tmp.path());
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(!tmp.path().join("one.png").exists());
        assert!(!tmp.path().join("two.txt").exists());
        assert!(tmp.path().join("nested/keep.png").exists());
    }

    #[test]
    fn remove_all_missing_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert!(remove_all(&tmp.path().join("absent")).is_none());
    }

    #[test]
    fn remove_all_is_recursive() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("stage");
        std::fs::create_dir_all(dir.join("deep")).unwrap();
        std::fs::write(dir.join("deep/f.png"), b"x").unwrap();
        assert!(remove_all(&dir).is_none());
        assert!(!dir.exists());
    }

    #[test]
    fn prepare_empties_leftovers() {
        let tmp = TempDir::new().unwrap();
        let mut area = StagingArea::new(tmp.path(), "run-1");
        let dir = area.prepare(Phase::Stage1).unwrap();
        std::fs::write(dir.join("stale.png"), b"old").unwrap();

        let again = area.prepare(Phase::Stage1).unwrap();
        assert_eq!(dir, again);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn release_all_removes_root() {
        let tmp = TempDir::new().unwrap();
        let mut area = StagingArea::new(tmp.path(), "run-2");
        for phase in Phase::ALL {
            area.prepare(phase).unwrap();
        }
        area.release_all();
        assert!(!area.root().exists());
        assert!(area.take_warnings().is_empty());
    }

    #[test]
    fn drop_removes_root() {
        let tmp = TempDir::new().unwrap();
        let root = {
            let mut area = StagingArea::new(tmp.path(), "run-3");
            area.prepare(Phase::Final).unwrap();
            area.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
