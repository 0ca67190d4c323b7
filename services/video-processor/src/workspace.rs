use crate::error::{PipelineError, PipelineResult};
use crate::event::VideoTask;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A scratch path that could not be deleted during release
#[derive(Debug, Clone)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub message: String,
}

/// What a workspace release managed to reclaim
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Number of files and directories deleted
    pub removed: usize,
    /// Deletions that failed and were skipped
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    fn warn(&mut self, path: &Path, error: impl std::fmt::Display) {
        warn!(path = %path.display(), error = %error, "Failed to delete scratch path");
        metrics::counter!("video.cleanup.warnings").increment(1);
        self.warnings.push(CleanupWarning {
            path: path.to_path_buf(),
            message: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Scratch paths owned by one pipeline run.
///
/// The workspace is released exactly once: explicitly through
/// [`Workspace::release`], or on drop if the run bailed out before that.
#[derive(Debug)]
pub struct Workspace {
    input_path: PathBuf,
    output_dir: PathBuf,
    /// Ancestors of the input file and output tree that `acquire` created
    created_dirs: Vec<PathBuf>,
    released: bool,
}

impl Workspace {
    /// Create the scratch layout for `task` under `scratch_root`.
    ///
    /// Directories left behind by an earlier, failed attempt are reused.
    pub async fn acquire(scratch_root: &Path, task: &VideoTask) -> PipelineResult<Self> {
        let input_path = scratch_root.join(&task.source_key);
        let output_dir = scratch_root.join(&task.video_base_name);

        let mut created_dirs = Vec::new();
        for dir in input_path.parent().into_iter().chain(output_dir.parent()) {
            for ancestor in dir.ancestors() {
                if ancestor == scratch_root || !ancestor.starts_with(scratch_root) {
                    break;
                }
                let exists = tokio::fs::try_exists(ancestor)
                    .await
                    .map_err(|e| PipelineError::workspace(ancestor, e))?;
                if !exists && !created_dirs.iter().any(|d| d == ancestor) {
                    created_dirs.push(ancestor.to_path_buf());
                }
            }
        }

        if let Some(parent) = input_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::workspace(parent, e))?;
        }

        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| PipelineError::workspace(&output_dir, e))?;

        debug!(
            input_path = %input_path.display(),
            output_dir = %output_dir.display(),
            "Workspace acquired"
        );

        Ok(Self {
            input_path,
            output_dir,
            created_dirs,
            released: false,
        })
    }

    /// Where the source video is downloaded to
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Where the decoder writes frames
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Delete the input file, the output tree and any parent directories
    /// `acquire` created, best effort.
    ///
    /// Runs synchronously so that `Drop` can share the same path.
    pub fn release(mut self) -> CleanupReport {
        self.cleanup()
    }

    fn cleanup(&mut self) -> CleanupReport {
        self.released = true;
        let mut report = CleanupReport::default();

        match std::fs::remove_file(&self.input_path) {
            Ok(()) => report.removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => report.warn(&self.input_path, e),
        }

        if std::fs::symlink_metadata(&self.output_dir).is_ok() {
            self.remove_output_tree(&mut report);
        }
        self.remove_created_dirs(&mut report);

        debug!(
            removed = report.removed,
            warnings = report.warnings.len(),
            "Workspace released"
        );

        report
    }

    fn remove_output_tree(&self, report: &mut CleanupReport) {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.output_dir) {
            match entry {
                Ok(entry) => {
                    let is_dir = entry.file_type().is_dir();
                    entries.push((entry.depth(), entry.into_path(), is_dir));
                }
                Err(e) => {
                    let path = e.path().unwrap_or(&self.output_dir).to_path_buf();
                    report.warn(&path, e);
                }
            }
        }

        // Deepest first, so a directory is only removed after its children
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        for (_, path, is_dir) in entries {
            let result = if is_dir {
                std::fs::remove_dir(&path)
            } else {
                std::fs::remove_file(&path)
            };

            match result {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => report.warn(&path, e),
            }
        }
    }

    /// Parents are shared between videos under the same prefix; one still in
    /// use by another workspace is left in place without a warning.
    fn remove_created_dirs(&self, report: &mut CleanupReport) {
        let mut dirs: Vec<&PathBuf> = self.created_dirs.iter().collect();
        dirs.sort_by(|a, b| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| b.cmp(a))
        });

        for dir in dirs {
            match std::fs::remove_dir(dir) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(_) if has_entries(dir) => {}
                Err(e) => report.warn(dir, e),
            }
        }
    }
}

fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut children| children.next().is_some())
        .unwrap_or(false)
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            self.cleanup();
        }
    }
}
