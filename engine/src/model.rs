//! Core data model for classification runs.
//!
//! This module defines the values that flow through a run:
//! - JobConfig: the immutable description of one run
//! - FileRecord: the per-file working record
//! - Mode, FileOutcome: enums controlling and describing behavior
//! - RunSummary: counters returned once a run ends

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::EngineError;

/// Folder under the target directory that receives colliding duplicates.
pub const DEFAULT_TRASH_FOLDER: &str = "trash";

/// The operation mode for a classification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Copy files; source remains unchanged
    #[default]
    Copy,
    /// Move files; source removed after a successful transfer
    Move,
}

impl Mode {
    /// Interpret the configured working mode.
    ///
    /// Only the exact value `MOVE` selects move semantics; anything else,
    /// including an empty value, means copy.
    pub fn from_working_mode(value: &str) -> Self {
        if value == "MOVE" {
            Mode::Move
        } else {
            Mode::Copy
        }
    }

    /// Past-tense verb used in progress messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Mode::Copy => "copied",
            Mode::Move => "moved",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Copy => write!(f, "Copy"),
            Mode::Move => write!(f, "Move"),
        }
    }
}

/// Everything a single run needs, resolved before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Root of the tree to classify
    pub source_dir: PathBuf,

    /// Root of the dated tree
    pub target_dir: PathBuf,

    /// Copy or Move
    pub mode: Mode,

    /// Subfolder of `target_dir` mirroring the dated tree for duplicates
    pub trash_folder_name: String,

    /// Filenames deleted outright instead of classified (exact match)
    pub delete_file_list: HashSet<String>,
}

impl JobConfig {
    /// Build a job configuration, rejecting values no run could use.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidConfig` if either directory is empty or the
    /// trash folder name is empty or contains a path separator.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        source_dir: P,
        target_dir: Q,
        mode: Mode,
        trash_folder_name: impl Into<String>,
        delete_file_list: impl IntoIterator<Item = String>,
    ) -> Result<Self, EngineError> {
        let source_dir = source_dir.as_ref();
        let target_dir = target_dir.as_ref();
        let trash_folder_name = trash_folder_name.into();

        if source_dir.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "source directory is empty".to_string(),
            });
        }
        if target_dir.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "target directory is empty".to_string(),
            });
        }
        if trash_folder_name.trim().is_empty()
            || trash_folder_name.contains(['/', '\\'])
            || trash_folder_name == "."
            || trash_folder_name == ".."
        {
            return Err(EngineError::InvalidConfig {
                reason: format!("trash folder name '{}' is not a plain folder name", trash_folder_name),
            });
        }

        Ok(JobConfig {
            source_dir: source_dir.to_path_buf(),
            target_dir: target_dir.to_path_buf(),
            mode,
            trash_folder_name,
            delete_file_list: delete_file_list.into_iter().collect(),
        })
    }

    /// Root of the trash tree.
    pub fn trash_root(&self) -> PathBuf {
        self.target_dir.join(&self.trash_folder_name)
    }

    /// True if `file_name` is on the delete list.
    pub fn is_marked_for_deletion(&self, file_name: &str) -> bool {
        self.delete_file_list.contains(file_name)
    }
}

/// Terminal outcome of one discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Filed into the dated tree
    Processed,
    /// Left in place because no date could be read from its name
    Skipped,
    /// Removed because its name is on the delete list
    Deleted,
    /// Collided with an existing file and was parked in the trash tree
    Trashed,
    /// Collided in both the dated tree and the trash tree and was deleted
    Discarded,
    /// An I/O error interrupted its handling
    Failed,
}

impl FileOutcome {
    /// True for every outcome tallied as skipped in the run summary.
    pub fn counts_as_skipped(&self) -> bool {
        matches!(
            self,
            FileOutcome::Skipped | FileOutcome::Trashed | FileOutcome::Discarded | FileOutcome::Failed
        )
    }
}

/// Working record for one regular file discovered under the source tree.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute source path
    pub source_path: PathBuf,

    /// Final path component, lossily converted
    pub file_name: String,

    /// The eight characters the date was read from
    pub date_prefix: Option<String>,

    /// Parsed capture date
    pub date: Option<NaiveDate>,

    /// Resolved destination (dated tree or trash tree)
    pub target_path: Option<PathBuf>,

    /// Terminal outcome, set exactly once
    pub outcome: Option<FileOutcome>,

    /// Human-readable failure cause
    pub error_message: Option<String>,
}

impl FileRecord {
    /// Create a pending record for a discovered file.
    pub fn new(source_path: PathBuf) -> Self {
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        FileRecord {
            source_path,
            file_name,
            date_prefix: None,
            date: None,
            target_path: None,
            outcome: None,
            error_message: None,
        }
    }
}

/// Counters accumulated during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Regular files discovered under the source tree
    pub total_files: usize,

    /// Files filed into the dated tree
    pub processed_files: usize,

    /// Files not filed: undated names, collisions, failures
    pub skipped_files: usize,

    /// Files removed because of the delete list
    pub deleted_files: usize,

    /// Run stopped early at a caller's request
    pub cancelled: bool,
}

impl RunSummary {
    /// Tally one terminal outcome.
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Processed => self.processed_files += 1,
            FileOutcome::Deleted => self.deleted_files += 1,
            other if other.counts_as_skipped() => self.skipped_files += 1,
            _ => {}
        }
    }

    /// Files that reached a terminal outcome.
    pub fn visited_files(&self) -> usize {
        self.processed_files + self.skipped_files + self.deleted_files
    }

    /// True when every discovered file has been accounted for.
    pub fn is_balanced(&self) -> bool {
        self.visited_files() == self.total_files
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files, {} processed, {} skipped, {} deleted",
            self.total_files, self.processed_files, self.skipped_files, self.deleted_files
        )
    }
}
