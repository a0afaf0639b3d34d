//! Filesystem operations module.
//!
//! This module provides the low-level operations the classifier is built on:
//! - Enumerating the regular files of a source tree
//! - Copying files with modification time preservation, never overwriting
//! - Moving files, across filesystems if needed
//! - Creating directories recursively and deleting files

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::EngineError;

/// Result of walking a source tree.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Regular files, in walk order
    pub files: Vec<PathBuf>,

    /// Entries below the root that could not be read, with the cause
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Check that `source` is a readable directory.
///
/// # Errors
/// `SourceNotFound` if nothing exists there, `SourceNotDirectory` if it is not a
/// directory, `SourceUnreadable` if its metadata or listing cannot be read.
pub fn check_source_dir(source: &Path) -> Result<(), EngineError> {
    match fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::SourceNotDirectory {
                path: source.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: source.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::SourceUnreadable {
                path: source.to_path_buf(),
                source: e,
            })
        }
    }

    fs::read_dir(source)
        .map(|_| ())
        .map_err(|e| EngineError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        })
}

/// Enumerate every regular file below `source`, subdirectories included.
///
/// Entries within a directory are visited in file-name order. Symbolic links
/// are not followed. Failures below the root are collected in
/// `Enumeration::unreadable` rather than aborting the walk.
///
/// # Errors
/// Returns `EngineError` if the root itself cannot be read.
pub fn enumerate_files(source: &Path) -> Result<Enumeration, EngineError> {
    check_source_dir(source)?;

    let mut enumeration = Enumeration::default();
    for entry in WalkDir::new(source).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    enumeration.files.push(entry.into_path());
                }
            }
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source.to_path_buf());
                if e.depth() == 0 {
                    let source_err = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                    return Err(EngineError::SourceUnreadable {
                        path,
                        source: source_err,
                    });
                }
                enumeration.unreadable.push((path, e.to_string()));
            }
        }
    }

    Ok(enumeration)
}

/// Create `dir` and all of its ancestors; succeeds if it already exists.
///
/// # Errors
/// Returns `DirectoryCreationFailed` if creation fails or a non-directory is in
/// the way.
pub fn ensure_dir(dir: &Path) -> Result<(), EngineError> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| EngineError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// True if anything (file, directory, dangling link) occupies `path`.
pub fn path_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Copy a file from source to destination with modification time preservation.
///
/// The destination must not exist. A partially written destination is removed
/// before the error is returned.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// `DestinationExists` if something is already at `dst`, otherwise
/// `ReadError`/`WriteError` naming the side that failed.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_mtime = src_metadata.modified().ok();

    let mut dst_file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                EngineError::DestinationExists {
                    path: dst.to_path_buf(),
                }
            } else {
                EngineError::WriteError {
                    path: dst.to_path_buf(),
                    source: e,
                }
            }
        })?;

    let bytes_copied = match io::copy(&mut src_file, &mut dst_file) {
        Ok(bytes) => bytes,
        Err(e) => {
            drop(dst_file);
            let _ = fs::remove_file(dst);
            return Err(EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            });
        }
    };
    drop(dst_file);

    if let Some(mtime) = src_mtime {
        if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)) {
            tracing::debug!(path = %dst.display(), error = %e, "could not preserve modification time");
        }
    }

    Ok(bytes_copied)
}

/// Move a file to a destination that must not exist yet.
///
/// Tries a rename first. If that fails (typically because the destination is
/// on another filesystem) the file is copied and the source removed; if the
/// source cannot be removed the copy is rolled back.
///
/// # Errors
/// `DestinationExists` if something is already at `dst`, `MoveFailed` or a
/// copy error otherwise.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), EngineError> {
    if path_occupied(dst) {
        return Err(EngineError::DestinationExists {
            path: dst.to_path_buf(),
        });
    }
    ensure_parent_dir_exists(dst)?;

    let rename_err = match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if !path_occupied(src) {
        return Err(EngineError::MoveFailed {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: rename_err,
        });
    }

    tracing::debug!(
        from = %src.display(),
        to = %dst.display(),
        error = %rename_err,
        "rename failed, falling back to copy and remove"
    );
    copy_file_with_metadata(src, dst)?;

    if let Err(e) = fs::remove_file(src) {
        let _ = fs::remove_file(dst);
        return Err(EngineError::MoveFailed {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: e,
        });
    }

    Ok(())
}

/// Delete a single file.
pub fn remove_file(path: &Path) -> Result<(), EngineError> {
    fs::remove_file(path).map_err(|e| EngineError::DeleteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
