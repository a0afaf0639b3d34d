//! Classification run.
//!
//! A run walks the source tree once, then files every regular file under
//! `target/yyyy/yyyy_MM/` according to the date in its name. Each decision is
//! reported to the progress sink as it happens. Per-file failures are reported
//! and counted but never stop the run; only an unusable source directory does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{FileOutcome, FileRecord, JobConfig, Mode, RunSummary};
use crate::naming::{self, DateError};
use crate::progress::{emit, ProgressEvent, ProgressSink};

/// Shared flag asking a run to stop before its next file.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Run a classification to completion.
pub fn run(config: &JobConfig, sink: &dyn ProgressSink) -> RunSummary {
    run_with_cancel(config, sink, &CancelToken::new())
}

/// Run a classification, checking `cancel` before each file.
///
/// Returns a zero summary after a single ERROR event if the source directory
/// is missing or unreadable. Otherwise the sink sees the file count, one or
/// more events per file, the summary line, and finally COMPLETE.
pub fn run_with_cancel(
    config: &JobConfig,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> RunSummary {
    tracing::info!(
        source = %config.source_dir.display(),
        target = %config.target_dir.display(),
        mode = %config.mode,
        "classification started"
    );

    let enumeration = match fs_ops::enumerate_files(&config.source_dir) {
        Ok(enumeration) => enumeration,
        Err(e) => {
            tracing::error!(error = %e, "source folder unusable");
            emit(sink, ProgressEvent::error(fatal_message(config, &e)));
            return RunSummary::default();
        }
    };

    for (path, cause) in &enumeration.unreadable {
        tracing::warn!(path = %path.display(), cause = %cause, "entry could not be read");
        emit(
            sink,
            ProgressEvent::warn(format!("could not read '{}': {}; skipped", path.display(), cause)),
        );
    }

    let mut summary = RunSummary {
        total_files: enumeration.files.len(),
        ..RunSummary::default()
    };
    emit(
        sink,
        ProgressEvent::info(format!(
            "found {} files (subfolders included, source: {})",
            summary.total_files,
            config.source_dir.display()
        )),
    );

    for path in enumeration.files {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            tracing::warn!(visited = summary.visited_files(), total = summary.total_files, "classification cancelled");
            emit(
                sink,
                ProgressEvent::warn(format!(
                    "run cancelled after {} of {} files",
                    summary.visited_files(),
                    summary.total_files
                )),
            );
            break;
        }

        let mut record = FileRecord::new(path);
        let outcome = classify_file(config, &mut record, sink);
        record.outcome = Some(outcome);
        summary.record(outcome);
    }

    let line = format!("finished: {}", summary);
    tracing::info!("{}", line);
    emit(sink, ProgressEvent::info(line));
    emit(sink, ProgressEvent::complete("classification finished"));

    summary
}

fn fatal_message(config: &JobConfig, error: &EngineError) -> String {
    match error {
        EngineError::SourceNotFound { .. } | EngineError::SourceNotDirectory { .. } => format!(
            "source folder '{}' not found or not a directory",
            config.source_dir.display()
        ),
        other => format!("fatal: could not read source folder: {}", other),
    }
}

/// Decide and carry out what happens to one file.
fn classify_file(config: &JobConfig, record: &mut FileRecord, sink: &dyn ProgressSink) -> FileOutcome {
    if config.is_marked_for_deletion(&record.file_name) {
        return match fs_ops::remove_file(&record.source_path) {
            Ok(()) => {
                tracing::info!(file = %record.file_name, "deleted (delete list)");
                emit(sink, ProgressEvent::info(format!("deleted '{}' (delete list)", record.file_name)));
                FileOutcome::Deleted
            }
            Err(e) => fail(record, e, sink),
        };
    }

    let parsed = naming::date_prefix(&record.file_name).and_then(|prefix| {
        let date = naming::parse_date_prefix(&prefix)
            .ok_or_else(|| DateError::InvalidFormat(record.file_name.clone()));
        record.date_prefix = Some(prefix);
        date
    });
    let date = match parsed {
        Ok(date) => date,
        Err(e) => {
            tracing::warn!(file = %record.file_name, reason = %e, "no date in filename");
            emit(sink, ProgressEvent::warn(format!("{}; skipped", e)));
            return FileOutcome::Skipped;
        }
    };
    record.date = Some(date);

    match place_file(config, record, date, sink) {
        Ok(outcome) => outcome,
        Err(e) => fail(record, e, sink),
    }
}

/// Steps that touch the target tree; any error is a per-file failure.
fn place_file(
    config: &JobConfig,
    record: &mut FileRecord,
    date: chrono::NaiveDate,
    sink: &dyn ProgressSink,
) -> Result<FileOutcome, EngineError> {
    let dated_dir = naming::dated_dir(&config.target_dir, date);
    fs_ops::ensure_dir(&dated_dir)?;

    let target_file = dated_dir.join(&record.file_name);
    if fs_ops::path_occupied(&target_file) {
        emit(
            sink,
            ProgressEvent::warn(format!(
                "'{}' already exists in target; moving to trash",
                record.file_name
            )),
        );
        return send_to_trash(config, record, date, sink);
    }

    record.target_path = Some(target_file.clone());
    match config.mode {
        Mode::Copy => {
            fs_ops::copy_file_with_metadata(&record.source_path, &target_file)?;
        }
        Mode::Move => fs_ops::move_file(&record.source_path, &target_file)?,
    }

    tracing::debug!(
        from = %record.source_path.display(),
        to = %target_file.display(),
        mode = %config.mode,
        "filed"
    );
    emit(
        sink,
        ProgressEvent::info(format!(
            "{} '{}' -> {}",
            config.mode.verb(),
            record.file_name,
            naming::date_label(date)
        )),
    );
    Ok(FileOutcome::Processed)
}

/// Park a colliding file in the trash tree, or drop it if trash has one too.
fn send_to_trash(
    config: &JobConfig,
    record: &mut FileRecord,
    date: chrono::NaiveDate,
    sink: &dyn ProgressSink,
) -> Result<FileOutcome, EngineError> {
    let trash_dir = naming::dated_dir(&config.trash_root(), date);
    fs_ops::ensure_dir(&trash_dir)?;

    let trash_file = trash_dir.join(&record.file_name);
    record.target_path = Some(trash_file.clone());

    match fs_ops::move_file(&record.source_path, &trash_file) {
        Ok(()) => {
            tracing::info!(file = %record.file_name, trash = %trash_file.display(), "duplicate moved to trash");
            Ok(FileOutcome::Trashed)
        }
        Err(EngineError::DestinationExists { .. }) => {
            fs_ops::remove_file(&record.source_path)?;
            tracing::info!(file = %record.file_name, "already in trash; duplicate source deleted");
            emit(
                sink,
                ProgressEvent::info(format!(
                    "'{}' already in trash; deleted duplicate source",
                    record.file_name
                )),
            );
            Ok(FileOutcome::Discarded)
        }
        Err(e) => Err(e),
    }
}

fn fail(record: &mut FileRecord, error: EngineError, sink: &dyn ProgressSink) -> FileOutcome {
    tracing::error!(file = %record.source_path.display(), error = %error, "failed to process file");
    emit(
        sink,
        ProgressEvent::error(format!("failed to process '{}': {}", record.file_name, error)),
    );
    record.error_message = Some(error.to_string());
    FileOutcome::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{MemorySink, ProgressLevel};
    use std::fs;
    use std::path::Path;

    fn config(src: &Path, dst: &Path, mode: Mode) -> JobConfig {
        JobConfig::new(src, dst, mode, "trash", vec!["Thumbs.db".to_string()])
            .expect("valid config")
    }

    fn setup() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&src).expect("Failed to create src dir");
        (temp_dir, src, dst)
    }

    #[test]
    fn test_copy_files_into_dated_tree() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("20230515_photo.jpg"), b"jpeg").expect("write");

        let sink = MemorySink::new();
        let summary = run(&config(&src, &dst, Mode::Copy), &sink);

        let placed = dst.join("2023").join("2023_05").join("20230515_photo.jpg");
        assert_eq!(fs::read(&placed).expect("placed file"), b"jpeg");
        assert!(src.join("20230515_photo.jpg").exists(), "copy keeps the source");
        assert_eq!(summary.processed_files, 1);
        assert!(summary.is_balanced());

        let infos = sink.of_level(ProgressLevel::Info);
        assert!(infos.iter().any(|e| e.message == "copied '20230515_photo.jpg' -> 2023/05"));
    }

    #[test]
    fn test_move_removes_source() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("20230515_photo.jpg"), b"jpeg").expect("write");

        let summary = run(&config(&src, &dst, Mode::Move), &MemorySink::new());

        assert!(dst.join("2023/2023_05/20230515_photo.jpg").exists());
        assert!(!src.join("20230515_photo.jpg").exists());
        assert_eq!(summary.processed_files, 1);
    }

    #[test]
    fn test_camera_prefix_file_lands_on_same_date() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("IMG_20230515_0001.jpg"), b"jpeg").expect("write");

        run(&config(&src, &dst, Mode::Copy), &MemorySink::new());

        assert!(dst.join("2023/2023_05/IMG_20230515_0001.jpg").exists());
    }

    #[test]
    fn test_undated_names_are_skipped_with_warnings() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("ab.txt"), b"short").expect("write");
        fs::write(src.join("abcdefgh.txt"), b"letters").expect("write");

        let sink = MemorySink::new();
        let summary = run(&config(&src, &dst, Mode::Move), &sink);

        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.skipped_files, 2);
        assert!(summary.is_balanced());
        assert!(src.join("ab.txt").exists());
        assert!(src.join("abcdefgh.txt").exists());

        let warnings = sink.of_level(ProgressLevel::Warn);
        assert!(warnings
            .iter()
            .any(|e| e.message.contains("'ab.txt' does not start with yyyyMMdd")));
        assert!(warnings
            .iter()
            .any(|e| e.message.contains("'abcdefgh.txt' has an invalid date format")));
        assert!(sink.of_level(ProgressLevel::Error).is_empty());
        assert_eq!(sink.events().last().map(|e| e.level), Some(ProgressLevel::Complete));
    }

    #[test]
    fn test_day_past_month_end_files_under_that_month() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("20230230_feb.jpg"), b"feb").expect("write");
        fs::write(src.join("20230431_apr.jpg"), b"apr").expect("write");
        fs::write(src.join("00000101_zero.jpg"), b"zero").expect("write");

        let sink = MemorySink::new();
        let summary = run(&config(&src, &dst, Mode::Copy), &sink);

        assert!(dst.join("2023/2023_02/20230230_feb.jpg").exists());
        assert!(dst.join("2023/2023_04/20230431_apr.jpg").exists());
        assert!(!dst.join("0000").exists());
        assert_eq!(summary.processed_files, 2);
        assert_eq!(summary.skipped_files, 1);
        assert!(sink
            .of_level(ProgressLevel::Warn)
            .iter()
            .any(|e| e.message == "'00000101_zero.jpg' has an invalid date format; skipped"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subfolder_is_warned_not_counted() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, src, dst) = setup();
        let locked = src.join("locked");
        fs::create_dir(&locked).expect("mkdir");
        fs::write(locked.join("20230101_hidden.jpg"), b"x").expect("write");
        fs::write(src.join("20230515_a.jpg"), b"a").expect("write");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        // Privileged users can still list the folder; nothing to observe then.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");
            return;
        }

        let sink = MemorySink::new();
        let summary = run(&config(&src, &dst, Mode::Copy), &sink);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");

        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.processed_files, 1);
        assert!(summary.is_balanced());
        let warnings = sink.of_level(ProgressLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.starts_with("could not read '"));
        assert!(warnings[0].message.contains("locked"));
        assert!(sink.of_level(ProgressLevel::Error).is_empty());
        assert!(sink.events()[1].message.starts_with("found 1 files"));
    }

    #[test]
    fn test_collision_moves_source_to_trash() {
        let (_tmp, src, dst) = setup();
        let dated = dst.join("2023/2023_05");
        fs::create_dir_all(&dated).expect("mkdir");
        fs::write(dated.join("20230515_photo.jpg"), b"first").expect("write");
        fs::write(src.join("20230515_photo.jpg"), b"second").expect("write");

        let sink = MemorySink::new();
        let summary = run(&config(&src, &dst, Mode::Copy), &sink);

        let trashed = dst.join("trash/2023/2023_05/20230515_photo.jpg");
        assert_eq!(fs::read(&trashed).expect("trashed file"), b"second");
        assert_eq!(fs::read(dated.join("20230515_photo.jpg")).expect("kept"), b"first");
        assert!(!src.join("20230515_photo.jpg").exists());
        assert_eq!(summary.skipped_files, 1);
        assert!(sink
            .of_level(ProgressLevel::Warn)
            .iter()
            .any(|e| e.message.contains("already exists in target; moving to trash")));
    }

    #[test]
    fn test_second_run_trashes_the_repeat() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("20230515_photo.jpg"), b"v1").expect("write");
        let cfg = config(&src, &dst, Mode::Copy);

        let first = run(&cfg, &MemorySink::new());
        assert_eq!(first.processed_files, 1);

        let second = run(&cfg, &MemorySink::new());
        assert_eq!(second.skipped_files, 1);
        assert!(dst.join("trash/2023/2023_05/20230515_photo.jpg").exists());
        assert!(!src.join("20230515_photo.jpg").exists());
    }

    #[test]
    fn test_trash_also_occupied_deletes_duplicate() {
        let (_tmp, src, dst) = setup();
        fs::create_dir_all(dst.join("2023/2023_05")).expect("mkdir");
        fs::create_dir_all(dst.join("trash/2023/2023_05")).expect("mkdir");
        fs::write(dst.join("2023/2023_05/20230515_photo.jpg"), b"kept").expect("write");
        fs::write(dst.join("trash/2023/2023_05/20230515_photo.jpg"), b"earliest").expect("write");
        fs::write(src.join("20230515_photo.jpg"), b"latest").expect("write");

        let sink = MemorySink::new();
        let summary = run(&config(&src, &dst, Mode::Move), &sink);

        assert!(!src.join("20230515_photo.jpg").exists());
        assert_eq!(
            fs::read(dst.join("trash/2023/2023_05/20230515_photo.jpg")).expect("trash"),
            b"earliest"
        );
        assert_eq!(summary.skipped_files, 1);
        assert!(summary.is_balanced());
        assert!(sink.of_level(ProgressLevel::Error).is_empty());
    }

    #[test]
    fn test_missing_source_is_single_error() {
        let (_tmp, src, dst) = setup();
        let missing = src.join("does-not-exist");

        let sink = MemorySink::new();
        let summary = run(&config(&missing, &dst, Mode::Move), &sink);

        assert_eq!(summary, RunSummary::default());
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, ProgressLevel::Error);
        assert!(events[0].message.contains("not found or not a directory"));
        assert!(!dst.exists(), "nothing created under target");
    }

    #[test]
    fn test_delete_list_files_are_removed() {
        let (_tmp, src, dst) = setup();
        fs::create_dir(src.join("album")).expect("mkdir");
        fs::write(src.join("album").join("Thumbs.db"), b"cache").expect("write");
        fs::write(src.join("album").join("20230515_a.jpg"), b"jpeg").expect("write");

        let summary = run(&config(&src, &dst, Mode::Copy), &MemorySink::new());

        assert!(!src.join("album/Thumbs.db").exists());
        assert_eq!(summary.deleted_files, 1);
        assert_eq!(summary.processed_files, 1);
        assert!(summary.is_balanced());

        let leaked = walkdir::WalkDir::new(&dst)
            .into_iter()
            .filter_map(Result::ok)
            .any(|e| e.file_name() == "Thumbs.db");
        assert!(!leaked);
    }

    #[test]
    fn test_io_failure_is_contained() {
        let (_tmp, src, dst) = setup();
        fs::create_dir_all(&dst).expect("mkdir");
        // A plain file where the year folder should be makes directory creation fail.
        fs::write(dst.join("2023"), b"blocker").expect("write");
        fs::write(src.join("20230515_a.jpg"), b"a").expect("write");
        fs::write(src.join("20240101_b.jpg"), b"b").expect("write");

        let sink = MemorySink::new();
        let summary = run(&config(&src, &dst, Mode::Move), &sink);

        assert_eq!(summary.processed_files, 1);
        assert_eq!(summary.skipped_files, 1);
        assert!(summary.is_balanced());
        assert!(src.join("20230515_a.jpg").exists(), "failed file stays put");
        assert!(dst.join("2024/2024_01/20240101_b.jpg").exists());

        let errors = sink.of_level(ProgressLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("20230515_a.jpg"));
        assert_eq!(sink.events().last().map(|e| e.level), Some(ProgressLevel::Complete));
    }

    #[test]
    fn test_cancelled_run_stops_before_files() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("20230515_a.jpg"), b"a").expect("write");

        let cancel = CancelToken::new();
        cancel.cancel();
        let sink = MemorySink::new();
        let summary = run_with_cancel(&config(&src, &dst, Mode::Move), &sink, &cancel);

        assert!(summary.cancelled);
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.visited_files(), 0);
        assert!(src.join("20230515_a.jpg").exists());
        assert_eq!(sink.events().last().map(|e| e.level), Some(ProgressLevel::Complete));
    }

    #[test]
    fn test_event_order_brackets_the_run() {
        let (_tmp, src, dst) = setup();
        fs::write(src.join("20230515_a.jpg"), b"a").expect("write");

        let sink = MemorySink::new();
        run(&config(&src, &dst, Mode::Copy), &sink);
        let events = sink.events();

        assert!(events[0].message.starts_with("found 1 files"));
        let summary_line = &events[events.len() - 2];
        assert_eq!(summary_line.level, ProgressLevel::Info);
        assert!(summary_line.message.starts_with("finished: 1 files, 1 processed"));
        assert_eq!(events[events.len() - 1].level, ProgressLevel::Complete);
    }
}
