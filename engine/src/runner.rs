//! Background job execution.
//!
//! `JobRunner::start` resolves the request against the configured settings,
//! opens the job's progress channel, and hands the run to a dedicated worker
//! thread. The caller gets a `JobHandle` back immediately and reads events from
//! it until the channel closes.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use uuid::Uuid;

use crate::classifier::{self, CancelToken};
use crate::config::{DirOverrides, Settings};
use crate::error::EngineError;
use crate::model::{JobConfig, RunSummary};
use crate::progress::{emit, ChannelSink, ProgressEvent};

/// Lifetime of a progress channel unless configured otherwise.
pub const DEFAULT_CHANNEL_TIMEOUT: Duration =
    Duration::from_secs(crate::config::DEFAULT_CHANNEL_TIMEOUT_SECS);

/// Starts classification jobs from configured defaults plus request overrides.
#[derive(Debug, Clone)]
pub struct JobRunner {
    settings: Settings,
    channel_timeout: Duration,
}

impl JobRunner {
    pub fn new(settings: Settings) -> Self {
        let channel_timeout = settings.channel_timeout();
        JobRunner {
            settings,
            channel_timeout,
        }
    }

    pub fn with_channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve `overrides`, then launch the run in the background.
    ///
    /// # Errors
    /// `InvalidConfig` if no usable directories result from the resolution,
    /// `WorkerSpawnFailed` if the worker thread cannot be created. Nothing
    /// runs in either case.
    pub fn start(&self, overrides: &DirOverrides) -> Result<JobHandle, EngineError> {
        let config = self.settings.resolve(overrides)?;
        spawn_job(config, self.channel_timeout)
    }
}

/// Launch a run for an already resolved configuration.
pub fn spawn_job(config: JobConfig, channel_timeout: Duration) -> Result<JobHandle, EngineError> {
    let id = Uuid::new_v4();
    let (tx, rx) = unbounded::<ProgressEvent>();
    let sink = ChannelSink::new(tx);
    let cancel = CancelToken::new();

    emit(&sink, ProgressEvent::connect(connect_message(&config)));

    let worker_config = config.clone();
    let worker_cancel = cancel.clone();
    let worker = thread::Builder::new()
        .name(format!("datesort-job-{}", id.simple()))
        .spawn(move || execute(id, worker_config, sink, worker_cancel))
        .map_err(|e| EngineError::WorkerSpawnFailed { source: e })?;

    tracing::info!(job = %id, source = %config.source_dir.display(), target = %config.target_dir.display(), "job started");

    Ok(JobHandle {
        id,
        config,
        events: Some(rx),
        deadline: Instant::now() + channel_timeout,
        cancel,
        worker: Some(worker),
    })
}

fn connect_message(config: &JobConfig) -> String {
    format!(
        "connected to file classifier (source: {}, target: {}, mode: {})",
        config.source_dir.display(),
        config.target_dir.display(),
        config.mode
    )
}

/// Body of the worker thread. The sink is dropped on return, closing the
/// channel after the terminal event.
fn execute(
    id: Uuid,
    config: JobConfig,
    sink: ChannelSink,
    cancel: CancelToken,
) -> Result<RunSummary, EngineError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        classifier::run_with_cancel(&config, &sink, &cancel)
    }));

    match outcome {
        Ok(summary) => {
            tracing::info!(job = %id, %summary, cancelled = summary.cancelled, "job finished");
            Ok(summary)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(job = %id, %message, "job worker panicked");
            emit(
                &sink,
                ProgressEvent::error(format!("fatal: classification stopped unexpectedly: {}", message)),
            );
            Err(EngineError::WorkerPanicked { message })
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Caller's side of a running job.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    config: JobConfig,
    events: Option<Receiver<ProgressEvent>>,
    deadline: Instant,
    cancel: CancelToken,
    worker: Option<JoinHandle<Result<RunSummary, EngineError>>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Block for the next event.
    ///
    /// Returns `None` once the run has closed the channel, the channel's
    /// lifetime has expired, or the handle was disconnected.
    pub fn next_event(&mut self) -> Option<ProgressEvent> {
        let events = self.events.as_ref()?;
        match events.recv_deadline(self.deadline) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(job = %self.id, "progress channel timed out; closing it");
                self.events = None;
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!(job = %self.id, "progress channel closed");
                self.events = None;
                None
            }
        }
    }

    /// Iterate over events until the channel closes.
    pub fn events(&mut self) -> impl Iterator<Item = ProgressEvent> + '_ {
        std::iter::from_fn(move || self.next_event())
    }

    /// True once no further events will be delivered through this handle.
    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }

    /// Stop observing. The run continues; its remaining events are dropped.
    pub fn disconnect(&mut self) {
        if self.events.take().is_some() {
            tracing::info!(job = %self.id, "observer disconnected");
        }
    }

    /// Ask the run to stop before its next file.
    pub fn cancel(&self) {
        tracing::info!(job = %self.id, "cancellation requested");
        self.cancel.cancel();
    }

    /// Wait for the run to end and return its summary.
    pub fn wait(mut self) -> Result<RunSummary, EngineError> {
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or_else(|payload| {
                Err(EngineError::WorkerPanicked {
                    message: panic_message(payload.as_ref()),
                })
            }),
            None => Err(EngineError::WorkerPanicked {
                message: "job already joined".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileSettings;
    use crate::progress::ProgressLevel;
    use std::fs;
    use std::path::Path;

    fn settings(src: &Path, dst: &Path, mode: &str) -> Settings {
        Settings {
            file: FileSettings {
                source_dir: src.display().to_string(),
                target_dir: dst.display().to_string(),
                working_mode: mode.to_string(),
                ..FileSettings::default()
            },
            ..Settings::default()
        }
    }

    #[test]
    fn test_events_are_bracketed_by_connect_and_complete() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&src).expect("mkdir");
        fs::write(src.join("20230515_photo.jpg"), b"jpeg").expect("write");

        let runner = JobRunner::new(settings(&src, &dst, "MOVE"));
        let mut handle = runner.start(&DirOverrides::default()).expect("start");

        let events: Vec<ProgressEvent> = handle.events().collect();
        assert!(handle.is_closed());
        assert_eq!(events.first().map(|e| e.level), Some(ProgressLevel::Connect));
        assert_eq!(events.last().map(|e| e.level), Some(ProgressLevel::Complete));
        assert_eq!(
            events.iter().filter(|e| e.level == ProgressLevel::Complete).count(),
            1
        );

        let summary = handle.wait().expect("summary");
        assert_eq!(summary.processed_files, 1);
        assert!(dst.join("2023/2023_05/20230515_photo.jpg").exists());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let configured = temp_dir.path().join("configured");
        let requested = temp_dir.path().join("requested");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&configured).expect("mkdir");
        fs::create_dir(&requested).expect("mkdir");
        fs::write(requested.join("20240101_a.jpg"), b"a").expect("write");

        let runner = JobRunner::new(settings(&configured, &dst, "COPY"));
        let overrides = DirOverrides::new(Some(requested.display().to_string()), Some(" ".into()));
        let mut handle = runner.start(&overrides).expect("start");

        assert_eq!(handle.config().source_dir, requested);
        assert_eq!(handle.config().target_dir, dst);
        let connect = handle.next_event().expect("connect event");
        assert!(connect.message.contains("requested"));

        let summary = handle.wait().expect("summary");
        assert_eq!(summary.processed_files, 1);
        assert!(dst.join("2024/2024_01/20240101_a.jpg").exists());
    }

    #[test]
    fn test_missing_source_ends_with_single_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("absent");
        let dst = temp_dir.path().join("dst");

        let mut handle = JobRunner::new(settings(&src, &dst, "MOVE"))
            .start(&DirOverrides::default())
            .expect("start");
        let events: Vec<ProgressEvent> = handle.events().collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, ProgressLevel::Connect);
        assert_eq!(events[1].level, ProgressLevel::Error);
        assert_eq!(handle.wait().expect("summary").total_files, 0);
    }

    #[test]
    fn test_unresolvable_request_is_rejected_before_spawn() {
        let result = JobRunner::new(Settings::default()).start(&DirOverrides::default());
        assert!(matches!(result, Err(EngineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_disconnected_observer_does_not_stop_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&src).expect("mkdir");
        for day in 1..=5 {
            fs::write(src.join(format!("202301{:02}_x.jpg", day)), b"x").expect("write");
        }

        let mut handle = JobRunner::new(settings(&src, &dst, "MOVE"))
            .start(&DirOverrides::default())
            .expect("start");
        handle.disconnect();
        assert!(handle.is_closed());
        assert!(handle.next_event().is_none());

        let summary = handle.wait().expect("summary");
        assert_eq!(summary.processed_files, 5);
        assert!(summary.is_balanced());
    }

    #[test]
    fn test_cancel_is_reflected_in_stream_and_summary() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&src).expect("mkdir");
        for day in 1..=20 {
            fs::write(src.join(format!("202302{:02}_x.jpg", day)), b"x").expect("write");
        }

        let mut handle = JobRunner::new(settings(&src, &dst, "COPY"))
            .start(&DirOverrides::default())
            .expect("start");
        handle.cancel();
        let events: Vec<ProgressEvent> = handle.events().collect();
        let summary = handle.wait().expect("summary");

        // The worker may finish before the request lands; either way the
        // stream has to agree with the summary.
        let cancel_warned = events
            .iter()
            .any(|e| e.level == ProgressLevel::Warn && e.message.starts_with("run cancelled after"));
        assert_eq!(cancel_warned, summary.cancelled);
        assert!(summary.visited_files() <= summary.total_files);
        assert_eq!(events.last().map(|e| e.level), Some(ProgressLevel::Complete));
    }

    #[test]
    fn test_expired_channel_closes() {
        let (tx, rx) = unbounded::<ProgressEvent>();
        let mut handle = JobHandle {
            id: Uuid::new_v4(),
            config: JobConfig::new("/in", "/out", crate::model::Mode::Copy, "trash", Vec::new())
                .expect("config"),
            events: Some(rx),
            deadline: Instant::now(),
            cancel: CancelToken::new(),
            worker: None,
        };

        assert!(handle.next_event().is_none());
        assert!(handle.is_closed());
        drop(tx);
    }
}
