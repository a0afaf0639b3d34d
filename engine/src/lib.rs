//! # datesort engine - date-based file classification
//!
//! A headless library that files photos and other device-generated files into
//! a `yyyy/yyyy_MM` folder tree using the capture date encoded in their names.
//! Designed as the foundation for any front end (CLI, server-push endpoint).
//!
//! ## Overview
//!
//! The engine provides:
//! - Recursive enumeration of a source tree
//! - Date extraction from `yyyyMMdd` filename prefixes, with camera prefix stripping
//! - Copy or move into the dated tree, never overwriting
//! - A mirrored trash tree for colliding duplicates
//! - Per-file error isolation
//! - Progress reporting through a sink trait (decoupled from any transport)
//! - A background job runner with cancellation and a bounded channel lifetime
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{DirOverrides, JobRunner, ProgressLevel, Settings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let runner = JobRunner::new(settings);
//!
//! // Returns as soon as the worker thread is running
//! let mut job = runner.start(&DirOverrides::new(
//!     Some("/photos/inbox".into()),
//!     Some("/photos/library".into()),
//! ))?;
//!
//! for event in job.events() {
//!     println!("{}", event);
//!     if event.level == ProgressLevel::Complete {
//!         break;
//!     }
//! }
//!
//! let summary = job.wait()?;
//! println!("{} processed, {} skipped", summary.processed_files, summary.skipped_files);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (JobConfig, FileRecord, RunSummary, enums)
//! - **error**: Error types
//! - **naming**: Filename date extraction and destination layout
//! - **fs_ops**: Low-level filesystem operations
//! - **classifier**: The classification run
//! - **progress**: Progress events and the sink trait
//! - **frame**: Transport framing for progress events
//! - **config**: Settings file and request overrides
//! - **runner**: Background job execution

pub mod model;
pub mod error;
pub mod naming;
pub mod fs_ops;
pub mod classifier;
pub mod progress;
pub mod frame;
pub mod config;
pub mod runner;

// Re-export main types and functions
pub use model::{FileOutcome, FileRecord, JobConfig, Mode, RunSummary};
pub use error::{EngineError, SinkError};
pub use naming::{extract_date, DateError};
pub use classifier::{run, run_with_cancel, CancelToken};
pub use progress::{ChannelSink, MemorySink, ProgressEvent, ProgressLevel, ProgressSink};
pub use frame::{Frame, FrameKind, SseWriter};
pub use config::{ConfigError, DirOverrides, Settings};
pub use runner::{spawn_job, JobHandle, JobRunner, DEFAULT_CHANNEL_TIMEOUT};
