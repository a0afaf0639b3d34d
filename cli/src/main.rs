//! datesort - command-line front end for the classification engine.
//!
//! Loads settings, applies command-line overrides, starts a background job,
//! and renders its progress stream either as text or as server-sent-event
//! frames.

mod logging;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use engine::{
    config::{DirOverrides, Settings},
    progress::{emit, ProgressEvent, ProgressLevel, ProgressSink},
    runner::JobRunner,
    RunSummary, SinkError, SseWriter,
};

/// datesort - file photos into year/month folders by the date in their names
#[derive(Parser, Debug)]
#[command(name = "datesort")]
#[command(version = "0.1.0")]
#[command(about = "Classify files into yyyy/yyyy_MM folders by filename date")]
struct Args {
    /// Settings file (defaults to ./datesort.toml, then ~/.config/datesort/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Source directory, overriding the configured one
    #[arg(long, value_name = "PATH")]
    source: Option<String>,

    /// Target directory, overriding the configured one
    #[arg(long, value_name = "PATH")]
    target: Option<String>,

    /// Operation mode: copy or move, overriding the configured one
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,

    /// Progress output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One human-readable line per event on stderr
    Text,
    /// Server-sent-event frames on stdout
    Sse,
}

/// What a finished run looked like from the command line.
#[derive(Debug)]
struct RunReport {
    summary: RunSummary,
    errors_seen: usize,
}

/// Prints each progress event as a line on stderr.
struct TextProgress {
    start_time: Instant,
}

impl TextProgress {
    fn new() -> Self {
        TextProgress {
            start_time: Instant::now(),
        }
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl ProgressSink for TextProgress {
    fn send(&self, event: ProgressEvent) -> Result<(), SinkError> {
        match event.level {
            ProgressLevel::Complete => {
                eprintln!("{}", event);
                eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
            }
            _ => eprintln!("{}", event),
        }
        Ok(())
    }
}

fn main() {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(report) => {
            tracing::debug!(summary = %report.summary, "run finished");
            if report.errors_seen == 0 {
                0
            } else {
                tracing::warn!(errors = report.errors_seen, "run finished with errors");
                1
            }
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<RunReport, String> {
    let renderer: Box<dyn ProgressSink> = match args.format {
        OutputFormat::Text => Box::new(TextProgress::new()),
        OutputFormat::Sse => Box::new(SseWriter::new(std::io::stdout())),
    };
    run_with_renderer(args, renderer.as_ref())
}

/// Start the job and forward its events to `renderer`, counting ERRORs.
fn run_with_renderer(args: &Args, renderer: &dyn ProgressSink) -> Result<RunReport, String> {
    let mut settings =
        Settings::load(args.config.as_deref()).map_err(|e| format!("Settings failed: {}", e))?;

    if let Some(mode) = &args.mode {
        settings.file.working_mode = match mode.to_lowercase().as_str() {
            "copy" => "COPY".to_string(),
            "move" => "MOVE".to_string(),
            _ => {
                return Err(format!(
                    "Invalid mode '{}'. Must be 'copy' or 'move'",
                    mode
                ))
            }
        };
    }

    let runner = JobRunner::new(settings);
    let overrides = DirOverrides::new(args.source.clone(), args.target.clone());
    let mut job = runner
        .start(&overrides)
        .map_err(|e| format!("Job start failed: {}", e))?;
    tracing::debug!(job = %job.id(), "streaming progress");

    let mut errors_seen = 0;
    for event in job.events() {
        if event.level == ProgressLevel::Error {
            errors_seen += 1;
        }
        emit(renderer, event);
    }

    let summary = job.wait().map_err(|e| format!("Job failed: {}", e))?;
    Ok(RunReport {
        summary,
        errors_seen,
    })
}
