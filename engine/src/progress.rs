//! Progress reporting.
//!
//! This module defines the ProgressEvent value and the ProgressSink trait,
//! which decouples the classifier from however progress reaches a human
//! (a channel to another thread, a terminal, a server-push stream).

use std::sync::Mutex;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// Severity and role of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProgressLevel {
    /// Observer attached; describes the effective directories
    Connect,
    Info,
    Warn,
    Error,
    /// Run finished
    Complete,
}

impl ProgressLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressLevel::Connect => "CONNECT",
            ProgressLevel::Info => "INFO",
            ProgressLevel::Warn => "WARN",
            ProgressLevel::Error => "ERROR",
            ProgressLevel::Complete => "COMPLETE",
        }
    }
}

impl std::fmt::Display for ProgressLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One human-readable progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub level: ProgressLevel,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(level: ProgressLevel, message: impl Into<String>) -> Self {
        ProgressEvent {
            level,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Connect, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Error, message)
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(ProgressLevel::Complete, message)
    }

    /// JSON payload `{"level": "...", "message": "..."}`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Receiver of progress events.
///
/// Called synchronously from the classification thread, once per event, in
/// the order events are produced. A failed send never affects the run.
pub trait ProgressSink: Send + Sync {
    fn send(&self, event: ProgressEvent) -> Result<(), SinkError>;
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn send(&self, event: ProgressEvent) -> Result<(), SinkError> {
        (**self).send(event)
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn send(&self, event: ProgressEvent) -> Result<(), SinkError> {
        (**self).send(event)
    }
}

/// Deliver an event, logging and swallowing any failure.
pub fn emit(sink: &dyn ProgressSink, event: ProgressEvent) {
    if let Err(e) = sink.send(event.clone()) {
        match e {
            SinkError::Disconnected => {
                tracing::debug!(event_level = %event.level, message = %event.message, "progress event dropped: observer gone");
            }
            other => {
                tracing::warn!(event_level = %event.level, error = %other, "failed to deliver progress event");
            }
        }
    }
}

/// Forwards events over a crossbeam channel to another thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        ChannelSink { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn send(&self, event: ProgressEvent) -> Result<(), SinkError> {
        self.sender.send(event).map_err(|_| SinkError::Disconnected)
    }
}

/// Collects events in memory, for tests and for callers that want the whole
/// transcript after the fact.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events of a single level.
    pub fn of_level(&self, level: ProgressLevel) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }
}

impl ProgressSink for MemorySink {
    fn send(&self, event: ProgressEvent) -> Result<(), SinkError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
        Ok(())
    }
}

/// A sink whose observer is already gone; every send fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosedSink;

impl ProgressSink for ClosedSink {
    fn send(&self, _event: ProgressEvent) -> Result<(), SinkError> {
        Err(SinkError::Disconnected)
    }
}
