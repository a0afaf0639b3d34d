//! Transport framing for progress events.
//!
//! Each event becomes one server-push frame whose name tells a browser-side
//! listener which handler to run: failures go to `error`, the end of a run to
//! `complete`, and everything else to `message`.

use std::io::Write;

use crate::error::SinkError;
use crate::progress::{ProgressEvent, ProgressLevel, ProgressSink};

/// Frame type a progress event travels under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Message,
    Error,
    Complete,
}

impl FrameKind {
    pub fn for_level(level: ProgressLevel) -> Self {
        match level {
            ProgressLevel::Error => FrameKind::Error,
            ProgressLevel::Complete => FrameKind::Complete,
            ProgressLevel::Connect | ProgressLevel::Info | ProgressLevel::Warn => FrameKind::Message,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Message => "message",
            FrameKind::Error => "error",
            FrameKind::Complete => "complete",
        }
    }
}

/// A fully encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub data: String,
}

impl Frame {
    pub fn from_event(event: &ProgressEvent) -> Result<Self, serde_json::Error> {
        Ok(Frame {
            kind: FrameKind::for_level(event.level),
            data: event.to_json()?,
        })
    }

    /// Server-sent-events wire text: `event: <name>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind.name(), self.data)
    }
}

/// Writes every event as an SSE frame to an output stream.
pub struct SseWriter<W: Write + Send> {
    out: std::sync::Mutex<W>,
}

impl<W: Write + Send> SseWriter<W> {
    pub fn new(out: W) -> Self {
        SseWriter {
            out: std::sync::Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressSink for SseWriter<W> {
    fn send(&self, event: ProgressEvent) -> Result<(), SinkError> {
        let frame = Frame::from_event(&event)?;
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        out.write_all(frame.to_sse().as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
