//! Per-attempt instrumentation
//!
//! The engine opens one trace event before each attempt and finishes it
//! after, recording the error if the attempt failed. The recorder is injected
//! into the proxy rather than being a process-wide logger, so tests can
//! capture events with [`RecordingTracer`] or silence them with
//! [`NoopTracer`]. Tracing never changes the outcome of an attempt.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{Span, debug, field};

use crate::error::AttemptError;

/// Event names used by the engine
pub mod events {
    /// One-way delivery attempt
    pub const SEND_MESSAGE: &str = "send_routing_message";
    /// Request/response attempt
    pub const SEND_REQUEST: &str = "send_routing_request";
}

/// What is known about an attempt when it starts
#[derive(Debug, Clone)]
pub struct AttemptEvent {
    pub name: &'static str,
    /// Local peer (short form)
    pub local: String,
    /// Remote peer being tried (short form)
    pub remote: String,
    /// Rendered message
    pub message: String,
}

/// Recorder for attempt events
pub trait Tracer: Send + Sync {
    /// Start an event
    fn begin(&self, event: AttemptEvent) -> Box<dyn TraceSpan>;
}

/// An in-progress attempt event
pub trait TraceSpan: Send {
    /// Span the attempt's I/O runs inside
    fn span(&self) -> Span {
        Span::none()
    }

    /// Mark the attempt as failed
    fn set_error(&mut self, error: &AttemptError);

    /// Finish the event
    fn done(self: Box<Self>);
}

/// Emits attempts as `tracing` spans (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn begin(&self, event: AttemptEvent) -> Box<dyn TraceSpan> {
        let span = tracing::debug_span!(
            "routing_attempt",
            event = event.name,
            local = %event.local,
            remote = %event.remote,
            message = %event.message,
            error = field::Empty,
            elapsed_ms = field::Empty,
        );
        Box::new(LogSpan {
            span,
            started: Instant::now(),
            failed: false,
        })
    }
}

struct LogSpan {
    span: Span,
    started: Instant,
    failed: bool,
}

impl TraceSpan for LogSpan {
    fn span(&self) -> Span {
        self.span.clone()
    }

    fn set_error(&mut self, error: &AttemptError) {
        self.failed = true;
        self.span.record("error", field::display(error));
    }

    fn done(self: Box<Self>) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.span.record("elapsed_ms", elapsed_ms);
        self.span.in_scope(|| {
            if self.failed {
                debug!("attempt failed");
            } else {
                debug!("attempt succeeded");
            }
        });
    }
}

/// Discards all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn begin(&self, _event: AttemptEvent) -> Box<dyn TraceSpan> {
        Box::new(NoopSpan)
    }
}

struct NoopSpan;

impl TraceSpan for NoopSpan {
    fn set_error(&mut self, _error: &AttemptError) {}

    fn done(self: Box<Self>) {}
}

/// An event captured by [`RecordingTracer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub name: &'static str,
    pub local: String,
    pub remote: String,
    pub message: String,
    /// Rendered error, if the attempt failed
    pub error: Option<String>,
    /// Whether `done` was called
    pub finished: bool,
}

/// Captures events in memory, in the order they began
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events that recorded an error
    pub fn failures(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.error.is_some())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Tracer for RecordingTracer {
    fn begin(&self, event: AttemptEvent) -> Box<dyn TraceSpan> {
        let mut events = self.events.lock();
        let index = events.len();
        events.push(RecordedEvent {
            name: event.name,
            local: event.local,
            remote: event.remote,
            message: event.message,
            error: None,
            finished: false,
        });
        Box::new(RecordingSpan {
            events: self.events.clone(),
            index,
        })
    }
}

struct RecordingSpan {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
    index: usize,
}

impl TraceSpan for RecordingSpan {
    fn set_error(&mut self, error: &AttemptError) {
        if let Some(event) = self.events.lock().get_mut(self.index) {
            event.error = Some(error.to_string());
        }
    }

    fn done(self: Box<Self>) {
        if let Some(event) = self.events.lock().get_mut(self.index) {
            event.finished = true;
        }
    }
}
