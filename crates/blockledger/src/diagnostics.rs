//! Diagnostic sink for degraded classifications.
//!
//! Reporting never influences control flow: a malformed record is always counted
//! with a conservative estimate, and the sink only gets told about it.

use crate::manifest::{ManifestId, ObjectKey};
use parking_lot::Mutex;
use std::fmt;
use tracing::{error, info, warn};

/// Severity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational.
    Info,
    /// A record was degraded to an estimate.
    Warning,
    /// A record was unusable.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Where a diagnostic was raised.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticContext<'a> {
    /// Object being processed.
    pub key: &'a ObjectKey,
    /// Version being processed, if any.
    pub manifest: Option<ManifestId>,
}

/// Receives `(severity, message, context)` events.
pub trait DiagnosticSink: Send + Sync {
    /// Reports one event.
    fn report(&self, severity: Severity, message: &str, context: DiagnosticContext<'_>);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, severity: Severity, message: &str, context: DiagnosticContext<'_>) {
        let manifest = context.manifest.map(|id| id.to_string()).unwrap_or_default();
        match severity {
            Severity::Info => info!(key = %context.key, manifest = %manifest, "{}", message),
            Severity::Warning => warn!(key = %context.key, manifest = %manifest, "{}", message),
            Severity::Error => error!(key = %context.key, manifest = %manifest, "{}", message),
        }
    }
}

/// An owned diagnostic event, as kept by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the event.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Object being processed.
    pub key: ObjectKey,
    /// Version being processed, if any.
    pub manifest: Option<ManifestId>,
}

/// Keeps every reported event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().clone()
    }

    /// Number of events reported so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, severity: Severity, message: &str, context: DiagnosticContext<'_>) {
        self.events.lock().push(Diagnostic {
            severity,
            message: message.to_string(),
            key: context.key.clone(),
            manifest: context.manifest,
        });
    }
}
