//! Diagnostic reporting utilities for the Galluz compiler.
//!
//! This module provides lightweight, rustc-style error reporting that
//! emits colored messages to stderr. Every pass in the compiler reports
//! problems through the `Diagnostic` container and the
//! `DiagnosticResult` alias; a single error aborts compilation of the
//! unit, so there is no accumulation or recovery machinery here.
//!
//! # Error Formatting
//!
//! - **Error messages**: red "error:" prefix with a clear description
//! - **Notes**: blue "note:" annotations (the dispatcher traceback
//!   arrives through this channel)
//! - **Suppression**: tests silence output with the `suppress()` guard

use std::sync::atomic::{AtomicBool, Ordering};

/// Severity of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Structured diagnostic container for propagating compiler errors.
///
/// The diagnostic system uses this container to decouple error detection
/// from error emission: lowering code constructs a `Diagnostic` and
/// returns it through `DiagnosticResult`, and the driver decides how to
/// present it (optionally enriched with the dispatcher traceback).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level of the diagnostic
    pub severity: Severity,
    /// Primary error message describing the issue
    pub message: String,
    /// Optional additional context or suggestion
    pub note: Option<String>,
}

/// Result alias used throughout the lowering pass.
pub type DiagnosticResult<T> = Result<T, Box<Diagnostic>>;

impl Diagnostic {
    /// Creates a simple diagnostic with only an error message.
    pub fn simple(severity: Severity, msg: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: msg.into(),
            note: None,
        }
    }

    /// Boxed variant of [`Diagnostic::simple`], matching the shape
    /// expected by `DiagnosticResult`.
    pub fn simple_boxed(severity: Severity, msg: impl Into<String>) -> Box<Self> {
        Box::new(Self::simple(severity, msg))
    }

    /// Shorthand for a boxed error-severity diagnostic.
    pub fn error(msg: impl Into<String>) -> Box<Self> {
        Self::simple_boxed(Severity::Error, msg)
    }

    /// Attaches a note to the diagnostic, replacing any existing one.
    pub fn with_note(mut self: Box<Self>, note: impl Into<String>) -> Box<Self> {
        self.note = Some(note.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Prints a compact, rustc-style diagnostic message to stderr.
pub fn report(severity: Severity, message: &str, note: Option<&str>) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }

    let reset = "\x1b[0m";
    match severity {
        Severity::Error => eprintln!("\x1b[31merror{}: {}", reset, message),
        Severity::Warning => eprintln!("\x1b[33mwarning{}: {}", reset, message),
    }

    if let Some(note) = note {
        eprintln!("\x1b[34mnote{}: {}", reset, note);
    }
}

/// Emits a diagnostic through [`report`].
pub fn emit_diagnostic(d: &Diagnostic) {
    report(d.severity, &d.message, d.note.as_deref());
}

/// Temporarily suppresses diagnostic output for testing scenarios.
///
/// The returned guard restores the previous state when dropped, so
/// tests can verify error detection without cluttering stderr.
pub fn suppress() -> SuppressGuard {
    let prev = DIAGNOSTICS_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

/// RAII guard that manages diagnostic output state.
pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}
