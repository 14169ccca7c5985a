//! # Planner Error Handling
//!
//! This module provides the error type for the scaler planner: fatal conditions that stop
//! a frame from being configured, each carrying an [`ErrorContext`] with metadata about
//! where and why it happened.
//!
//! ## Fatal vs. Non-Fatal
//!
//! Only conditions that leave a frame without a complete plan are errors:
//!
//! - `FlipReallocation`: a wide flipped output could not get a second port
//! - `StripeSequence`: a later stripe was planned before stripe 0
//! - `Config` / `Validation`: the inputs themselves are unusable
//!
//! Everything else the planner notices (misaligned crops, unsupported ratios, outputs
//! skipped for one stripe) is reported as a `Diagnostic` on the frame plan instead.
//!
//! ## Usage
//!
//! ```rust
//! use mcsc_planner::error::{ErrorSeverity, HasSeverity, PlannerError};
//!
//! let error = PlannerError::flip_reallocation(2, "no output port with DMA disabled")
//!     .with_context("planning frame 17")
//!     .with_metadata("width", "4608");
//!
//! assert_eq!(error.category(), "flip_reallocation");
//! assert_eq!(error.severity(), ErrorSeverity::Fatal);
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

/// Severity levels for errors and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Debug-level findings that don't affect the plan
    Debug,
    /// Informational findings
    Info,
    /// Warnings that may indicate potential issues
    Warning,
    /// Errors that degrade the plan but leave it usable
    Error,
    /// Fatal errors: the frame cannot be configured
    Fatal,
}

/// Core error context containing metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
    /// Additional metadata as key-value pairs
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            severity: ErrorSeverity::Error,
            metadata: std::collections::BTreeMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set severity level
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Base error type for the planner
#[derive(Debug)]
pub enum PlannerError {
    /// Configuration errors (capability table, planner flags, frame description)
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Per-frame input validation errors
    Validation {
        field: String,
        constraint: String,
        value: String,
        context: ErrorContext,
    },
    /// A flipped output wider than the line buffer could not be split across two ports
    FlipReallocation {
        channel: usize,
        reason: String,
        context: ErrorContext,
    },
    /// Stripe planning out of order
    StripeSequence {
        index: u32,
        total_count: u32,
        reason: String,
        context: ErrorContext,
    },
    /// Calibration table errors
    Calibration {
        table: String,
        reason: String,
        context: ErrorContext,
    },
    /// Reference renderer errors
    Render {
        port: Option<usize>,
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// External library errors
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
}

impl PlannerError {
    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a validation error
    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a flip reallocation error
    pub fn flip_reallocation(channel: usize, reason: impl Into<String>) -> Self {
        Self::FlipReallocation {
            channel,
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a stripe sequence error
    pub fn stripe_sequence(index: u32, total_count: u32, reason: impl Into<String>) -> Self {
        Self::StripeSequence {
            index,
            total_count,
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a calibration error
    pub fn calibration(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Calibration {
            table: table.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a render error
    pub fn render(port: Option<usize>, reason: impl Into<String>) -> Self {
        Self::Render {
            port,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an external library error
    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    /// Attach a path to an I/O error; other variants are returned unchanged
    pub fn with_path(mut self, p: impl Into<String>) -> Self {
        if let Self::Io { path, .. } = &mut self {
            *path = Some(p.into());
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Validation { context, .. } => context,
            Self::FlipReallocation { context, .. } => context,
            Self::StripeSequence { context, .. } => context,
            Self::Calibration { context, .. } => context,
            Self::Render { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Get mutable reference to error context
    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Validation { context, .. } => context,
            Self::FlipReallocation { context, .. } => context,
            Self::StripeSequence { context, .. } => context,
            Self::Calibration { context, .. } => context,
            Self::Render { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation",
            Self::FlipReallocation { .. } => "flip_reallocation",
            Self::StripeSequence { .. } => "stripe_sequence",
            Self::Calibration { .. } => "calibration",
            Self::Render { .. } => "render",
            Self::Io { .. } => "io",
            Self::External { .. } => "external",
        }
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            PlannerError::Validation {
                field,
                constraint,
                value,
                ..
            } => {
                write!(
                    f,
                    "Validation failed for '{}': {} (value: {})",
                    field, constraint, value
                )
            }
            PlannerError::FlipReallocation {
                channel, reason, ..
            } => {
                write!(
                    f,
                    "Cannot split flipped output {} across two ports: {}",
                    channel, reason
                )
            }
            PlannerError::StripeSequence {
                index,
                total_count,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Stripe {} of {} planned out of order: {}",
                    index, total_count, reason
                )
            }
            PlannerError::Calibration { table, reason, .. } => {
                write!(f, "Calibration table '{}' rejected: {}", table, reason)
            }
            PlannerError::Render { port, reason, .. } => {
                if let Some(port) = port {
                    write!(f, "Rendering port {} failed: {}", port, reason)
                } else {
                    write!(f, "Rendering failed: {}", reason)
                }
            }
            PlannerError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "I/O error during {} on '{}': {}",
                        operation, path, source
                    )
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
            PlannerError::External {
                library, source, ..
            } => {
                write!(f, "External library error in {}: {}", library, source)
            }
        }
    }
}

impl StdError for PlannerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Trait for errors with severity levels
pub trait HasSeverity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for PlannerError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Check if an error is fatal for the frame being planned
    pub fn is_fatal(error: &PlannerError) -> bool {
        matches!(
            error,
            PlannerError::Config { .. }
                | PlannerError::Validation { .. }
                | PlannerError::FlipReallocation { .. }
                | PlannerError::StripeSequence { .. }
        ) || error.severity() == ErrorSeverity::Fatal
    }

    /// Check if the caller can fix the error by changing its inputs
    pub fn is_input_error(error: &PlannerError) -> bool {
        matches!(
            error,
            PlannerError::Config { .. }
                | PlannerError::Validation { .. }
                | PlannerError::Calibration { .. }
        )
    }
}

/// Error conversion implementations
impl From<std::io::Error> for PlannerError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for PlannerError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<mcsc_scale::cpu::RenderError> for PlannerError {
    fn from(error: mcsc_scale::cpu::RenderError) -> Self {
        Self::render(None, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PlannerError::config("precision", "30", "must be within 1..=24");
        assert_eq!(error.category(), "config");
        assert!(classify::is_fatal(&error));
        assert!(classify::is_input_error(&error));
    }

    #[test]
    fn test_error_with_context() {
        let error = PlannerError::flip_reallocation(1, "striping active")
            .with_context("frame 3")
            .with_operation("reallocate_flip_ports")
            .with_metadata("total_count", "2");

        assert_eq!(error.category(), "flip_reallocation");
        assert_eq!(error.severity(), ErrorSeverity::Fatal);
        assert_eq!(error.context().context.as_deref(), Some("frame 3"));
        assert_eq!(
            error.context().metadata.get("total_count").map(String::as_str),
            Some("2")
        );
        assert!(error.to_string().contains("output 1"));
    }

    #[test]
    fn test_error_classification() {
        let render = PlannerError::render(Some(2), "empty crop");
        assert!(!classify::is_fatal(&render));
        assert!(!classify::is_input_error(&render));

        let seq = PlannerError::stripe_sequence(2, 3, "stripe 0 not planned");
        assert!(classify::is_fatal(&seq));
    }

    #[test]
    fn test_io_error_source() {
        let err = PlannerError::io(
            "read frame description",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        )
        .with_path("frame.json");
        assert!(err.source().is_some());
        assert!(err.to_string().contains("frame.json"));
    }
}
