//! # Error Handling
//!
//! Error types for the Android capture library.
//!
//! ## Propagation policy
//!
//! Bridge tool failures are data ([`CommandResult`](crate::core::command::CommandResult)),
//! mirror setup failures are `Option`s or booleans, and teardown never fails.
//! A [`CaptureError`] only reaches the caller when:
//!
//! - both capture strategies are exhausted ([`CaptureError::Pipeline`]),
//! - a connected-session capture is attempted without a session ([`CaptureError::State`]),
//! - configuration or file output cannot be completed.
//!
//! Mirror transport failures never surface here: they close the session and
//! hand over to the screencap fallback.
//!
//! ## Error Classification
//!
//! - `Retryable`: whether a retry can help, and how long to wait
//! - `HasRecoverySuggestion`: a hint for the user, carried in [`ErrorContext`]
//!
//! ## Usage
//!
//! ```rust
//! use android_screen_capture::error::{CaptureError, HasRecoverySuggestion, Retryable};
//!
//! let error = CaptureError::pipeline("emulator-5554", "screencap fallback failed")
//!     .with_recovery_suggestion("Check that the device is unlocked and authorized");
//!
//! assert_eq!(error.category(), "pipeline");
//! assert!(error.is_retryable());
//! assert!(error.recovery_suggestion().is_some());
//! ```

use std::{collections::HashMap, error::Error as StdError, fmt};

/// Metadata attached to an error on its way up
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    /// Additional metadata as key-value pairs
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }
}

/// Base error type for the capture library
#[derive(Debug)]
pub enum CaptureError {
    /// Configuration resolution or validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// A bridge tool command reported non-success
    Command {
        command: String,
        reason: String,
        context: ErrorContext,
    },
    /// Invalid state for the attempted operation (precondition violation)
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Every capture strategy for a device was exhausted
    Pipeline {
        serial: String,
        reason: String,
        source: Option<Box<CaptureError>>,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// Image codec or blocking task errors
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
    /// Validation errors
    Validation {
        field: String,
        constraint: String,
        value: String,
        context: ErrorContext,
    },
}

impl CaptureError {
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
            context: ErrorContext::new(),
        }
    }

    /// Create a bridge command error
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a state error
    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a pipeline error for a device
    pub fn pipeline(serial: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pipeline {
            serial: serial.into(),
            reason: reason.into(),
            source: None,
            context: ErrorContext::new(),
        }
    }

    /// Wrap an originating cause with device serial context
    pub fn pipeline_from(serial: impl Into<String>, cause: CaptureError) -> Self {
        Self::Pipeline {
            serial: serial.into(),
            reason: cause.to_string(),
            source: Some(Box::new(cause)),
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

    /// Create an I/O error for a specific path
    pub fn io_at(
        operation: impl Into<String>,
        path: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.into()),
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
            context: ErrorContext::new(),
        }
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
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
            Self::Command { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Pipeline { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
            Self::Validation { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Command { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Pipeline { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
            Self::Validation { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Command { .. } => "command",
            Self::State { .. } => "state",
            Self::Pipeline { .. } => "pipeline",
            Self::Io { .. } => "io",
            Self::External { .. } => "external",
            Self::Validation { .. } => "validation",
        }
    }

    /// Operation recorded with [`with_operation`](Self::with_operation)
    pub fn operation(&self) -> Option<&str> {
        self.context().operation.as_deref()
    }

    /// Device serial for errors raised by a device orchestrator
    pub fn serial(&self) -> Option<&str> {
        match self {
            Self::Pipeline { serial, .. } => Some(serial),
            _ => self.context().metadata.get("serial").map(String::as_str),
        }
    }

    /// True when the caller used a connected-session operation without connecting first
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::State { .. })
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Config {
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
            CaptureError::Command {
                command, reason, ..
            } => {
                write!(f, "Bridge command '{}' failed: {}", command, reason)
            }
            CaptureError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Cannot '{}' while '{}': {}",
                    attempted_operation, current_state, reason
                )
            }
            CaptureError::Pipeline { serial, reason, .. } => {
                write!(f, "Screenshot capture failed for device {}: {}", serial, reason)
            }
            CaptureError::Io {
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
            CaptureError::External {
                library, source, ..
            } => {
                write!(f, "External library error in {}: {}", library, source)
            }
            CaptureError::Validation {
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
        }
    }
}

impl StdError for CaptureError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            Self::Pipeline {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for errors that can be retried
pub trait Retryable {
    /// Check if this error can be retried
    fn is_retryable(&self) -> bool;

    /// Get the recommended retry delay in milliseconds
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }

    /// Get the maximum number of retry attempts
    fn max_retries(&self) -> Option<usize> {
        None
    }
}

impl Retryable for CaptureError {
    // A locked, rebooting or briefly offline device often recovers; bad
    // configuration, misuse and undecodable images do not.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Pipeline { .. } | Self::Command { .. } | Self::Io { .. }
        )
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Pipeline { .. } => Some(1000),
            Self::Command { .. } => Some(500),
            Self::Io { .. } => Some(100),
            _ => None,
        }
    }

    fn max_retries(&self) -> Option<usize> {
        match self {
            Self::Pipeline { .. } => Some(2),
            Self::Command { .. } => Some(2),
            Self::Io { .. } => Some(3),
            _ => None,
        }
    }
}

/// Trait for errors that provide recovery suggestions
pub trait HasRecoverySuggestion {
    /// Get recovery suggestion for this error
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for CaptureError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(error: image::ImageError) -> Self {
        Self::external("image", error)
    }
}

impl From<tokio::task::JoinError> for CaptureError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::external("tokio", error)
    }
}
