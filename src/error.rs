//! Error handling for Hearth Strands
//!
//! One error type for every recording and setup operation. Contract violations
//! that a GPU would silently corrupt on (dispatch overflow, mismatched buffer
//! sizes) are reported here instead of panicking. Soft capacity overflows are
//! not errors; they are reported through telemetry counters.

use std::error::Error as StdError;
use std::fmt;

/// Main error type for Hearth Strands
#[derive(Debug)]
pub enum StrandsError {
    // Dispatch Errors
    DispatchLimitExceeded {
        pass: String,
        group_count: u64,
        limit: u32,
    },
    InvalidGroupSize {
        pass: String,
    },

    // Resource Errors
    BufferSizeMismatch {
        resource: String,
        expected: u64,
        found: u64,
    },
    MissingResource {
        resource: String,
    },
    InvalidHandle {
        kind: &'static str,
        index: u32,
    },
    PipelineNotFound {
        kernel: String,
    },

    // GPU Errors
    GpuOperationFailed {
        operation: String,
        error: String,
    },
    BufferMapping {
        operation: String,
    },

    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },
    UnknownConsoleVariable {
        name: String,
    },

    // Extension point Errors
    BookmarkAlreadyRegistered,

    // System Errors
    IoError {
        path: String,
        error: String,
    },

    // Generic fallback for unexpected errors
    Internal {
        message: String,
    },
}

impl fmt::Display for StrandsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrandsError::DispatchLimitExceeded {
                pass,
                group_count,
                limit,
            } => write!(
                f,
                "Dispatch limit exceeded in {}: {} groups (max per dimension: {})",
                pass, group_count, limit
            ),
            StrandsError::InvalidGroupSize { pass } => {
                write!(f, "Invalid group size of 0 in {}", pass)
            }

            StrandsError::BufferSizeMismatch {
                resource,
                expected,
                found,
            } => write!(
                f,
                "Buffer size mismatch for {}: expected {} elements, found {}",
                resource, expected, found
            ),
            StrandsError::MissingResource { resource } => {
                write!(f, "Required resource missing: {}", resource)
            }
            StrandsError::InvalidHandle { kind, index } => {
                write!(f, "Invalid {} handle: {}", kind, index)
            }
            StrandsError::PipelineNotFound { kernel } => {
                write!(f, "No pipeline registered for kernel {}", kernel)
            }

            StrandsError::GpuOperationFailed { operation, error } => {
                write!(f, "GPU operation '{}' failed: {}", operation, error)
            }
            StrandsError::BufferMapping { operation } => {
                write!(f, "Buffer mapping failed during {}", operation)
            }

            StrandsError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),
            StrandsError::UnknownConsoleVariable { name } => {
                write!(f, "Unknown console variable: {}", name)
            }

            StrandsError::BookmarkAlreadyRegistered => {
                write!(f, "A hair strands bookmark handler is already registered")
            }

            StrandsError::IoError { path, error } => write!(f, "IO error for {}: {}", path, error),

            StrandsError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for StrandsError {}

/// Type alias for Results in Hearth Strands
pub type StrandsResult<T> = Result<T, StrandsError>;

impl From<std::io::Error> for StrandsError {
    fn from(error: std::io::Error) -> Self {
        StrandsError::IoError {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl From<crate::config::ConfigError> for StrandsError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::Parse(e) => StrandsError::InvalidConfig {
                field: "toml".to_string(),
                value: String::new(),
                reason: e,
            },
            ConfigError::OutOfRange {
                field,
                value,
                reason,
            } => StrandsError::InvalidConfig {
                field,
                value,
                reason,
            },
            ConfigError::UnknownVariable(name) => StrandsError::UnknownConsoleVariable { name },
        }
    }
}

impl From<crate::bookmark::BookmarkError> for StrandsError {
    fn from(err: crate::bookmark::BookmarkError) -> Self {
        match err {
            crate::bookmark::BookmarkError::AlreadyRegistered => {
                StrandsError::BookmarkAlreadyRegistered
            }
        }
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_strands<F>(self, f: F) -> StrandsResult<T>
    where
        F: FnOnce() -> StrandsError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_strands<F>(self, f: F) -> StrandsResult<T>
    where
        F: FnOnce() -> StrandsError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> StrandsResult<T>;
    fn with_context<F>(self, f: F) -> StrandsResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn context(self, msg: &str) -> StrandsResult<T> {
        self.map_err(|e| StrandsError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> StrandsResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StrandsError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StrandsError::DispatchLimitExceeded {
            pass: "HairStrandsClusterCulling".to_string(),
            group_count: 65536,
            limit: 65535,
        };
        assert_eq!(
            err.to_string(),
            "Dispatch limit exceeded in HairStrandsClusterCulling: 65536 groups (max per dimension: 65535)"
        );
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_strands(|| StrandsError::MissingResource {
            resource: "PageIndexBuffer".to_string(),
        });
        assert!(matches!(result, Err(StrandsError::MissingResource { .. })));
    }

    #[test]
    fn test_error_context() {
        let result: Result<i32, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let with_context = result.context("loading config");
        match with_context {
            Err(StrandsError::Internal { message }) => {
                assert!(message.starts_with("loading config"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
