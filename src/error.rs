//! Error types and handling for Seurat

/// Result type alias for Seurat operations
pub type Result<T> = std::result::Result<T, SeuratError>;

/// Error types for the managed shared memory segment layer
#[derive(Debug, thiserror::Error)]
pub enum SeuratError {
    /// I/O related errors (mapping, flushing, fstat)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Segment already exists (exclusive creation against a live store)
    #[error("Segment already exists: {name}")]
    AlreadyExists { name: String },

    /// Segment not found (open against a missing store)
    #[error("Segment not found: {name}")]
    NotFound { name: String },

    /// Named object already exists inside the segment
    #[error("Object already exists: {name}")]
    ObjectExists { name: String },

    /// Insufficient space for placement or allocation
    #[error("Insufficient space: requested {requested}, available {available}")]
    InsufficientSpace { requested: usize, available: usize },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Mutation attempted through a read-only mapping
    #[error("Segment is mapped read-only")]
    ReadOnly,

    /// Magic, version, or size validation failed on an existing store
    #[error("Invalid segment: {message}")]
    InvalidSegment { message: String },

    /// Underlying OS call failed (shm_open, ftruncate, mmap)
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl SeuratError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Create a not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create an object-exists error
    pub fn object_exists(name: impl Into<String>) -> Self {
        Self::ObjectExists { name: name.into() }
    }

    /// Create an insufficient-space error
    pub fn insufficient_space(requested: usize, available: usize) -> Self {
        Self::InsufficientSpace {
            requested,
            available,
        }
    }

    /// Create an invalid-parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-segment error
    pub fn invalid_segment(message: impl Into<String>) -> Self {
        Self::InvalidSegment {
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SeuratError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::errno::Errno> for SeuratError {
    fn from(err: nix::errno::Errno) -> Self {
        Self::platform(format!("system call failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SeuratError::already_exists("seg");
        assert!(matches!(err, SeuratError::AlreadyExists { .. }));

        let err = SeuratError::not_found("seg");
        assert!(matches!(err, SeuratError::NotFound { .. }));

        let err = SeuratError::insufficient_space(1024, 512);
        assert!(matches!(err, SeuratError::InsufficientSpace { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = SeuratError::invalid_segment("bad magic");
        let display = format!("{}", err);
        assert!(display.contains("Invalid segment"));
        assert!(display.contains("bad magic"));
    }
}
