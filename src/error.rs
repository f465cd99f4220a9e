//! Error type shared by every connector component.
//!
//! Errors are categorized by [`ErrorKind`] so the host can tell a bad
//! configuration (fatal, never retried) from an I/O failure on a slice or
//! batch (the host decides whether to retry).

use std::error::Error;
use std::fmt;

/// Generic error type for connector operations.
#[derive(Debug, Clone)]
pub struct ConnectorError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing field, bad enum value or violated invariant. Raised before any I/O.
    Configuration,
    /// A record or document could not be parsed or serialized.
    Format,
    /// Read, list or write against a storage backend failed.
    Io,
    /// The path, object or upload session does not exist.
    NotFound,
    /// A caller passed something the operation cannot accept in its current state.
    InvalidInput,
    /// Several multipart part uploads failed; the message lists all of them.
    Multipart,
    /// The operation was abandoned because its session was aborted.
    Aborted,
    Other,
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for ConnectorError {}

impl ConnectorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// Combine several failures into one error.
    ///
    /// A single error is returned unchanged; two or more become an
    /// [`ErrorKind::Multipart`] error whose message lists every failure.
    pub fn aggregate(mut errors: Vec<ConnectorError>) -> Self {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        let listed = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(
            ErrorKind::Multipart,
            format!("{} operations failed: {listed}", errors.len()),
        )
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.kind == ErrorKind::Configuration
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Self::new(kind, err.to_string())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::format(err.to_string())
    }
}

impl From<csv::Error> for ConnectorError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            Self::io(err.to_string())
        } else {
            Self::format(err.to_string())
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_one_is_the_error_itself() {
        let err = ConnectorError::aggregate(vec![ConnectorError::io("part 3 failed")]);
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.message, "part 3 failed");
    }

    #[test]
    fn aggregate_lists_every_failure() {
        let err = ConnectorError::aggregate(vec![
            ConnectorError::io("part 1 failed"),
            ConnectorError::io("part 2 failed"),
        ]);
        assert_eq!(err.kind, ErrorKind::Multipart);
        assert!(err.message.contains("part 1 failed"));
        assert!(err.message.contains("part 2 failed"));
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ConnectorError::from(io).kind, ErrorKind::NotFound);
    }
}
