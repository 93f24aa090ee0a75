//! Error types for port operations.

use std::error::Error as _;

/// Errors reported by a generation backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Request cancelled: {0}")]
    Cancelled(String),
}

impl GenerationError {
    pub fn request_failed(message: impl ToString) -> Self {
        Self::RequestFailed(message.to_string())
    }

    pub fn cancelled(message: impl ToString) -> Self {
        Self::Cancelled(message.to_string())
    }

    /// Whether this error means the caller aborted the request.
    ///
    /// Backends surface aborts in different shapes, so besides the explicit
    /// variant the message and source chain are scanned for "abort" or
    /// "cancel" (case-insensitive).
    pub fn is_cancellation(&self) -> bool {
        if matches!(self, Self::Cancelled(_)) {
            return true;
        }
        let mentions_abort = |text: String| {
            let lower = text.to_lowercase();
            lower.contains("abort") || lower.contains("cancel")
        };
        if mentions_abort(self.to_string()) {
            return true;
        }
        let mut source = self.source();
        while let Some(err) = source {
            if mentions_abort(err.to_string()) {
                return true;
            }
            source = err.source();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_messages_are_cancellations() {
        assert!(GenerationError::cancelled("stop").is_cancellation());
        assert!(GenerationError::request_failed("Request Aborted by user").is_cancellation());
        assert!(GenerationError::request_failed("operation was CANCELLED").is_cancellation());
        assert!(!GenerationError::request_failed("connection refused").is_cancellation());
        assert!(!GenerationError::InvalidResponse("No choices".into()).is_cancellation());
    }
}
