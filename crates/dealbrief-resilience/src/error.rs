use thiserror::Error;

/// Failure of a call to an external collaborator (content, embedding,
/// completion or report storage service).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status code.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The named circuit breaker is open; the call was not attempted.
    #[error("circuit breaker {0} is open")]
    CircuitOpen(String),

    /// The service answered successfully but with nothing usable.
    #[error("{0} returned an empty response")]
    Empty(String),
}

impl ServiceError {
    /// Short, stable label used as the key in per-operation error counts.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Http(e) if e.is_timeout() => "timeout",
            ServiceError::Http(_) => "http",
            ServiceError::Status { .. } => "status",
            ServiceError::Deserialize { .. } => "deserialize",
            ServiceError::CircuitOpen(_) => "circuit_open",
            ServiceError::Empty(_) => "empty",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        let status = ServiceError::Status {
            service: "completion".to_string(),
            status: 503,
            body: String::new(),
        };
        assert_eq!(status.kind(), "status");
        assert_eq!(ServiceError::CircuitOpen("x".into()).kind(), "circuit_open");
        assert_eq!(ServiceError::Empty("x".into()).kind(), "empty");

        let source = serde_json::from_str::<()>("nope").unwrap_err();
        let de = ServiceError::Deserialize {
            context: "search".into(),
            source,
        };
        assert_eq!(de.kind(), "deserialize");
    }

    #[test]
    fn status_message_names_service() {
        let err = ServiceError::Status {
            service: "tei".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "tei returned HTTP 500: boom");
    }
}
