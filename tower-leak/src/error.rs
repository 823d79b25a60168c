use std::time::Duration;

/// Message returned to callers when every channel is saturated.
pub const SATURATED_MESSAGE: &str = "Too Many Requests. Please try again later.";

/// Errors produced by the admission middleware.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmissionError {
    /// Every channel was at capacity.
    ///
    /// No retry is attempted; `retry_after` hints when a channel should have room again.
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header when a hint is available.
    #[error("{}", SATURATED_MESSAGE)]
    Saturated {
        /// The duration to wait before retrying, if any channel drains at all.
        retry_after: Option<Duration>,
    },

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AdmissionError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, retry_after) = match self {
            Self::Saturated { retry_after } => (StatusCode::TOO_MANY_REQUESTS, retry_after),
            Self::Inner(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let body = axum::Json(serde_json::json!({ "detail": self.to_string() }));
        let mut response = (status, body).into_response();
        if let Some(retry_after) = retry_after {
            // Whole seconds, rounded up, never zero.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            let val = axum::http::HeaderValue::from(secs.max(1));
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, val);
        }
        response
    }
}
