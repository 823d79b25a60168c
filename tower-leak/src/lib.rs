//! # Tower Leak
//!
//! `tower-leak` puts a [`leak_limit::ChannelPool`] (or any other [`leak_limit::Admit`]
//! implementation) in front of a [Tower](https://github.com/tower-rs/tower) service.
//!
//! ## Behaviour
//!
//! 1. **Fail Fast**: A request is admitted or rejected at `call` time. There is no queueing
//!    and no internal retry; a saturated pool yields [`AdmissionError::Saturated`] at once,
//!    carrying a `retry_after` hint for the caller's own backoff.
//! 2. **Channel Tagging**: Admitted requests carry their [`leak_limit::ChannelId`] in the
//!    request extensions, so handlers can report which channel served them.
//! 3. **Metrics**: `admitted` (per channel) and `rejected` counters are recorded on the
//!    global OpenTelemetry meter `admission_service`.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`AdmissionError`] (429 with `Retry-After`, or 500).

mod error;
mod layer;
mod service;


pub use error::AdmissionError;
pub use error::SATURATED_MESSAGE;
pub use layer::AdmissionLayer;
pub use service::AdmissionService;
pub use service::ResponseFuture;
