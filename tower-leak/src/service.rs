use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use http::Request;
use leak_limit::Admit;
use leak_limit::Reason;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;
use tracing::debug;

use crate::error::AdmissionError;

#[derive(Clone, Debug)]
struct AdmissionMetrics {
    admitted: Counter<u64>,
    rejected: Counter<u64>,
}

/// Admits each request onto a channel before handing it to the inner service.
///
/// The assigned [`ChannelId`](leak_limit::ChannelId) is inserted into the request
/// extensions. Saturated requests fail immediately with [`AdmissionError::Saturated`]
/// and never reach the inner service.
#[derive(Debug)]
pub struct AdmissionService<A, S>
where
    A: ?Sized,
{
    inner: S,
    admit: Arc<A>,
    instruments: AdmissionMetrics,
}

pin_project! {
    #[project = ResponseFutureProj]
    /// Either the inner service future or an immediate rejection.
    pub enum ResponseFuture<F> {
        Admitted {
            #[pin]
            inner: F,
        },
        Rejected {
            error: AdmissionError,
        },
    }
}

impl<F, T> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, BoxError>>,
{
    type Output = Result<T, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Admitted { inner } => inner.poll(cx),
            ResponseFutureProj::Rejected { error } => Poll::Ready(Err(Box::new(error.clone()))),
        }
    }
}

impl<A, S> Clone for AdmissionService<A, S>
where
    A: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            admit: Arc::clone(&self.admit),
            instruments: self.instruments.clone(),
        }
    }
}

impl<A, S, B> Service<Request<B>> for AdmissionService<A, S>
where
    A: Admit + ?Sized + Send + Sync + 'static,
    S: Service<Request<B>, Error = BoxError>,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Admission is decided in `call`, so only the inner service can apply backpressure.
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        match self.admit.try_admit() {
            ControlFlow::Continue(channel) => {
                self.instruments
                    .admitted
                    .add(1, &[KeyValue::new("channel", channel.to_string())]);
                req.extensions_mut().insert(channel);
                ResponseFuture::Admitted {
                    inner: self.inner.call(req),
                }
            }
            ControlFlow::Break(Reason::Saturated { retry_after }) => {
                self.instruments.rejected.add(1, &[]);
                debug!(?retry_after, "request rejected, all channels saturated");
                ResponseFuture::Rejected {
                    error: AdmissionError::Saturated { retry_after },
                }
            }
        }
    }
}

impl<A, S> AdmissionService<A, S>
where
    A: ?Sized,
{
    pub fn new(inner: S, admit: Arc<A>) -> Self {
        let meter = global::meter("admission_service");
        let instruments = AdmissionMetrics {
            admitted: meter.u64_counter("admitted").build(),
            rejected: meter.u64_counter("rejected").build(),
        };

        Self {
            inner,
            admit,
            instruments,
        }
    }
}
