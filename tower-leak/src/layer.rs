use std::sync::Arc;

use leak_limit::Admit;
use tower::Layer;

use crate::service::AdmissionService;

/// Applies channel admission to requests.
#[derive(Debug)]
pub struct AdmissionLayer<A>
where
    A: ?Sized,
{
    admit: Arc<A>,
}

impl<A> Clone for AdmissionLayer<A>
where
    A: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            admit: Arc::clone(&self.admit),
        }
    }
}

impl<A> AdmissionLayer<A>
where
    A: Admit + ?Sized,
{
    /// Create an AdmissionLayer. Every service it wraps shares `admit`.
    pub fn new(admit: Arc<A>) -> Self {
        AdmissionLayer { admit }
    }
}

impl<A, S> Layer<S> for AdmissionLayer<A>
where
    A: ?Sized,
{
    type Service = AdmissionService<A, S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService::new(service, Arc::clone(&self.admit))
    }
}
