use std::collections::HashMap;

use tracing::{instrument, warn};

use crate::execution_result::ServiceResponse;
use crate::executors::common::{ServiceExecutor, ServiceExecutorBoxedArc, ServiceRequest};
use crate::executors::http::HttpServiceExecutor;

/// Routes sub-requests to per-service executors by service URL. A fallback
/// executor (HTTP in production, stubs in tests) handles URLs without a
/// dedicated entry.
#[derive(Default)]
pub struct ServiceExecutorMap {
    inner: HashMap<String, ServiceExecutorBoxedArc>,
    fallback: Option<ServiceExecutorBoxedArc>,
}

impl ServiceExecutorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every service reached over plain GraphQL-over-HTTP.
    pub fn from_http() -> Self {
        ServiceExecutorMap {
            inner: HashMap::new(),
            fallback: Some(HttpServiceExecutor::default().to_boxed_arc()),
        }
    }

    pub fn insert_boxed_arc(&mut self, service_url: String, executor: ServiceExecutorBoxedArc) {
        self.inner.insert(service_url, executor);
    }

    pub fn set_fallback(&mut self, executor: ServiceExecutorBoxedArc) {
        self.fallback = Some(executor);
    }

    #[instrument(level = "trace", skip_all, fields(service_url = %service_url))]
    pub async fn execute(
        &self,
        service_url: &str,
        request: ServiceRequest<'_>,
    ) -> ServiceResponse {
        let executor = self.inner.get(service_url).or(self.fallback.as_ref());
        match executor {
            Some(executor) => executor.execute(service_url, request).await,
            None => {
                warn!("no executor registered for service: {}", service_url);
                ServiceResponse::from_error_message(format!(
                    "no executor registered for service {}",
                    service_url
                ))
            }
        }
    }
}
