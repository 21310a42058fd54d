use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

use crate::execution_result::ServiceResponse;

/// One outbound GraphQL call: a rendered document plus the client request's
/// variables and forwarded headers. Operation names are never sent.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRequest<'a> {
    pub query: &'a str,
    pub variables: Option<&'a Map<String, Value>>,
    pub headers: &'a HeaderMap,
}

#[async_trait]
pub trait ServiceExecutor {
    async fn execute(&self, service_url: &str, request: ServiceRequest<'_>) -> ServiceResponse;

    fn to_boxed_arc<'a>(self) -> Arc<Box<dyn ServiceExecutor + Send + Sync + 'a>>
    where
        Self: Sized + Send + Sync + 'a,
    {
        Arc::new(Box::new(self))
    }
}

pub type ServiceExecutorType = dyn ServiceExecutor + Send + Sync;

pub type ServiceExecutorBoxedArc = Arc<Box<ServiceExecutorType>>;
