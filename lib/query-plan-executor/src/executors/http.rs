use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, instrument};

use crate::execution_result::ServiceResponse;
use crate::executors::common::{ServiceExecutor, ServiceRequest};

#[derive(Serialize)]
struct HttpRequestBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Map<String, Value>>,
}

/// Sends sub-requests as standard GraphQL POSTs with a `{query, variables}`
/// JSON body.
pub struct HttpServiceExecutor {
    http_client: reqwest::Client,
}

impl HttpServiceExecutor {
    pub fn new(http_client: reqwest::Client) -> Self {
        HttpServiceExecutor { http_client }
    }

    async fn send(
        &self,
        service_url: &str,
        request: ServiceRequest<'_>,
    ) -> Result<ServiceResponse, reqwest::Error> {
        let body = HttpRequestBody {
            query: request.query,
            variables: request.variables,
        };
        let response = self
            .http_client
            .post(service_url)
            .headers(request.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        response.json::<ServiceResponse>().await
    }
}

impl Default for HttpServiceExecutor {
    fn default() -> Self {
        HttpServiceExecutor::new(reqwest::Client::new())
    }
}

#[async_trait]
impl ServiceExecutor for HttpServiceExecutor {
    #[instrument(level = "trace", skip(self, request), name = "http_service_execute")]
    async fn execute(&self, service_url: &str, request: ServiceRequest<'_>) -> ServiceResponse {
        self.send(service_url, request).await.unwrap_or_else(|e| {
            error!("request to service {} failed: {}", service_url, e);
            ServiceResponse::from_error_message(format!(
                "error executing request to service {}: {}",
                service_url, e
            ))
        })
    }
}
