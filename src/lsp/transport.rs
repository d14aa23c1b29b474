use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::{AppError, LspResult};

/// JSON-over-HTTP seam between the services and the network. Tests swap in
/// in-memory implementations.
#[async_trait]
pub trait LspTransport: Send + Sync {
    async fn get_json(&self, path: &str) -> LspResult<Value>;

    async fn post_json(&self, path: &str, body: &Value) -> LspResult<Value>;
}

/// reqwest-backed transport rooted at a base URL. No request timeout is
/// applied and failed requests are never retried.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> LspResult<Self> {
        let base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::configuration_error(format!(
                    "Unsupported URL scheme: {}",
                    scheme
                )))
            }
        }

        let client = Client::builder()
            .user_agent(concat!("lsporder/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Join `path` (which may carry a query string) onto the base URL,
    /// keeping any path prefix of the base.
    fn endpoint(&self, path: &str) -> LspResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    async fn read_json(url: &Url, response: reqwest::Response) -> LspResult<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                url = %url,
                status = status.as_u16(),
                "LSP request returned non-success status"
            );
            return Err(non_success(status, body));
        }

        serde_json::from_str(&body).map_err(|e| {
            AppError::parse_error(format!("Response from {} is not valid JSON: {}", url, e), body)
        })
    }
}

/// Every non-2xx status is a transport failure; the status stays in details
fn non_success(status: StatusCode, body: String) -> AppError {
    AppError::transport_error(format!("HTTP {}", status))
        .with_details(json!({ "status": status.as_u16(), "body": body }))
}

#[async_trait]
impl LspTransport for HttpTransport {
    async fn get_json(&self, path: &str) -> LspResult<Value> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        Self::read_json(&url, response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> LspResult<Value> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "POST");
        let response = self.client.post(url.clone()).json(body).send().await?;
        Self::read_json(&url, response).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_rejects_unsupported_scheme() {
        let err = HttpTransport::new("ftp://lsp.example.com").unwrap_err();
        assert_eq!(err.category, ErrorCategory::ConfigurationError);

        let err = HttpTransport::new("not a url").unwrap_err();
        assert_eq!(err.category, ErrorCategory::ConfigurationError);
    }

    #[test]
    fn test_endpoint_keeps_base_prefix_and_query() {
        let transport = HttpTransport::new("https://lsp.example.com/api/").unwrap();
        assert_eq!(
            transport.endpoint("/order/abc").unwrap().as_str(),
            "https://lsp.example.com/api/order/abc"
        );
        assert_eq!(
            transport
                .endpoint("/api/v1/get_order?order_id=x")
                .unwrap()
                .as_str(),
            "https://lsp.example.com/api/api/v1/get_order?order_id=x"
        );
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/get_order"))
            .and(query_param("order_id", "o1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "PAID" })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let value = transport
            .get_json("/api/v1/get_order?order_id=o1")
            .await
            .unwrap();
        assert_eq!(value["state"], "PAID");
    }

    #[tokio::test]
    async fn test_post_json_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .and(body_json(json!({ "hello": "world" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "order_id": "o1" })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let value = transport
            .post_json("/order", &json!({ "hello": "world" }))
            .await
            .unwrap();
        assert_eq!(value["order_id"], "o1");
    }

    #[tokio::test]
    async fn test_non_success_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport.post_json("/order", &json!({})).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::TransportError);
        let details = err.details.unwrap();
        assert_eq!(details["status"], 503);
        assert_eq!(details["body"], "maintenance");
    }

    #[tokio::test]
    async fn test_not_found_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport.post_json("/order", &json!({})).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::TransportError);
        assert_eq!(err.details.as_ref().unwrap()["status"], 404);
        assert!(err.user_message().contains("Could not reach the LSP"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error_with_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport.get_json("/info").await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::ParseError);
        assert_eq!(err.raw_payload(), Some("<html>oops</html>"));
    }
}
