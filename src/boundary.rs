//! Boundary RPC between the client orchestrator and the server cache
//!
//! The request and response bodies match the dashboard's JSON endpoint.
//! `DataService` is the seam the client calls: the server cache implements
//! it in-process and `HttpDataService` implements it over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::data::{OperationKind, Parameters};

/// Path of the JSON endpoint
pub const ENDPOINT_PATH: &str = "/api/financial-data";

/// Status reported when the boundary itself could not be reached
pub const TRANSPORT_FAILURE_STATUS: u16 = 503;

/// A request for one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    /// API key passed through to the provider
    #[serde(default, alias = "apiKey", skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Operation kind name, validated by the server
    #[serde(alias = "dataType")]
    pub operation_kind: String,
    #[serde(default, alias = "params")]
    pub parameters: Parameters,
}

impl DataRequest {
    pub fn new(kind: OperationKind, parameters: Parameters, credential: Option<String>) -> Self {
        Self {
            credential,
            operation_kind: kind.as_str().to_string(),
            parameters,
        }
    }
}

/// JSON body of a boundary response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

/// A boundary response: HTTP-equivalent status plus body
#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl DataResponse {
    pub fn ok(body: ResponseBody) -> Self {
        Self { status: 200, body }
    }

    /// Hard failure: `{ error }` only
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ResponseBody {
                error: Some(error.into()),
                ..Default::default()
            },
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The call the client orchestrator makes to reach the server cache
#[async_trait]
pub trait DataService: Send + Sync {
    async fn call(&self, request: DataRequest) -> DataResponse;
}

/// `DataService` over HTTP, posting to a remote `/api/financial-data`
#[derive(Debug, Clone)]
pub struct HttpDataService {
    http_client: Client,
    endpoint: String,
}

impl HttpDataService {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), ENDPOINT_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DataService for HttpDataService {
    async fn call(&self, request: DataRequest) -> DataResponse {
        let response = match self.http_client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "boundary request failed");
                return DataResponse::failure(TRANSPORT_FAILURE_STATUS, e.to_string());
            }
        };

        let status = response.status().as_u16();
        match response.json::<ResponseBody>().await {
            Ok(body) => DataResponse { status, body },
            Err(e) => {
                warn!(status, error = %e, "boundary response was not valid JSON");
                let mut failure =
                    DataResponse::failure(status, format!("invalid response body: {}", e));
                if failure.is_success() {
                    failure.status = 502;
                }
                failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let mut parameters = Parameters::new();
        parameters.insert("symbol".to_string(), json!("AAPL"));
        let request = DataRequest::new(
            OperationKind::SingleQuote,
            parameters,
            Some("key".to_string()),
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "credential": "key",
                "operationKind": "single-quote",
                "parameters": {"symbol": "AAPL"}
            })
        );
    }

    #[test]
    fn test_request_accepts_dashboard_field_names() {
        let request: DataRequest = serde_json::from_value(json!({
            "apiKey": "key",
            "dataType": "stock-quote",
            "params": {"symbol": "MSFT"}
        }))
        .unwrap();

        assert_eq!(request.credential.as_deref(), Some("key"));
        assert_eq!(request.operation_kind, "stock-quote");
        assert_eq!(request.parameters["symbol"], "MSFT");
    }

    #[test]
    fn test_request_without_credential_or_parameters() {
        let request: DataRequest =
            serde_json::from_value(json!({"operationKind": "valuation-ratio"})).unwrap();
        assert!(request.credential.is_none());
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn test_body_omits_absent_fields() {
        let body = ResponseBody {
            data: Some(json!({"price": 1.0})),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"data": {"price": 1.0}}));

        let failure = DataResponse::failure(400, "API key is required");
        assert_eq!(
            serde_json::to_value(&failure.body).unwrap(),
            json!({"error": "API key is required"})
        );
        assert!(!failure.is_success());
    }

    #[test]
    fn test_stale_body_shape() {
        let body = ResponseBody {
            data: Some(json!(1)),
            error: Some("refresh failed".to_string()),
            cached: true,
            stale: true,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"data": 1, "error": "refresh failed", "cached": true, "stale": true})
        );
    }

    #[test]
    fn test_http_endpoint() {
        let service = HttpDataService::new("http://127.0.0.1:3000/");
        assert_eq!(service.endpoint(), "http://127.0.0.1:3000/api/financial-data");
    }

    #[tokio::test]
    async fn test_http_transport_failure_is_503() {
        // Reserve a free port, then close it so the connection is refused
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = HttpDataService::new(&format!("http://{}", addr));
        let response = service
            .call(DataRequest::new(
                OperationKind::ValuationRatio,
                Parameters::new(),
                Some("k".to_string()),
            ))
            .await;

        assert_eq!(response.status, TRANSPORT_FAILURE_STATUS);
        assert!(response.body.error.is_some());
        assert!(response.body.data.is_none());
    }
}
