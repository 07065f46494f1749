//! Visit event delivery to the ingestion endpoint.
//!
//! Each record is sent with a single JSON `POST`. There is no retry and no
//! backlog: the outcome is returned to the caller, which logs it.

use crate::config::IngestionConfig;
use crate::types::VisitRecord;
use tracing::{debug, error, info, warn};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Endpoint accepted the record (2xx)
    Delivered {
        status: u16,
        body: serde_json::Value,
    },
    /// Endpoint answered with a non-success status
    Rejected {
        status: u16,
        body: serde_json::Value,
    },
    /// Transport-level failure, nothing was received
    Failed { reason: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    /// Log the outcome for the record sent to `url`
    pub fn log(&self, url: &str) {
        match self {
            DispatchOutcome::Delivered { status, body } => {
                info!("Visit recorded for {} ({}): {}", url, status, body);
            }
            DispatchOutcome::Rejected { status, body } => {
                error!("Ingestion rejected visit for {} ({}): {}", url, status, body);
            }
            DispatchOutcome::Failed { reason } => {
                error!("Failed to send visit for {}: {}", url, reason);
            }
        }
    }
}

/// Errors building the dispatcher
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid ingestion endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Consumer of assembled visit records
#[async_trait::async_trait]
pub trait VisitSink: Send + Sync {
    /// Deliver a record, taking ownership of it
    async fn send(&self, record: VisitRecord) -> DispatchOutcome;
}

/// HTTP dispatcher for the visit ingestion endpoint
pub struct EventDispatcher {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl EventDispatcher {
    pub fn new(config: &IngestionConfig) -> Result<Self, DispatchError> {
        let endpoint = url::Url::parse(&config.endpoint)
            .map_err(|e| DispatchError::InvalidEndpoint(config.endpoint.clone(), e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait::async_trait]
impl VisitSink for EventDispatcher {
    async fn send(&self, record: VisitRecord) -> DispatchOutcome {
        debug!(
            "POST {} for {} (hash {})",
            self.endpoint,
            record.url(),
            record.content_hash()
        );

        let response = match self
            .client
            .post(self.endpoint.clone())
            .json(&record)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(text) => parse_body(&text),
            Err(e) => {
                warn!("Failed to read ingestion response body: {}", e);
                serde_json::Value::Null
            }
        };

        if status.is_success() {
            DispatchOutcome::Delivered {
                status: status.as_u16(),
                body,
            }
        } else {
            DispatchOutcome::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Parse a response body as JSON, keeping raw text when it is not JSON
fn parse_body(text: &str) -> serde_json::Value {
    if text.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualificationTrigger, QualifiedVisit, VisitMetadata};
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn record(content: &str) -> VisitRecord {
        let visit = QualifiedVisit {
            tab_id: 1,
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            dwell: Duration::from_secs(1200),
            trigger: QualificationTrigger::Interval,
        };
        VisitRecord::assemble(&visit, content.to_string(), VisitMetadata::default(), chrono::Utc::now())
            .unwrap()
    }

    fn dispatcher(server: &MockServer) -> EventDispatcher {
        EventDispatcher::new(&IngestionConfig {
            endpoint: format!("{}/visit", server.uri()),
            request_timeout_seconds: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/visit"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "url": "https://example.com",
                "content": "X",
                "version": 0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Successfully recorded visit for https://example.com Version: 0"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = dispatcher(&mock_server).send(record("X")).await;

        assert!(outcome.is_delivered());
        match outcome {
            DispatchOutcome::Delivered { status, body } => {
                assert_eq!(status, 200);
                assert!(body["message"].as_str().unwrap().contains("example.com"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/visit"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "db down"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = dispatcher(&mock_server).send(record("X")).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                status: 500,
                body: serde_json::json!({"error": "db down"}),
            }
        );
    }

    #[tokio::test]
    async fn test_non_json_error_body_kept_as_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad payload"))
            .mount(&mock_server)
            .await;

        let outcome = dispatcher(&mock_server).send(record("X")).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                status: 422,
                body: serde_json::Value::String("bad payload".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        // Bind then drop a server so the port refuses connections
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };

        let dispatcher = EventDispatcher::new(&IngestionConfig {
            endpoint: format!("{}/visit", uri),
            request_timeout_seconds: 2,
        })
        .unwrap();

        let outcome = dispatcher.send(record("X")).await;
        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = EventDispatcher::new(&IngestionConfig {
            endpoint: "not a url".to_string(),
            request_timeout_seconds: 2,
        });
        assert!(matches!(result, Err(DispatchError::InvalidEndpoint(..))));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), serde_json::Value::Null);
        assert_eq!(parse_body(r#"{"ok":true}"#), serde_json::json!({"ok": true}));
        assert_eq!(parse_body("oops"), serde_json::Value::String("oops".to_string()));
    }
}
