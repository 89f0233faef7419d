//! Signaling exchange with the remote processing peer
//!
//! One HTTP POST carries the complete local offer and the pipeline
//! descriptor; the response body carries the answer SDP. There is no
//! candidate trickling and no retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SignalingConfig;
use crate::error::{AppError, Result};

/// SDP offer as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpOffer {
    /// SDP content
    pub sdp: String,
    /// Always "offer"
    #[serde(rename = "type")]
    pub kind: String,
}

impl SdpOffer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: "offer".to_string(),
        }
    }
}

/// Request body of the offer endpoint
#[derive(Debug, Clone, Serialize)]
pub struct OfferRequest<'a> {
    pub offer: SdpOffer,
    pub prompt: &'a PipelineDescriptor,
}

/// Response body of the offer endpoint
///
/// Only `sdp` is required; the answer type is implied.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerResponse {
    pub sdp: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Processing pipeline sent verbatim to the remote peer
///
/// The content is never inspected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineDescriptor(serde_json::Value);

impl PipelineDescriptor {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Built-in pass-through pipeline (load image, preview image)
    pub fn default_passthrough() -> Self {
        Self(serde_json::json!({
            "12": {
                "inputs": { "image": "sampled_frame.jpg", "upload": "image" },
                "class_type": "LoadImage",
                "_meta": { "title": "Load Image" }
            },
            "13": {
                "inputs": { "images": ["12", 0] },
                "class_type": "PreviewImage",
                "_meta": { "title": "Preview Image" }
            }
        }))
    }

    /// Load a descriptor from a JSON file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("Failed to read prompt {}: {}", path.display(), e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        Ok(Self(value))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl Default for PipelineDescriptor {
    fn default() -> Self {
        Self::default_passthrough()
    }
}

/// Offer/answer exchange capability
#[async_trait]
pub trait SignalingExchange: Send + Sync {
    /// Send the local offer, returning the remote answer SDP
    async fn exchange(&self, offer_sdp: &str, prompt: &PipelineDescriptor) -> Result<String>;
}

/// HTTP signaling client
pub struct HttpSignalingClient {
    client: reqwest::Client,
    url: String,
}

impl HttpSignalingClient {
    pub fn new(config: &SignalingConfig) -> Result<Self> {
        Self::with_timeout(&config.url, config.timeout())
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

}

/// Extract the answer SDP from a response body
pub fn parse_answer(body: &str) -> Result<String> {
    let answer: AnswerResponse = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedAnswer(format!("invalid JSON: {}", e)))?;

    if let Some(kind) = answer.kind.as_deref() {
        if kind != "answer" {
            return Err(AppError::MalformedAnswer(format!(
                "unexpected description type '{}'",
                kind
            )));
        }
    }

    match answer.sdp {
        Some(sdp) if !sdp.trim().is_empty() => Ok(sdp),
        Some(_) => Err(AppError::MalformedAnswer("empty sdp field".to_string())),
        None => Err(AppError::MalformedAnswer("missing sdp field".to_string())),
    }
}

#[async_trait]
impl SignalingExchange for HttpSignalingClient {
    async fn exchange(&self, offer_sdp: &str, prompt: &PipelineDescriptor) -> Result<String> {
        let request = OfferRequest {
            offer: SdpOffer::new(offer_sdp),
            prompt,
        };

        info!("Sending offer to {} ({} bytes SDP)", self.url, offer_sdp.len());

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::SignalingUnreachable(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AppError::SignalingUnreachable(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::SignalingUnreachable(format!("Failed to read answer: {}", e)))?;
        debug!("Answer body: {} bytes", body.len());

        parse_answer(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/offer", addr)
    }

    fn client(url: &str) -> HttpSignalingClient {
        HttpSignalingClient::with_timeout(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_request_shape() {
        let prompt = PipelineDescriptor::default_passthrough();
        let request = OfferRequest {
            offer: SdpOffer::new("v=0"),
            prompt: &prompt,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["offer"]["sdp"], "v=0");
        assert_eq!(json["offer"]["type"], "offer");
        assert_eq!(json["prompt"]["12"]["class_type"], "LoadImage");
        assert_eq!(json["prompt"]["13"]["inputs"]["images"][0], "12");
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(r#"{"sdp":"S2"}"#).unwrap(), "S2");
        assert_eq!(parse_answer(r#"{"sdp":"S2","type":"answer"}"#).unwrap(), "S2");
        assert!(matches!(parse_answer("not json"), Err(AppError::MalformedAnswer(_))));
        assert!(matches!(parse_answer(r#"{"answer":"S2"}"#), Err(AppError::MalformedAnswer(_))));
        assert!(matches!(parse_answer(r#"{"sdp":""}"#), Err(AppError::MalformedAnswer(_))));
        assert!(matches!(
            parse_answer(r#"{"sdp":"S2","type":"offer"}"#),
            Err(AppError::MalformedAnswer(_))
        ));
    }

    #[tokio::test]
    async fn test_prompt_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.json");
        tokio::fs::write(&path, r#"{"1":{"class_type":"Custom"}}"#).await.unwrap();

        let prompt = PipelineDescriptor::from_file(&path).await.unwrap();
        assert_eq!(prompt.as_value()["1"]["class_type"], "Custom");

        tokio_test::assert_err!(PipelineDescriptor::from_file(&dir.path().join("missing.json")).await);
    }

    #[tokio::test]
    async fn test_exchange_posts_offer_and_prompt() {
        let received = Arc::new(Mutex::new(None::<serde_json::Value>));
        let captured = received.clone();
        let app = Router::new().route(
            "/offer",
            post(move |Json(body): Json<serde_json::Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().await = Some(body);
                    Json(serde_json::json!({ "sdp": "S2", "type": "answer" }))
                }
            }),
        );
        let url = serve(app).await;

        let answer = client(&url)
            .exchange("S1", &PipelineDescriptor::default_passthrough())
            .await
            .unwrap();
        assert_eq!(answer, "S2");

        let body = received.lock().await.clone().unwrap();
        assert_eq!(body["offer"]["sdp"], "S1");
        assert_eq!(body["offer"]["type"], "offer");
        assert_eq!(body["prompt"], PipelineDescriptor::default_passthrough().as_value().clone());
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let app = Router::new().route(
            "/offer",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = serve(app).await;

        let result = client(&url).exchange("S1", &PipelineDescriptor::default()).await;
        assert!(matches!(result, Err(AppError::SignalingUnreachable(_))));
    }

    #[tokio::test]
    async fn test_non_ok_success_status_is_unreachable() {
        let app = Router::new().route(
            "/offer",
            post(|| async { (StatusCode::CREATED, Json(serde_json::json!({ "sdp": "S2" }))) }),
        );
        let url = serve(app).await;

        let result = client(&url).exchange("S1", &PipelineDescriptor::default()).await;
        assert!(matches!(result, Err(AppError::SignalingUnreachable(_))));
    }

    #[tokio::test]
    async fn test_missing_sdp_is_malformed() {
        let app = Router::new().route(
            "/offer",
            post(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        );
        let url = serve(app).await;

        let result = client(&url).exchange("S1", &PipelineDescriptor::default()).await;
        assert!(matches!(result, Err(AppError::MalformedAnswer(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(&format!("http://{}/offer", addr))
            .exchange("S1", &PipelineDescriptor::default())
            .await;
        assert!(matches!(result, Err(AppError::SignalingUnreachable(_))));
    }
}
