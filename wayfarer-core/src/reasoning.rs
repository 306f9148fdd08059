// Reasoning-service boundary. The service contract is a single
// `invoke(prompt) -> string`; all structure is imposed on this side via
// prompt templates and best-effort JSON extraction from replies.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Failure here degrades to "not found", never a hang, so the timeout is
/// generous rather than tight.
const INVOKE_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// HTTP-backed reasoning service speaking the common chat-completions
/// wire shape.
pub struct HttpReasoningService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReasoningService {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(INVOKE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: std::env::var("WAYFARER_REASONING_KEY").ok(),
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningService {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response: Value = request.send().await?.json().await?;
        let content = response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CoreError::Reasoning("reply carried no message content".to_string())
            })?;
        debug!(chars = content.len(), "reasoning service replied");
        Ok(content.to_string())
    }
}

/// Deterministic reasoning service for tests and offline development:
/// replays a fixed queue of replies and counts invocations.
#[derive(Default)]
pub struct CannedReasoner {
    replies: Mutex<VecDeque<String>>,
    invocations: AtomicUsize,
}

impl CannedReasoner {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for CannedReasoner {
    async fn invoke(&self, _prompt: &str) -> Result<String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::Reasoning("canned replies exhausted".to_string()))
    }
}

/// Best-effort JSON extraction from a free-form reply: direct parse,
/// fenced code block, then first-to-last brace scan.
pub fn extract_json(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```")
            && let Ok(v) = serde_json::from_str(after[..end].trim())
        {
            return Some(v);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close))
            && start < end
            && let Ok(v) = serde_json::from_str(&trimmed[start..=end])
        {
            return Some(v);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_json_direct() {
        let v = extract_json(r#"{"label": "orders"}"#).unwrap();
        assert_eq!(v["label"], "orders");
    }

    #[test]
    fn test_extract_json_fenced_block() {
        let reply = "Here you go:\n```json\n{\"label\": \"orders\"}\n```\nAnything else?";
        let v = extract_json(reply).unwrap();
        assert_eq!(v["label"], "orders");
    }

    #[test]
    fn test_extract_json_embedded_braces() {
        let reply = "The best match is {\"selector\": \"#save\"} based on the snapshot.";
        let v = extract_json(reply).unwrap();
        assert_eq!(v["selector"], "#save");
    }

    #[test]
    fn test_extract_json_none_for_prose() {
        assert!(extract_json("no structured content here").is_none());
    }

    #[tokio::test]
    async fn test_canned_reasoner_counts_invocations() {
        let reasoner = CannedReasoner::new(vec!["first", "second"]);
        assert_eq!(reasoner.invoke("p").await.unwrap(), "first");
        assert_eq!(reasoner.invoke("p").await.unwrap(), "second");
        assert!(reasoner.invoke("p").await.is_err());
        assert_eq!(reasoner.invocations(), 3);
    }

    #[tokio::test]
    async fn test_http_reasoning_service_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"label\": \"home\"}"}}]
            })))
            .mount(&server)
            .await;

        let service =
            HttpReasoningService::new(format!("{}/v1/chat/completions", server.uri()), "test-model")
                .unwrap();
        let reply = service.invoke("describe this page").await.unwrap();
        assert_eq!(extract_json(&reply).unwrap()["label"], "home");
    }

    #[tokio::test]
    async fn test_http_reasoning_service_malformed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let service = HttpReasoningService::new(server.uri(), "test-model").unwrap();
        assert!(service.invoke("prompt").await.is_err());
    }
}
