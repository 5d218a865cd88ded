//! Client for the hosted "New API" backend (one JSON object per reply)

use crate::config::AuthScheme;
use anyhow::{bail, Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reply shown to the user when the backend cannot be reached or misbehaves
pub const NEW_API_ERROR_REPLY: &str = "An error occurred while communicating with New API.";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct NewApiClient {
    url: String,
    key: String,
    model: String,
    auth: AuthScheme,
    response_field: String,
    client: reqwest::Client,
}

impl NewApiClient {
    pub fn new(url: impl Into<String>, key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            key: key.into(),
            model: model.into(),
            auth: AuthScheme::Bearer,
            response_field: "response".to_string(),
            client,
        }
    }

    /// Choose how the key is transmitted
    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    /// Name of the JSON field that carries the reply
    pub fn with_response_field(mut self, field: impl Into<String>) -> Self {
        self.response_field = field.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
        });
        if self.auth == AuthScheme::Body {
            body["api_key"] = json!(self.key);
        }
        body
    }

    /// POST the prompt and extract the reply field
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let mut req = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(serde_json::to_vec(&self.request_body(prompt))?);

        if self.auth == AuthScheme::Bearer {
            req = req.header(AUTHORIZATION, format!("Bearer {}", self.key));
        }

        let resp = req.send().await.context("Failed to connect to New API")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read New API response")?;
        debug!(status = %status, body = %text, "Raw response from New API");

        if !status.is_success() {
            bail!("New API returned {}: {}", status, text.trim());
        }

        extract_reply(&text, &self.response_field)
    }

    /// Send a prompt; failures are logged and replaced by [`NEW_API_ERROR_REPLY`]
    pub async fn send(&self, prompt: &str) -> String {
        info!(model = %self.model, url = %self.url, "Sending request to New API");

        match self.complete(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Error communicating with New API: {:#}", e);
                NEW_API_ERROR_REPLY.to_string()
            }
        }
    }
}

fn extract_reply(body: &str, field: &str) -> Result<String> {
    let payload: Value = serde_json::from_str(body).context("Invalid New API response")?;

    match payload.get(field).and_then(Value::as_str) {
        Some(reply) => Ok(reply.to_string()),
        None => bail!("New API response has no string field '{}': {}", field, payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_body_omits_key() {
        let client = NewApiClient::new("https://example.com/api/generate", "secret", "m1");
        let body = client.request_body("hello");
        assert_eq!(body, json!({"model": "m1", "prompt": "hello"}));
    }

    #[test]
    fn test_body_auth_includes_key() {
        let client = NewApiClient::new("https://example.com/api/generate", "secret", "m1")
            .with_auth(AuthScheme::Body);
        let body = client.request_body("hello");
        assert_eq!(body["api_key"], "secret");
        assert_eq!(body["model"], "m1");
    }

    #[test]
    fn test_extract_reply() {
        assert_eq!(
            extract_reply(r#"{"response":"pong","id":3}"#, "response").unwrap(),
            "pong"
        );
        assert_eq!(extract_reply(r#"{"text":"pong"}"#, "text").unwrap(), "pong");
    }

    #[test]
    fn test_extract_reply_errors() {
        assert!(extract_reply("not json", "response").is_err());
        assert!(extract_reply(r#"{"other":"x"}"#, "response").is_err());
        assert!(extract_reply(r#"{"response":42}"#, "response").is_err());
    }
}
