//! Ollama generate client (streaming NDJSON)

use anyhow::{bail, Context, Result};
use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Token limit hint sent with every request
pub const NUM_PREDICT: u32 = 200;

/// Reply shown to the user when the backend cannot be reached or misbehaves
pub const OLLAMA_ERROR_REPLY: &str = "An error occurred while communicating with Ollama.";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Stream of reply fragments in arrival order
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// One NDJSON object of a streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub done: bool,
}

/// A collected reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Whether the backend signalled completion before the stream ended
    pub done: bool,
}

/// Client for a single Ollama generate endpoint
#[derive(Debug, Clone)]
pub struct OllamaClient {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_timeout(url, model, DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            model: model.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Check whether the server behind the endpoint answers `GET /api/tags`
    pub async fn health_check(&self) -> bool {
        let tags = match reqwest::Url::parse(&self.url).and_then(|u| u.join("/api/tags")) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Invalid Ollama URL");
                return false;
            }
        };

        match self
            .client
            .get(tags)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// POST the prompt and stream back reply fragments
    pub async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        let body = serde_json::to_vec(&GenerateRequest {
            model: &self.model,
            prompt,
            num_predict: NUM_PREDICT,
        })?;

        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(body)
            .send()
            .await
            .context("Failed to connect to Ollama")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Ollama returned {}: {}", status, text.trim());
        }

        Ok(Box::pin(fragments(resp.bytes_stream())))
    }

    /// Concatenate fragments until `done` or the end of the stream.
    ///
    /// A stream that ends without `done` still yields its partial text; one
    /// that ends without any text is an error.
    pub async fn generate(&self, prompt: &str) -> Result<Completion> {
        let mut stream = self.generate_stream(prompt).await?;
        let mut text = String::new();
        let mut done = false;

        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            text.push_str(&fragment.text);
            if fragment.done {
                done = true;
                break;
            }
        }

        if !done {
            if text.is_empty() {
                bail!("Ollama stream ended without a reply");
            }
            warn!(len = text.len(), "Ollama stream ended before completion");
        }

        Ok(Completion { text, done })
    }

    /// Send a prompt; failures are logged and replaced by [`OLLAMA_ERROR_REPLY`]
    pub async fn send(&self, prompt: &str) -> String {
        info!(model = %self.model, url = %self.url, "Sending request to Ollama");
        debug!(prompt, "Ollama prompt");

        match self.generate(prompt).await {
            Ok(completion) => {
                debug!(reply = %completion.text, "Full response from Ollama");
                completion.text
            }
            Err(e) => {
                error!("Error communicating with Ollama: {:#}", e);
                OLLAMA_ERROR_REPLY.to_string()
            }
        }
    }
}

/// Split a byte stream into NDJSON lines and decode each one
fn fragments<S>(bytes: S) -> impl Stream<Item = Result<Fragment>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer = BytesMut::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.context("Failed to read Ollama response")?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.split_to(pos + 1);
                if let Some(fragment) = parse_line(&line)? {
                    yield fragment;
                }
            }
        }

        // Last line may lack a trailing newline
        if let Some(fragment) = parse_line(&buffer)? {
            yield fragment;
        }
    }
}

fn parse_line(line: &[u8]) -> Result<Option<Fragment>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: GenerateChunk = serde_json::from_str(line)
        .with_context(|| format!("Malformed line from Ollama: {}", line))?;

    if let Some(err) = chunk.error {
        bail!("Ollama error: {}", err);
    }

    Ok(Some(Fragment {
        text: chunk.response,
        done: chunk.done,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(GenerateRequest {
            model: "llama2:7b",
            prompt: "hello",
            num_predict: NUM_PREDICT,
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({"model": "llama2:7b", "prompt": "hello", "num_predict": 200})
        );
    }

    #[test]
    fn test_parse_line() {
        let fragment = parse_line(br#"{"response":"hi ","done":false}"#).unwrap();
        assert_eq!(
            fragment,
            Some(Fragment {
                text: "hi ".to_string(),
                done: false
            })
        );

        let last = parse_line(b"{\"response\":\"there\",\"done\":true}\r\n").unwrap();
        assert_eq!(last.map(|f| f.done), Some(true));
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(parse_line(b"   \n").unwrap(), None);
    }

    #[test]
    fn test_parse_malformed_line() {
        assert!(parse_line(b"{not json").is_err());
    }

    #[test]
    fn test_parse_error_object() {
        let err = parse_line(br#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = reqwest::Result<Bytes>> + Send {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_fragments_across_chunk_boundaries() {
        let stream = fragments(chunks(&[
            "{\"response\":\"hi \",\"do",
            "ne\":false}\n{\"response\":\"there\",",
            "\"done\":true}",
        ]));
        let collected: Vec<Fragment> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].text, "hi ");
        assert_eq!(collected[1].text, "there");
        assert!(collected[1].done);
    }

    #[tokio::test]
    async fn test_fragments_stop_on_malformed_line() {
        let stream = fragments(chunks(&["{\"response\":\"a\",\"done\":false}\n", "oops\n"]));
        let collected: Vec<Result<Fragment>> = stream.collect().await;

        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }

    #[test]
    fn test_live_updates() {
        let mut client = OllamaClient::new("http://localhost:11434/api/generate", "llama2:7b");
        client.set_model("mistral:7b");
        client.set_url("http://other:11434/api/generate");
        assert_eq!(client.model(), "mistral:7b");
        assert_eq!(client.url(), "http://other:11434/api/generate");
    }
}
