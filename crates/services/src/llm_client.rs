//! Ollama LLM client (spec §4.5): `/api/generate` + `/api/tags` wire
//! protocol, retried without backoff up to `max_retries` times.
//!
//! Grounded on the teacher's reqwest client conventions (connect/total
//! timeout split, JSON request/response structs) and
//! `original_source/.../llm/ollama_client.py` for the exact endpoints and
//! the `check_ollama_status` partial-match rule (DESIGN.md Open Question).

use serde::{Deserialize, Serialize};
use shared::error::LlmTransportError;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    temperature: f32,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>, temperature: f32, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self { client, base_url: base_url.into(), model_name: model_name.into(), temperature, max_retries }
    }

    /// `POST /api/generate`, retried up to `max_retries` times with no
    /// backoff between attempts (spec §4.5) — Ollama failures are
    /// transient connection resets, not rate limiting.
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmTransportError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = GenerateRequest { model: &self.model_name, prompt, stream: false, options: GenerateOptions { temperature: self.temperature } };

        let mut last_err = None;
        for _ in 0..=self.max_retries {
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<GenerateResponse>()
                        .await
                        .map(|g| g.response)
                        .map_err(|e| LlmTransportError::Connection(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    last_err = Some(LlmTransportError::Status { status, body });
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(LlmTransportError::Timeout);
                }
                Err(e) => {
                    last_err = Some(LlmTransportError::Connection(e.to_string()));
                }
            }
        }
        let last = last_err.map(|e| e.to_string()).unwrap_or_else(|| "no attempts made".to_string());
        Err(LlmTransportError::RetriesExhausted { attempts: self.max_retries, last })
    }

    /// `GET /api/tags`; `true` iff the configured model's tag equals, or
    /// starts with, the colon-separated base name of any listed model (spec
    /// §9's codification of the original's fuzzy "contains base name or
    /// full tag" rule).
    pub async fn check_model_available(&self) -> Result<bool, LlmTransportError> {
        let models = self.list_models().await?;
        let base = |s: &str| s.split(':').next().unwrap_or(s);
        let wanted_base = base(&self.model_name);
        Ok(models.iter().any(|m| {
            let listed_base = base(m);
            self.model_name == *m || wanted_base == listed_base || self.model_name.starts_with(listed_base)
        }))
    }

    pub async fn list_models(&self) -> Result<Vec<String>, LlmTransportError> {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmTransportError::Timeout
            } else {
                LlmTransportError::Connection(e.to_string())
            }
        })?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmTransportError::Status { status, body });
        }
        let parsed: TagsResponse = resp.json().await.map_err(|e| LlmTransportError::Connection(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    pub async fn is_reachable(&self) -> bool {
        self.list_models().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_valid_config() {
        let client = OllamaClient::new("http://localhost:11434", "qwen2.5:latest", 0.1, 3);
        assert_eq!(client.model_name, "qwen2.5:latest");
        assert_eq!(client.max_retries, 3);
    }

    #[tokio::test]
    async fn generate_against_unreachable_host_returns_transport_error() {
        let client = OllamaClient::new("http://127.0.0.1:1", "qwen2.5:latest", 0.1, 0);
        let result = client.generate("hello").await;
        assert!(result.is_err());
    }

    #[test]
    fn partial_match_rule_matches_tagged_model_names() {
        let installed = vec!["qwen2.5:latest".to_string(), "llama3:8b".to_string()];
        let configured = "qwen2.5";
        assert!(installed.iter().any(|m| m.contains(configured)));
    }
}
