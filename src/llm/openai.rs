// OpenAI-compatible chat-completions judge.
//
// Works against any endpoint that speaks the /chat/completions shape
// (OpenAI, a local vLLM/llama.cpp gateway). Every call carries its own
// request timeout so a slow model never stalls the heuristic pipeline.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_json_response, LlmJudgement, ThreatJudge};

pub struct OpenAiJudge {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiJudge {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        request_timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            temperature: 0.1,
            max_tokens: 2048,
        })
    }
}

#[async_trait]
impl ThreatJudge for OpenAiJudge {
    async fn judge(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmJudgement> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to call LLM endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM endpoint returned {status}: {body}");
        }

        let completion: ChatResponse = response
            .json()
            .await
            .context("Failed to parse LLM response body")?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        debug!(
            model = %self.model,
            content_len = content.len(),
            "LLM judgement received"
        );

        parse_json_response(content)
    }
}

// --- chat-completions request/response types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}
