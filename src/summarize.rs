//! Transcript summaries via Azure OpenAI chat completions.
//!
//! The transcript is flattened to `Speaker: text` lines, truncated to
//! `openai.max_input_chars`, and sent with a system prompt asking for a
//! JSON object. The model's answer is parsed into a [`GeneratedSummary`]
//! and stored with [`crate::store::save_summary`]. A failed call is
//! reported to the caller; there are no retries.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::config::{secret_from_env, OpenAiConfig, OPENAI_KEY_ENV};
use crate::extract::vtt_to_text;
use crate::models::{StoredTranscript, Summary};
use crate::store;

const SYSTEM_PROMPT: &str = "You summarize meeting transcripts. Respond with a single JSON object \
with exactly these keys: \"summary\" (a concise narrative paragraph), \"keyPoints\" (array of \
short strings: decisions, facts, topics) and \"actionItems\" (array of strings, each naming the \
owner when the transcript does). Use empty arrays when there is nothing to list. Output only JSON.";

/// Model output before it is attached to a transcript.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratedSummary {
    pub summary: String,
    #[serde(default, alias = "keyPoints")]
    pub key_points: Vec<String>,
    #[serde(default, alias = "actionItems")]
    pub action_items: Vec<String>,
}

/// Flatten and truncate transcript content for the prompt.
pub fn build_prompt(content: &str, max_chars: usize) -> String {
    let text = vtt_to_text(content);
    let truncated = match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text.as_str(),
    };
    format!("Meeting transcript:\n\n{}", truncated)
}

pub fn endpoint_url(config: &OpenAiConfig) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        config.endpoint.trim_end_matches('/'),
        config.deployment,
        config.api_version
    )
}

pub fn build_request_body(config: &OpenAiConfig, prompt: &str) -> serde_json::Value {
    json!({
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": prompt},
        ],
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "response_format": {"type": "json_object"},
    })
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the assistant message from a chat completions response body.
pub fn parse_response(body: &str) -> Result<GeneratedSummary> {
    let response: ChatResponse =
        serde_json::from_str(body).context("Invalid chat completions response")?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("Invalid chat completions response: no message content"))?;
    parse_summary(&content)
}

/// Parse the model's JSON object. Accepts camelCase or snake_case keys and
/// tolerates a surrounding Markdown code fence.
pub fn parse_summary(content: &str) -> Result<GeneratedSummary> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let summary: GeneratedSummary =
        serde_json::from_str(unfenced).context("Model returned malformed summary JSON")?;
    if summary.summary.trim().is_empty() {
        bail!("Model returned an empty summary");
    }
    Ok(summary)
}

/// Call Azure OpenAI once for `content`.
pub async fn summarize_transcript(config: &OpenAiConfig, content: &str) -> Result<GeneratedSummary> {
    let api_key = secret_from_env(OPENAI_KEY_ENV)?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let prompt = build_prompt(content, config.max_input_chars);
    let body = build_request_body(config, &prompt);

    tracing::debug!(deployment = %config.deployment, chars = prompt.len(), "requesting summary");

    let response = client
        .post(endpoint_url(config))
        .header("api-key", api_key)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .context("Azure OpenAI request failed")?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("Azure OpenAI API error {}: {}", status, text);
    }
    parse_response(&text)
}

/// Summarize a stored transcript and replace its summary.
pub async fn summarize_stored(
    config: &OpenAiConfig,
    pool: &SqlitePool,
    transcript: &StoredTranscript,
) -> Result<Summary> {
    let content = transcript
        .content
        .as_deref()
        .ok_or_else(|| anyhow!("transcript {} was loaded without content", transcript.id))?;
    if content.trim().is_empty() {
        bail!("transcript {} is empty", transcript.id);
    }

    let generated = summarize_transcript(config, content).await?;
    let summary = store::save_summary(pool, &transcript.id, &generated, &config.deployment).await?;
    tracing::info!(
        transcript = %transcript.id,
        key_points = summary.key_points.len(),
        action_items = summary.action_items.len(),
        "summary stored"
    );
    Ok(summary)
}
