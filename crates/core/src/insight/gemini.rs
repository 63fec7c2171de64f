//! # Gemini Insight Client
//!
//! Production `InsightProvider` speaking the Gemini REST API. The three
//! JSON-shaped calls pin the output with a response schema and parse the
//! returned text as the typed struct; the coach call consumes the SSE
//! variant of `streamGenerateContent`.

use super::{
    ChatFragmentStream, HealthTip, InsightConfig, InsightError, InsightProvider, MacroEstimate,
    MacroProfile, ProductInsight, prompts,
};
use crate::catalog::Category;
use crate::coach::{ChatMessage, ChatRole};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

/// Timeout for the single request/response calls. The streaming call has
/// no overall deadline; a dropped connection surfaces as a stream error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the hosted generative language service
pub struct GeminiInsight {
    http: reqwest::Client,
    config: InsightConfig,
    api_key: String,
}

impl GeminiInsight {
    /// Build a client with the API key from the environment
    /// (`GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`).
    pub fn from_env(config: &InsightConfig) -> Result<Self, InsightError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| InsightError::MissingApiKey)?;
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit API key
    pub fn with_api_key(
        config: &InsightConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, InsightError> {
        let http = reqwest::Client::builder()
            .user_agent("apex-store/1.0")
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            action
        )
    }

    /// One schema-constrained generateContent round trip, returning the
    /// candidate text.
    async fn generate(
        &self,
        system: &str,
        user_text: String,
        schema: Value,
    ) -> Result<String, InsightError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_text }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        });

        let response = self
            .http
            .post(self.endpoint("generateContent"))
            .query(&[("key", self.api_key.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("provider call failed with status {}", status);
            return Err(InsightError::Provider {
                status: status.as_u16(),
                message: provider_message(&body),
            });
        }

        let payload: Value = response.json().await?;
        candidate_text(&payload)
    }

    fn decode<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, InsightError> {
        serde_json::from_str(text).map_err(|e| InsightError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl InsightProvider for GeminiInsight {
    async fn health_tip(&self, topic: &str) -> Result<HealthTip, InsightError> {
        let text = self
            .generate(
                prompts::HEALTH_TIP,
                format!("Topic: {}", topic),
                health_tip_schema(),
            )
            .await?;
        Self::decode(&text)
    }

    async fn macro_estimate(&self, profile: &MacroProfile) -> Result<MacroEstimate, InsightError> {
        profile.validate()?;
        let user_text = format!(
            "Weight: {}kg, Height: {}cm, Age: {}, Activity Level: {}, Primary Goal: {}.",
            profile.weight_kg, profile.height_cm, profile.age, profile.activity_level, profile.goal
        );
        let text = self
            .generate(prompts::MACRO_ESTIMATE, user_text, macro_estimate_schema())
            .await?;
        Self::decode(&text)
    }

    async fn product_insight(
        &self,
        product_name: &str,
        category: Category,
    ) -> Result<ProductInsight, InsightError> {
        let user_text = format!(
            "Product: \"{}\"\nCategory: {}",
            product_name,
            category.display_name()
        );
        let text = self
            .generate(prompts::PRODUCT_INSIGHT, user_text, product_insight_schema())
            .await?;
        Self::decode(&text)
    }

    async fn chat_stream(
        &self,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<ChatFragmentStream, InsightError> {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        ChatRole::User => "user",
                        ChatRole::Coach => "model",
                    },
                    "parts": [{ "text": m.text }]
                })
            })
            .collect();
        contents.push(json!({ "role": "user", "parts": [{ "text": message }] }));

        let body = json!({
            "systemInstruction": { "parts": [{ "text": prompts::COACH }] },
            "contents": contents
        });

        let response = self
            .http
            .post(self.endpoint("streamGenerateContent"))
            .query(&[("key", self.api_key.as_str()), ("alt", "sse")])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("coach stream rejected with status {}", status);
            return Err(InsightError::Provider {
                status: status.as_u16(),
                message: provider_message(&body),
            });
        }

        tracing::debug!("coach stream opened ({} prior messages)", history.len());
        Ok(sse_fragment_stream(response))
    }
}

/// Turn the SSE byte stream into ordered text fragments. A transport or
/// framing failure yields one terminal `Err` item and ends the stream.
fn sse_fragment_stream(response: reqwest::Response) -> ChatFragmentStream {
    let bytes = response.bytes_stream();
    let fragments = stream::unfold(
        (bytes, String::new(), VecDeque::new(), false),
        |(mut bytes, mut buffer, mut queued, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(text) = queued.pop_front() {
                    return Some((Ok(text), (bytes, buffer, queued, false)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        match drain_sse_lines(&mut buffer) {
                            Ok(texts) => queued.extend(texts),
                            Err(e) => return Some((Err(e), (bytes, buffer, queued, true))),
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(InsightError::Http(e)), (bytes, buffer, queued, true)))
                    }
                    None => return None,
                }
            }
        },
    );
    Box::pin(fragments)
}

/// Pull every complete `data:` line out of the buffer and return the text
/// fragments they carry. An incomplete trailing line stays buffered until
/// the next chunk arrives.
fn drain_sse_lines(buffer: &mut String) -> Result<Vec<String>, InsightError> {
    let mut fragments = Vec::new();
    while let Some(newline) = buffer.find('\n') {
        let line: String = buffer.drain(..=newline).collect();
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let payload: Value = serde_json::from_str(data.trim())
            .map_err(|e| InsightError::Malformed(e.to_string()))?;
        if let Some(text) = chunk_text(&payload) {
            if !text.is_empty() {
                fragments.push(text);
            }
        }
    }
    Ok(fragments)
}

/// Text carried by one streamed chunk; empty for housekeeping chunks
/// (e.g. the final one carrying only a finish reason).
fn chunk_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect(),
    )
}

/// Concatenated text of the first candidate of a full response
fn candidate_text(payload: &Value) -> Result<String, InsightError> {
    let text = chunk_text(payload)
        .ok_or_else(|| InsightError::Malformed("response has no candidate content".to_string()))?;
    if text.is_empty() {
        return Err(InsightError::Malformed(
            "candidate contained no text".to_string(),
        ));
    }
    Ok(text)
}

/// Human-readable message from an error body, falling back to a truncated
/// raw body.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn health_tip_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "content": { "type": "STRING" },
            "tags": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["title", "content", "tags"]
    })
}

fn macro_estimate_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "calories": { "type": "NUMBER" },
            "protein": { "type": "NUMBER" },
            "carbs": { "type": "NUMBER" },
            "fats": { "type": "NUMBER" },
            "explanation": { "type": "STRING" }
        },
        "required": ["calories", "protein", "carbs", "fats", "explanation"]
    })
}

fn product_insight_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "verdict": { "type": "STRING" },
            "benefits": { "type": "ARRAY", "items": { "type": "STRING" } },
            "pro_tip": { "type": "STRING" }
        },
        "required": ["verdict", "benefits", "pro_tip"]
    })
}
