//! Vendor HTTP engines over a blocking `reqwest` client.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::ai::{batch_from_json, parse_object, summary_from_json, AiEngine, AiInput};
use crate::config::AiConfig;
use crate::error::EngineError;
use crate::types::AiSummary;

const SYSTEM_PROMPT: &str = "You are a software metrics assistant. You do not infer emotions. \
You explain risk, quality and strain signals from git repository analysis.

Given the metrics below, provide:
1. Up to 5 bullet points explaining what the mood proxy result means
2. Any confounders or caveats to consider
3. Optionally, a score_delta (between -10 and +10) if the heuristic missed something important

Respond in JSON with this structure:
{
  \"explanation_bullets\": [\"bullet 1\", \"bullet 2\"],
  \"score_delta\": 0,
  \"confidence_delta\": 0.0
}";

const BATCH_SYSTEM_PROMPT: &str = "You are a software metrics assistant. You do not infer emotions. \
You explain risk, quality and strain signals from git repository analysis.

You will receive metrics for MULTIPLE days. For EACH day (identified by window_label), provide:
1. Up to 5 bullet points explaining what the mood proxy result means
2. Any confounders or caveats to consider
3. Optionally, a score_delta (between -10 and +10) if the heuristic missed something important

Respond in JSON with an object whose keys are the window_label values:
{
  \"2024-01-15\": {
    \"explanation_bullets\": [\"bullet 1\", \"bullet 2\"],
    \"score_delta\": 0,
    \"confidence_delta\": 0.0
  }
}";

const SINGLE_MAX_TOKENS: u32 = 1000;
const BATCH_MAX_TOKENS: u32 = 4000;
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
  OpenAi,
  DeepSeek,
  Anthropic,
  Google,
}

impl Vendor {
  pub fn from_id(id: &str) -> Option<Self> {
    match id {
      "openai" => Some(Self::OpenAi),
      "deepseek" => Some(Self::DeepSeek),
      "anthropic" => Some(Self::Anthropic),
      "google" => Some(Self::Google),
      _ => None,
    }
  }

  pub fn id(self) -> &'static str {
    match self {
      Self::OpenAi => "openai",
      Self::DeepSeek => "deepseek",
      Self::Anthropic => "anthropic",
      Self::Google => "google",
    }
  }

  pub fn default_model(self) -> &'static str {
    match self {
      Self::OpenAi => "gpt-4o-mini",
      Self::DeepSeek => "deepseek-chat",
      Self::Anthropic => "claude-3-haiku-20240307",
      Self::Google => "gemini-1.5-flash",
    }
  }

  pub fn default_base_url(self) -> &'static str {
    match self {
      Self::OpenAi => "https://api.openai.com/v1",
      Self::DeepSeek => "https://api.deepseek.com/v1",
      Self::Anthropic => "https://api.anthropic.com/v1",
      Self::Google => "https://generativelanguage.googleapis.com/v1beta",
    }
  }

  /// Model text out of a decoded vendor response. `{}` when the expected shape is missing.
  pub fn extract_content(self, response: &Value) -> String {
    let text = match self {
      Self::OpenAi | Self::DeepSeek => response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str),
      Self::Anthropic => response
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| {
          blocks
            .iter()
            .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        })
        .and_then(|b| b.get("text"))
        .and_then(Value::as_str),
      Self::Google => response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str),
    };
    text.unwrap_or("{}").to_string()
  }
}

/// A prepared POST: where, which headers, what body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub url: String,
  pub headers: Vec<(&'static str, String)>,
  pub body: Value,
}

pub struct HttpEngine {
  vendor: Vendor,
  api_key: String,
  model: String,
  base_url: String,
  client: reqwest::blocking::Client,
}

impl HttpEngine {
  pub fn new(vendor: Vendor, config: &AiConfig) -> Result<Self, EngineError> {
    let client = reqwest::blocking::Client::builder()
      .timeout(Duration::from_secs(config.timeout_seconds))
      .connect_timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| EngineError::ai(vendor.id(), format!("http client: {}", e)))?;

    Ok(Self {
      vendor,
      api_key: config.api_key.clone().unwrap_or_default().trim().to_string(),
      model: config
        .model
        .clone()
        .unwrap_or_else(|| vendor.default_model().to_string()),
      base_url: config
        .base_url
        .clone()
        .unwrap_or_else(|| vendor.default_base_url().to_string())
        .trim_end_matches('/')
        .to_string(),
      client,
    })
  }

  pub fn vendor(&self) -> Vendor {
    self.vendor
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  /// Build the vendor request for `prompt`.
  pub fn request(&self, prompt: &str, batch: bool) -> ApiRequest {
    let system = if batch { BATCH_SYSTEM_PROMPT } else { SYSTEM_PROMPT };
    let max_tokens = if batch { BATCH_MAX_TOKENS } else { SINGLE_MAX_TOKENS };

    match self.vendor {
      Vendor::OpenAi | Vendor::DeepSeek => ApiRequest {
        url: format!("{}/chat/completions", self.base_url),
        headers: vec![("Authorization", format!("Bearer {}", self.api_key))],
        body: json!({
          "model": self.model,
          "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": prompt},
          ],
          "temperature": 0.3,
          "max_tokens": max_tokens,
          "response_format": {"type": "json_object"},
        }),
      },
      Vendor::Anthropic => ApiRequest {
        url: format!("{}/messages", self.base_url),
        headers: vec![
          ("x-api-key", self.api_key.clone()),
          ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ],
        body: json!({
          "model": self.model,
          "max_tokens": max_tokens,
          "system": system,
          "messages": [{"role": "user", "content": prompt}],
        }),
      },
      Vendor::Google => ApiRequest {
        url: format!(
          "{}/models/{}:generateContent?key={}",
          self.base_url, self.model, self.api_key
        ),
        headers: Vec::new(),
        body: json!({
          "contents": [{"parts": [{"text": format!("{}\n\n{}", system, prompt)}]}],
          "generationConfig": {
            "temperature": 0.3,
            "maxOutputTokens": max_tokens,
            "responseMimeType": "application/json",
          },
        }),
      },
    }
  }

  fn require_key(&self) -> Result<(), EngineError> {
    if self.api_key.is_empty() {
      return Err(EngineError::ai(self.vendor.id(), "missing api key"));
    }
    Ok(())
  }

  /// POST and decode. Returns the model's text content.
  fn call(&self, prompt: &str, batch: bool) -> Result<String, EngineError> {
    let id = self.vendor.id();
    let req = self.request(prompt, batch);

    let mut builder = self.client.post(&req.url).json(&req.body);
    for (name, value) in &req.headers {
      builder = builder.header(*name, value);
    }

    debug!(engine = id, model = %self.model, batch, "calling ai engine");
    let response = builder
      .send()
      .map_err(|e| EngineError::ai(id, format!("request failed: {}", e)))?;
    let status = response.status().as_u16();
    let body = response
      .text()
      .map_err(|e| EngineError::ai(id, format!("reading response: {}", e)))?;

    if status >= 400 {
      return Err(EngineError::ai(id, error_message(&body, status)));
    }

    let decoded: Value = serde_json::from_str(&body)
      .map_err(|_| EngineError::ai(id, "response is not valid JSON"))?;
    Ok(self.vendor.extract_content(&decoded))
  }
}

impl AiEngine for HttpEngine {
  fn id(&self) -> &str {
    self.vendor.id()
  }

  fn summarize(&self, input: &AiInput) -> Result<AiSummary, EngineError> {
    self.require_key()?;
    let prompt = format!(
      "Analyze these software metrics:\n\n{}",
      serde_json::to_string_pretty(input)?
    );
    let content = self.call(&prompt, false)?;
    Ok(summary_from_json(&parse_object(self.vendor.id(), &content)?))
  }

  fn summarize_batch(&self, inputs: &[AiInput]) -> Result<BTreeMap<String, AiSummary>, EngineError> {
    self.require_key()?;
    match inputs {
      [] => Ok(BTreeMap::new()),
      [only] => {
        let summary = self.summarize(only)?;
        Ok(BTreeMap::from([(only.window_label.clone(), summary)]))
      }
      _ => {
        let keyed: BTreeMap<&str, &AiInput> = inputs
          .iter()
          .map(|i| (i.window_label.as_str(), i))
          .collect();
        let prompt = format!(
          "Analyze these software metrics for multiple days:\n\n{}",
          serde_json::to_string_pretty(&keyed)?
        );
        let content = self.call(&prompt, true)?;
        batch_from_json(self.vendor.id(), &content, inputs)
      }
    }
  }
}

/// Human-readable message from a vendor error body.
pub fn error_message(body: &str, status: u16) -> String {
  if let Ok(decoded) = serde_json::from_str::<Value>(body) {
    let message = decoded
      .pointer("/error/message")
      .and_then(Value::as_str)
      .or_else(|| decoded.get("message").and_then(Value::as_str))
      .or_else(|| decoded.get("error").and_then(Value::as_str));
    if let Some(m) = message {
      return format!("HTTP {}: {}", status, m);
    }
  }

  let truncated: String = body.chars().take(200).collect();
  if truncated.len() < body.len() {
    format!("HTTP {}: {}...", status, truncated)
  } else {
    format!("HTTP {}: {}", status, body)
  }
}
