//! Gemini `generateContent` client.
//!
//! Handlers build a [`GenerateRequest`] and get back a [`Reply`], a sum type
//! over the three response shapes they care about. The transport sits behind
//! [`ModelClient`] so the dispatcher can be driven by a fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{ChatError, ChatResult};
use crate::models::{Message, MessageBody, Role, Source};

pub const DEFAULT_SOURCE_TITLE: &str = "Source";

#[async_trait]
pub trait ModelClient: Send + Sync {
  async fn generate(&self, request: GenerateRequest) -> ChatResult<Reply>;
}

/// One remote call: which model, what it sees, and how it is configured.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateRequest {
  pub model: String,
  pub system_instruction: Option<String>,
  pub contents: Vec<Content>,
  pub tools: Vec<Tool>,
  pub generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
  pub fn new(model: impl Into<String>) -> Self {
    Self {
      model: model.into(),
      ..Self::default()
    }
  }

  /// Text of the final user turn, which is what handlers put last.
  #[cfg(test)]
  pub fn last_user_text(&self) -> Option<&str> {
    self
      .contents
      .iter()
      .rev()
      .find(|c| c.role == "user")?
      .parts
      .iter()
      .find_map(|p| match p {
        Part::Text { text, .. } => Some(text.as_str()),
        _ => None,
      })
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Content {
  pub role: String,
  pub parts: Vec<Part>,
}

impl Content {
  pub fn user(parts: Vec<Part>) -> Self {
    Self {
      role: "user".to_string(),
      parts,
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Part {
  Text {
    text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    thought: bool,
  },
  InlineData {
    #[serde(rename = "inlineData")]
    inline_data: Blob,
  },
  FunctionCall {
    #[serde(rename = "functionCall")]
    function_call: FunctionCall,
  },
  Other(Value),
}

impl Part {
  pub fn text(text: impl Into<String>) -> Self {
    Part::Text {
      text: text.into(),
      thought: false,
    }
  }

  pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
    Part::InlineData {
      inline_data: Blob {
        mime_type: mime_type.into(),
        data: data.into(),
      },
    }
  }
}

fn is_false(value: &bool) -> bool {
  !*value
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Blob {
  #[serde(rename = "mimeType")]
  pub mime_type: String,
  pub data: String,
}

impl Blob {
  pub fn data_url(&self) -> String {
    format!("data:{};base64,{}", self.mime_type, self.data)
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCall {
  pub name: String,
  #[serde(default)]
  pub args: Value,
}

impl FunctionCall {
  pub fn string_arg(&self, name: &str) -> Option<&str> {
    self.args.get(name).and_then(Value::as_str)
  }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Tool {
  Functions {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<FunctionDeclaration>,
  },
  GoogleSearch {
    #[serde(rename = "googleSearch")]
    google_search: GoogleSearch,
  },
}

impl Tool {
  pub fn google_search() -> Self {
    Tool::GoogleSearch {
      google_search: GoogleSearch {},
    }
  }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FunctionDeclaration {
  pub name: String,
  pub description: String,
  pub parameters: Value,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GoogleSearch {}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response_modalities: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thinking_config: Option<ThinkingConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub speech_config: Option<SpeechConfig>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
  pub thinking_budget: u32,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
  pub voice_config: VoiceConfig,
}

impl SpeechConfig {
  pub fn prebuilt(voice_name: impl Into<String>) -> Self {
    Self {
      voice_config: VoiceConfig {
        prebuilt_voice_config: PrebuiltVoiceConfig {
          voice_name: voice_name.into(),
        },
      },
    }
  }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
  pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
  pub voice_name: String,
}

/// Normalized response. Function calls win over inline data, which wins over
/// plain text.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
  /// Never empty.
  Actions(Vec<FunctionCall>),
  Inline { blob: Blob, caption: Option<String> },
  Text { text: String, sources: Vec<Source> },
}

impl Reply {
  #[cfg(test)]
  pub fn text(text: impl Into<String>) -> Self {
    Reply::Text {
      text: text.into(),
      sources: Vec::new(),
    }
  }

  pub fn from_response(response: GenerateContentResponse) -> Self {
    let candidate = response.candidates.into_iter().next().unwrap_or_default();
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut text = String::new();
    let mut calls = Vec::new();
    let mut blob = None;
    for part in parts {
      match part {
        Part::Text { text: t, thought } if !thought => text.push_str(&t),
        Part::FunctionCall { function_call } => calls.push(function_call),
        Part::InlineData { inline_data } if blob.is_none() && !inline_data.data.is_empty() => {
          blob = Some(inline_data)
        }
        _ => {}
      }
    }

    if !calls.is_empty() {
      return Reply::Actions(calls);
    }
    if let Some(blob) = blob {
      let caption = Some(text.trim().to_string()).filter(|t| !t.is_empty());
      return Reply::Inline { blob, caption };
    }

    let chunks = candidate
      .grounding_metadata
      .map(|g| g.grounding_chunks)
      .unwrap_or_default();
    Reply::Text {
      text,
      sources: collect_sources(chunks),
    }
  }
}

/// Web citations in order; blank titles become "Source" and chunks without a
/// URI are skipped.
fn collect_sources(chunks: Vec<GroundingChunk>) -> Vec<Source> {
  chunks
    .into_iter()
    .filter_map(|chunk| chunk.web)
    .filter_map(|web| {
      let uri = web.uri.filter(|u| !u.trim().is_empty())?;
      let title = web
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE_TITLE.to_string());
      Some(Source { uri, title })
    })
    .collect()
}

#[derive(Deserialize, Debug, Default)]
pub struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  error: Option<ApiError>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
  content: Option<CandidateContent>,
  grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug, Default)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
  #[serde(default)]
  grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Debug)]
struct GroundingChunk {
  web: Option<WebChunk>,
}

#[derive(Deserialize, Debug)]
struct WebChunk {
  uri: Option<String>,
  title: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
  message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
  contents: &'a [Content],
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<SystemInstruction>,
  #[serde(skip_serializing_if = "no_tools")]
  tools: &'a [Tool],
  #[serde(skip_serializing_if = "Option::is_none")]
  generation_config: Option<&'a GenerationConfig>,
}

fn no_tools(tools: &&[Tool]) -> bool {
  tools.is_empty()
}

#[derive(Serialize)]
struct SystemInstruction {
  parts: Vec<Part>,
}

fn wire_body(request: &GenerateRequest) -> ChatResult<Value> {
  let body = GeminiRequest {
    contents: &request.contents,
    system_instruction: request.system_instruction.as_ref().map(|text| SystemInstruction {
      parts: vec![Part::text(text.clone())],
    }),
    tools: &request.tools,
    generation_config: request.generation_config.as_ref(),
  };
  Ok(serde_json::to_value(body)?)
}

/// Converts the most recent `window` history entries into Gemini turns.
/// Error and system messages are not replayed.
pub fn history_contents(history: &[Message], window: usize) -> Vec<Content> {
  let start = history.len().saturating_sub(window);
  history[start..]
    .iter()
    .filter_map(|msg| {
      let role = match (msg.role, &msg.body) {
        (_, MessageBody::Error) => return None,
        (Role::User, _) => "user",
        (Role::Model, _) => "model",
        (Role::System, _) => return None,
      };
      if msg.content.trim().is_empty() {
        return None;
      }
      Some(Content {
        role: role.to_string(),
        parts: vec![Part::text(msg.content.clone())],
      })
    })
    .collect()
}

pub struct GeminiClient {
  http: reqwest::Client,
  api_base: String,
  api_key: String,
  timeout: Option<Duration>,
}

impl GeminiClient {
  pub fn new(api_key: String, config: &AppConfig) -> Self {
    Self {
      http: reqwest::Client::new(),
      api_base: config.api_base.trim_end_matches('/').to_string(),
      api_key,
      timeout: config.request_timeout_secs.map(Duration::from_secs),
    }
  }
}

#[async_trait]
impl ModelClient for GeminiClient {
  async fn generate(&self, request: GenerateRequest) -> ChatResult<Reply> {
    let url = format!("{}/models/{}:generateContent", self.api_base, request.model);
    let body = wire_body(&request)?;

    let mut call = self
      .http
      .post(&url)
      .header("x-goog-api-key", &self.api_key)
      .json(&body);
    if let Some(timeout) = self.timeout {
      call = call.timeout(timeout);
    }

    tracing::debug!(model = %request.model, "sending generateContent");
    let resp = call.send().await?;
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(ChatError::RemoteStatus {
        status: status.as_u16(),
        body,
      });
    }

    let bytes = resp.bytes().await?;
    let payload: GenerateContentResponse = serde_json::from_slice(&bytes)?;
    if let Some(error) = payload.error {
      return Err(ChatError::Remote(error.message));
    }
    Ok(Reply::from_response(payload))
  }
}

#[cfg(test)]
pub mod testing {
  use std::collections::VecDeque;
  use std::sync::Mutex;

  use super::*;

  /// Replays queued replies in order and records every request it sees.
  #[derive(Default)]
  pub struct ScriptedClient {
    replies: Mutex<VecDeque<ChatResult<Reply>>>,
    requests: Mutex<Vec<GenerateRequest>>,
  }

  impl ScriptedClient {
    pub fn new(replies: Vec<ChatResult<Reply>>) -> Self {
      Self {
        replies: Mutex::new(replies.into()),
        requests: Mutex::new(Vec::new()),
      }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
      self.requests.lock().unwrap().clone()
    }

    pub fn models(&self) -> Vec<String> {
      self.requests().into_iter().map(|r| r.model).collect()
    }
  }

  #[async_trait]
  impl ModelClient for ScriptedClient {
    async fn generate(&self, request: GenerateRequest) -> ChatResult<Reply> {
      self.requests.lock().unwrap().push(request);
      self
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ChatError::Remote("no scripted reply left".to_string())))
    }
  }
}
