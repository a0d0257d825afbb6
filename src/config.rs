use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::handlers::Capability;

const KEYRING_SERVICE: &str = "OmniChat";
const KEYRING_USER: &str = "gemini";

/// How a handler's missing payload (no image, no audio) reaches the user.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingPayloadPolicy {
  /// A normal text reply explaining what went wrong.
  Notice,
  /// A `type=error` reply.
  Error,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
  pub listen_addr: String,
  pub api_base: String,
  /// Per remote call. Unset means wait indefinitely.
  pub request_timeout_secs: Option<u64>,
  pub router_model: String,
  pub text_model: String,
  pub code_model: String,
  pub code_thinking_budget: u32,
  pub code_language: String,
  pub image_model: String,
  pub speech_model: String,
  pub speech_voice: String,
  pub vision_model: String,
  pub search_grounding: bool,
  /// Prior messages sent along with decision and code requests.
  pub history_window: usize,
  pub missing_image: MissingPayloadPolicy,
  pub missing_audio: MissingPayloadPolicy,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      listen_addr: "127.0.0.1:8787".to_string(),
      api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
      request_timeout_secs: None,
      router_model: "gemini-2.5-flash".to_string(),
      text_model: "gemini-2.5-flash".to_string(),
      code_model: "gemini-2.5-pro".to_string(),
      code_thinking_budget: 8192,
      code_language: "python".to_string(),
      image_model: "gemini-2.5-flash-image".to_string(),
      speech_model: "gemini-2.5-flash-preview-tts".to_string(),
      speech_voice: "Kore".to_string(),
      vision_model: "gemini-2.5-flash".to_string(),
      search_grounding: true,
      history_window: 10,
      missing_image: MissingPayloadPolicy::Notice,
      missing_audio: MissingPayloadPolicy::Error,
    }
  }
}

impl AppConfig {
  pub fn missing_payload_policy(&self, capability: Capability) -> MissingPayloadPolicy {
    match capability {
      Capability::Image => self.missing_image,
      Capability::Speech => self.missing_audio,
      Capability::Text | Capability::Code | Capability::Vision => MissingPayloadPolicy::Error,
    }
  }
}

pub fn load_or_init(path: &Path) -> anyhow::Result<AppConfig> {
  if path.exists() {
    let data = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&data)?;
    Ok(config)
  } else {
    let config = AppConfig::default();
    save_config(path, &config)?;
    Ok(config)
  }
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let json = serde_json::to_string_pretty(config)?;
  std::fs::write(path, json)?;
  Ok(())
}

/// Environment first (`GEMINI_API_KEY`, then `API_KEY`), then the OS keyring.
pub fn resolve_api_key() -> ChatResult<String> {
  for var in ["GEMINI_API_KEY", "API_KEY"] {
    if let Ok(key) = std::env::var(var) {
      if !key.trim().is_empty() {
        return Ok(key.trim().to_string());
      }
    }
  }

  let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
  match entry.get_password() {
    Ok(key) if !key.trim().is_empty() => Ok(key),
    _ => Err(ChatError::MissingKey),
  }
}

pub fn store_api_key(key: &str) -> ChatResult<()> {
  let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
  entry.set_password(key.trim())?;
  Ok(())
}
