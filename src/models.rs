use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Model,
  System,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Source {
  pub uri: String,
  pub title: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TextMetadata {
  pub sources: Vec<Source>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
  #[serde(rename = "imageUrl")]
  pub image_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AudioMetadata {
  #[serde(rename = "audioData")]
  pub audio_data: String,
  #[serde(rename = "mimeType")]
  pub mime_type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CodeMetadata {
  #[serde(rename = "codeLanguage")]
  pub code_language: String,
}

/// Message payload keyed by `type`. Each variant carries only the metadata
/// that is meaningful for it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
  Text {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<TextMetadata>,
  },
  Image {
    metadata: ImageMetadata,
  },
  Audio {
    metadata: AudioMetadata,
  },
  Code {
    metadata: CodeMetadata,
  },
  Error,
}

impl MessageBody {
  /// Text body; an empty source list leaves the metadata out entirely.
  pub fn text(sources: Vec<Source>) -> Self {
    if sources.is_empty() {
      MessageBody::Text { metadata: None }
    } else {
      MessageBody::Text {
        metadata: Some(TextMetadata { sources }),
      }
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      MessageBody::Text { .. } => "text",
      MessageBody::Image { .. } => "image",
      MessageBody::Audio { .. } => "audio",
      MessageBody::Code { .. } => "code",
      MessageBody::Error => "error",
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
  pub id: String,
  pub role: Role,
  pub content: String,
  #[serde(flatten)]
  pub body: MessageBody,
  pub timestamp: i64,
}

impl Message {
  pub fn new(role: Role, content: impl Into<String>, body: MessageBody) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      role,
      content: content.into(),
      body,
      timestamp: Utc::now().timestamp_millis(),
    }
  }

  /// The user's side of a turn. An attached image is kept for display.
  pub fn user(prompt: &str, attachment: Option<&Attachment>) -> Self {
    let body = match attachment {
      Some(image) => MessageBody::Image {
        metadata: ImageMetadata {
          image_url: image.data_url(),
        },
      },
      None => MessageBody::text(Vec::new()),
    };
    Self::new(Role::User, prompt, body)
  }

  pub fn model(content: impl Into<String>, body: MessageBody) -> Self {
    Self::new(Role::Model, content, body)
  }

  pub fn error(description: impl Into<String>) -> Self {
    Self::new(Role::Model, description, MessageBody::Error)
  }

  pub fn kind(&self) -> &'static str {
    self.body.kind()
  }

  #[cfg(test)]
  pub fn sources(&self) -> Option<&[Source]> {
    match &self.body {
      MessageBody::Text {
        metadata: Some(meta),
      } => Some(&meta.sources),
      _ => None,
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
  Orchestrator,
  Coder,
  Artist,
  Speaker,
  Analyst,
}

impl AgentMode {
  pub const ALL: [AgentMode; 5] = [
    AgentMode::Orchestrator,
    AgentMode::Coder,
    AgentMode::Artist,
    AgentMode::Speaker,
    AgentMode::Analyst,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      AgentMode::Orchestrator => "orchestrator",
      AgentMode::Coder => "coder",
      AgentMode::Artist => "artist",
      AgentMode::Speaker => "speaker",
      AgentMode::Analyst => "analyst",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      AgentMode::Orchestrator => "Orchestrator",
      AgentMode::Coder => "Coder",
      AgentMode::Artist => "Artist",
      AgentMode::Speaker => "Speaker",
      AgentMode::Analyst => "Analyst",
    }
  }

  pub fn description(self) -> &'static str {
    match self {
      AgentMode::Orchestrator => "Picks the right capability for each message automatically.",
      AgentMode::Coder => "Writes code with an extended reasoning budget.",
      AgentMode::Artist => "Generates images from a description.",
      AgentMode::Speaker => "Reads text aloud.",
      AgentMode::Analyst => "Analyzes an attached image.",
    }
  }
}

impl fmt::Display for AgentMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AgentMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_ascii_lowercase();
    AgentMode::ALL
      .into_iter()
      .find(|mode| mode.as_str() == wanted)
      .ok_or_else(|| format!("unknown mode `{s}`"))
  }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct RespondRequest {
  pub conversation_id: Option<String>,
  #[serde(default)]
  pub prompt: String,
  pub mode: Option<AgentMode>,
  pub attachment: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct RespondResponse {
  pub conversation_id: String,
  pub user: Message,
  pub reply: Message,
}

#[derive(Serialize, Deserialize)]
pub struct ConversationResponse {
  pub conversation_id: String,
  pub messages: Vec<Message>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ModeInfo {
  pub mode: AgentMode,
  pub label: String,
  pub description: String,
}

#[derive(Serialize, Deserialize)]
pub struct ModesResponse {
  pub default: AgentMode,
  pub modes: Vec<ModeInfo>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_without_sources_has_no_metadata_key() {
    let msg = Message::model("hi", MessageBody::text(vec![]));
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "text");
    assert_eq!(value["role"], "model");
    assert!(value.get("metadata").is_none());
    assert!(msg.sources().is_none());
  }

  #[test]
  fn text_with_sources_serializes_list() {
    let msg = Message::model(
      "sunny",
      MessageBody::text(vec![Source {
        uri: "https://a".to_string(),
        title: "A".to_string(),
      }]),
    );
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["metadata"]["sources"][0]["uri"], "https://a");
    assert_eq!(value["metadata"]["sources"][0]["title"], "A");
  }

  #[test]
  fn variant_metadata_uses_camel_case_keys() {
    let image = Message::model(
      "fox",
      MessageBody::Image {
        metadata: ImageMetadata {
          image_url: "data:image/png;base64,AAAA".to_string(),
        },
      },
    );
    let value = serde_json::to_value(&image).unwrap();
    assert_eq!(value["type"], "image");
    assert_eq!(value["metadata"]["imageUrl"], "data:image/png;base64,AAAA");

    let code = Message::model(
      "fn main() {}",
      MessageBody::Code {
        metadata: CodeMetadata {
          code_language: "rust".to_string(),
        },
      },
    );
    let value = serde_json::to_value(&code).unwrap();
    assert_eq!(value["metadata"]["codeLanguage"], "rust");
  }

  #[test]
  fn error_message_has_no_metadata() {
    let msg = Message::error("boom");
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "error");
    assert!(value.get("metadata").is_none());
  }

  #[test]
  fn message_parses_back_from_json() {
    let raw = serde_json::json!({
      "id": "1",
      "role": "model",
      "content": "hello",
      "type": "audio",
      "metadata": { "audioData": "UklG", "mimeType": "audio/pcm" },
      "timestamp": 10
    });
    let msg: Message = serde_json::from_value(raw).unwrap();
    assert_eq!(msg.kind(), "audio");
    assert_eq!(
      msg.body,
      MessageBody::Audio {
        metadata: AudioMetadata {
          audio_data: "UklG".to_string(),
          mime_type: "audio/pcm".to_string(),
        }
      }
    );
  }

  #[test]
  fn user_message_with_attachment_is_an_image() {
    let image = Attachment {
      mime_type: "image/jpeg".to_string(),
      data: "abc".to_string(),
    };
    let msg = Message::user("what is this", Some(&image));
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.kind(), "image");
  }

  #[test]
  fn mode_parses_case_insensitively() {
    assert_eq!("Artist".parse::<AgentMode>(), Ok(AgentMode::Artist));
    assert_eq!(" coder ".parse::<AgentMode>(), Ok(AgentMode::Coder));
    assert!("painter".parse::<AgentMode>().is_err());
  }
}
