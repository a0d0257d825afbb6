use serde_json::json;
use tracing::{info, warn};

use crate::attachment::Attachment;
use crate::config::AppConfig;
use crate::error::ChatResult;
use crate::gemini::{
  history_contents, Content, FunctionDeclaration, GenerateRequest, GenerationConfig, ModelClient, Part, Reply,
  SpeechConfig, ThinkingConfig, Tool,
};
use crate::models::{AudioMetadata, CodeMetadata, ImageMetadata, Message, MessageBody, Source};

pub const EMPTY_ANSWER: &str = "I'm not sure how to respond to that.";
pub const EMPTY_CODE: &str = "// No code generated.";
pub const DEFAULT_VISION_PROMPT: &str = "Describe this image in detail.";

const CODE_INSTRUCTION: &str = "You are an expert software engineer. Reply with complete, working code only. \
Put any explanation in code comments.";

/// One remote-model configuration the dispatcher can hand a turn to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
  Text,
  Code,
  Image,
  Speech,
  Vision,
}

/// A capability the router may call, and the single argument it forwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolSpec {
  pub name: &'static str,
  pub description: &'static str,
  pub argument: &'static str,
  pub argument_description: &'static str,
}

impl ToolSpec {
  pub fn declaration(&self) -> FunctionDeclaration {
    let mut properties = serde_json::Map::new();
    properties.insert(
      self.argument.to_string(),
      json!({ "type": "STRING", "description": self.argument_description }),
    );
    FunctionDeclaration {
      name: self.name.to_string(),
      description: self.description.to_string(),
      parameters: json!({
        "type": "OBJECT",
        "properties": properties,
        "required": [self.argument]
      }),
    }
  }
}

impl Capability {
  pub const ALL: [Capability; 5] = [
    Capability::Text,
    Capability::Code,
    Capability::Image,
    Capability::Speech,
    Capability::Vision,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Capability::Text => "text",
      Capability::Code => "code",
      Capability::Image => "image",
      Capability::Speech => "speech",
      Capability::Vision => "vision",
    }
  }

  /// Router tool for this capability. Text is the router's own direct answer
  /// and vision is chosen by attachment, so neither is offered as a tool.
  pub fn tool(self) -> Option<ToolSpec> {
    match self {
      Capability::Image => Some(ToolSpec {
        name: "generate_image",
        description: "Create an image when the user asks to draw, paint, generate or create a picture.",
        argument: "prompt",
        argument_description: "A detailed description of the image to create.",
      }),
      Capability::Code => Some(ToolSpec {
        name: "write_code",
        description: "Write code when the user asks for a program, function, script or snippet.",
        argument: "task_description",
        argument_description: "What the code must do, including the language if the user named one.",
      }),
      Capability::Speech => Some(ToolSpec {
        name: "speak_text",
        description: "Say something out loud when the user asks to hear, speak, read aloud or pronounce text.",
        argument: "text",
        argument_description: "The exact text to speak.",
      }),
      Capability::Text | Capability::Vision => None,
    }
  }

  pub fn from_tool_name(name: &str) -> Option<Capability> {
    Capability::ALL
      .into_iter()
      .find(|c| c.tool().is_some_and(|t| t.name == name))
  }

  pub fn declarations() -> Vec<FunctionDeclaration> {
    Capability::ALL
      .into_iter()
      .filter_map(Capability::tool)
      .map(|t| t.declaration())
      .collect()
  }

  /// Runs this capability's handler. Only the code handler sees history.
  pub async fn run(self, client: &dyn ModelClient, config: &AppConfig, turn: &Turn<'_>) -> ChatResult<Outcome> {
    info!(capability = self.as_str(), "running handler");
    match self {
      Capability::Text => answer(client, config, turn.prompt).await,
      Capability::Code => write_code(client, config, turn.prompt, turn.history).await,
      Capability::Image => generate_image(client, config, turn.prompt).await,
      Capability::Speech => speak(client, config, turn.prompt).await,
      Capability::Vision => analyze(client, config, turn.prompt, turn.attachment).await,
    }
  }
}

/// The inputs of a single turn.
#[derive(Clone, Copy, Debug)]
pub struct Turn<'a> {
  pub prompt: &'a str,
  pub history: &'a [Message],
  pub attachment: Option<&'a Attachment>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
  Message(Message),
  /// The remote call succeeded but the expected image or audio never came.
  GenerationFailed { capability: Capability, reason: String },
}

/// Text reply with the placeholder substituted for blank answers.
pub fn text_message(text: &str, sources: Vec<Source>) -> Message {
  let content = if text.trim().is_empty() { EMPTY_ANSWER } else { text };
  Message::model(content, MessageBody::text(sources))
}

fn text_outcome(capability: Capability, reply: Reply) -> Outcome {
  let message = match reply {
    Reply::Text { text, sources } => text_message(&text, sources),
    Reply::Inline { caption, .. } => text_message(caption.as_deref().unwrap_or_default(), Vec::new()),
    Reply::Actions(calls) => {
      warn!(capability = capability.as_str(), calls = calls.len(), "unexpected function call in text reply");
      text_message("", Vec::new())
    }
  };
  Outcome::Message(message)
}

pub async fn answer(client: &dyn ModelClient, config: &AppConfig, prompt: &str) -> ChatResult<Outcome> {
  let mut request = GenerateRequest::new(&config.text_model);
  request.contents = vec![Content::user(vec![Part::text(prompt)])];
  if config.search_grounding {
    request.tools = vec![Tool::google_search()];
  }
  let reply = client.generate(request).await?;
  Ok(text_outcome(Capability::Text, reply))
}

pub async fn write_code(
  client: &dyn ModelClient,
  config: &AppConfig,
  task: &str,
  history: &[Message],
) -> ChatResult<Outcome> {
  let mut request = GenerateRequest::new(&config.code_model);
  request.system_instruction = Some(CODE_INSTRUCTION.to_string());
  request.contents = history_contents(history, config.history_window);
  request.contents.push(Content::user(vec![Part::text(task)]));
  request.generation_config = Some(GenerationConfig {
    thinking_config: Some(ThinkingConfig {
      thinking_budget: config.code_thinking_budget,
    }),
    ..GenerationConfig::default()
  });

  let code = match client.generate(request).await? {
    Reply::Text { text, .. } => text,
    Reply::Inline { caption, .. } => caption.unwrap_or_default(),
    Reply::Actions(_) => String::new(),
  };
  let content = if code.trim().is_empty() { EMPTY_CODE.to_string() } else { code };
  Ok(Outcome::Message(Message::model(
    content,
    MessageBody::Code {
      metadata: CodeMetadata {
        code_language: config.code_language.clone(),
      },
    },
  )))
}

pub async fn generate_image(client: &dyn ModelClient, config: &AppConfig, prompt: &str) -> ChatResult<Outcome> {
  let mut request = GenerateRequest::new(&config.image_model);
  request.contents = vec![Content::user(vec![Part::text(prompt)])];
  request.generation_config = Some(GenerationConfig {
    response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
    ..GenerationConfig::default()
  });

  match client.generate(request).await? {
    Reply::Inline { blob, caption } if blob.mime_type.starts_with("image/") => {
      let content = caption.unwrap_or_else(|| format!("Generated image for: {prompt}"));
      Ok(Outcome::Message(Message::model(
        content,
        MessageBody::Image {
          metadata: ImageMetadata {
            image_url: blob.data_url(),
          },
        },
      )))
    }
    _ => Ok(Outcome::GenerationFailed {
      capability: Capability::Image,
      reason: format!("Sorry, I couldn't generate an image for \"{prompt}\". The model returned no image."),
    }),
  }
}

pub async fn speak(client: &dyn ModelClient, config: &AppConfig, text: &str) -> ChatResult<Outcome> {
  let mut request = GenerateRequest::new(&config.speech_model);
  request.contents = vec![Content::user(vec![Part::text(text)])];
  request.generation_config = Some(GenerationConfig {
    response_modalities: Some(vec!["AUDIO".to_string()]),
    speech_config: Some(SpeechConfig::prebuilt(&config.speech_voice)),
    ..GenerationConfig::default()
  });

  match client.generate(request).await? {
    Reply::Inline { blob, .. } if blob.mime_type.starts_with("audio/") => Ok(Outcome::Message(Message::model(
      text,
      MessageBody::Audio {
        metadata: AudioMetadata {
          audio_data: blob.data,
          mime_type: blob.mime_type,
        },
      },
    ))),
    _ => Ok(Outcome::GenerationFailed {
      capability: Capability::Speech,
      reason: "No audio data received from the speech model.".to_string(),
    }),
  }
}

pub async fn analyze(
  client: &dyn ModelClient,
  config: &AppConfig,
  prompt: &str,
  attachment: Option<&Attachment>,
) -> ChatResult<Outcome> {
  let mut parts = Vec::new();
  if let Some(image) = attachment {
    parts.push(Part::inline(&image.mime_type, &image.data));
  }
  let prompt = match (prompt.trim().is_empty(), attachment) {
    (true, Some(_)) => DEFAULT_VISION_PROMPT,
    _ => prompt,
  };
  parts.push(Part::text(prompt));

  let mut request = GenerateRequest::new(&config.vision_model);
  request.contents = vec![Content::user(parts)];
  let reply = client.generate(request).await?;
  Ok(text_outcome(Capability::Vision, reply))
}
