use std::sync::Arc;

use tracing::{info, warn};

use crate::attachment::Attachment;
use crate::config::{AppConfig, MissingPayloadPolicy};
use crate::gemini::ModelClient;
use crate::handlers::{Capability, Outcome, Turn};
use crate::models::{AgentMode, Message, MessageBody};
use crate::router;

/// Where a mode sends its turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
  Router,
  Handler(Capability),
}

pub fn binding(mode: AgentMode) -> Binding {
  match mode {
    AgentMode::Orchestrator => Binding::Router,
    AgentMode::Coder => Binding::Handler(Capability::Code),
    AgentMode::Artist => Binding::Handler(Capability::Image),
    AgentMode::Speaker => Binding::Handler(Capability::Speech),
    AgentMode::Analyst => Binding::Handler(Capability::Vision),
  }
}

pub struct Dispatcher {
  client: Arc<dyn ModelClient>,
  config: AppConfig,
}

impl Dispatcher {
  pub fn new(client: Arc<dyn ModelClient>, config: AppConfig) -> Self {
    Self { client, config }
  }

  /// Produces the model's message for one turn. Failures come back as
  /// `type=error` messages rather than `Err`.
  pub async fn respond(
    &self,
    prompt: &str,
    mode: AgentMode,
    history: &[Message],
    attachment: Option<&Attachment>,
  ) -> Message {
    let turn = Turn {
      prompt,
      history,
      attachment,
    };
    let client = self.client.as_ref();
    let result = match binding(mode) {
      Binding::Router => router::route(client, &self.config, &turn).await,
      Binding::Handler(capability) => capability.run(client, &self.config, &turn).await,
    };

    match result {
      Ok(Outcome::Message(message)) => {
        info!(mode = %mode, kind = message.kind(), "turn complete");
        message
      }
      Ok(Outcome::GenerationFailed { capability, reason }) => {
        warn!(mode = %mode, capability = capability.as_str(), "generation returned no payload");
        match self.config.missing_payload_policy(capability) {
          MissingPayloadPolicy::Notice => Message::model(reason, MessageBody::text(Vec::new())),
          MissingPayloadPolicy::Error => Message::error(reason),
        }
      }
      Err(err) => {
        warn!(mode = %mode, error = %err, "turn failed");
        Message::error(err.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ChatError;
  use crate::gemini::testing::ScriptedClient;
  use crate::gemini::{Blob, FunctionCall, Reply};
  use crate::models::{MessageBody, Role, Source};
  use serde_json::json;

  fn dispatcher(replies: Vec<Result<Reply, ChatError>>) -> (Arc<ScriptedClient>, Dispatcher) {
    dispatcher_with(replies, AppConfig::default())
  }

  fn dispatcher_with(replies: Vec<Result<Reply, ChatError>>, config: AppConfig) -> (Arc<ScriptedClient>, Dispatcher) {
    let client = Arc::new(ScriptedClient::new(replies));
    let dispatcher = Dispatcher::new(client.clone(), config);
    (client, dispatcher)
  }

  fn image_reply() -> Reply {
    Reply::Inline {
      blob: Blob {
        mime_type: "image/png".to_string(),
        data: "iVBORw0KGgo=".to_string(),
      },
      caption: None,
    }
  }

  #[test]
  fn every_manual_mode_is_bound_to_a_handler() {
    for mode in AgentMode::ALL {
      match binding(mode) {
        Binding::Router => assert_eq!(mode, AgentMode::Orchestrator),
        Binding::Handler(_) => assert_ne!(mode, AgentMode::Orchestrator),
      }
    }
  }

  #[tokio::test]
  async fn manual_modes_call_their_handler_directly() {
    let config = AppConfig::default();
    let cases = [
      (AgentMode::Coder, config.code_model.clone()),
      (AgentMode::Artist, config.image_model.clone()),
      (AgentMode::Speaker, config.speech_model.clone()),
      (AgentMode::Analyst, config.vision_model.clone()),
    ];
    for (mode, model) in cases {
      let (client, dispatcher) = dispatcher(vec![Ok(Reply::text("ok"))]);
      dispatcher.respond("write code to draw and say this", mode, &[], None).await;
      let requests = client.requests();
      assert_eq!(requests.len(), 1, "{mode} made extra calls");
      assert_eq!(requests[0].model, model);
      assert!(requests[0].system_instruction.as_deref() != Some(router::ROUTER_INSTRUCTION));
    }
  }

  #[tokio::test]
  async fn artist_returns_image_message() {
    let (_, dispatcher) = dispatcher(vec![Ok(image_reply())]);
    let msg = dispatcher.respond("a red fox", AgentMode::Artist, &[], None).await;
    assert_eq!(msg.role, Role::Model);
    match msg.body {
      MessageBody::Image { metadata } => assert!(metadata.image_url.starts_with("data:image/")),
      other => panic!("expected image, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn artist_without_image_degrades_to_text_notice() {
    let (_, dispatcher) = dispatcher(vec![Ok(Reply::text("I can only describe foxes."))]);
    let msg = dispatcher.respond("a red fox", AgentMode::Artist, &[], None).await;
    assert_eq!(msg.kind(), "text");
    assert!(msg.content.contains("couldn't generate an image"));
  }

  #[tokio::test]
  async fn speaker_without_audio_is_an_error() {
    let (_, dispatcher) = dispatcher(vec![Ok(Reply::text(""))]);
    let msg = dispatcher.respond("hello", AgentMode::Speaker, &[], None).await;
    assert_eq!(msg.kind(), "error");
    assert!(msg.content.contains("No audio"));
  }

  #[tokio::test]
  async fn missing_payload_policy_is_configurable() {
    let config = AppConfig {
      missing_image: MissingPayloadPolicy::Error,
      missing_audio: MissingPayloadPolicy::Notice,
      ..AppConfig::default()
    };
    let (_, dispatcher) = dispatcher_with(vec![Ok(Reply::text("")), Ok(Reply::text(""))], config);
    let image = dispatcher.respond("a red fox", AgentMode::Artist, &[], None).await;
    let audio = dispatcher.respond("hello", AgentMode::Speaker, &[], None).await;
    assert_eq!(image.kind(), "error");
    assert_eq!(audio.kind(), "text");
  }

  #[tokio::test]
  async fn remote_failure_becomes_error_message() {
    let (client, dispatcher) = dispatcher(vec![Err(ChatError::RemoteStatus {
      status: 429,
      body: "quota exceeded".to_string(),
    })]);
    let msg = dispatcher.respond("hi", AgentMode::Orchestrator, &[], None).await;
    assert_eq!(msg.kind(), "error");
    assert_eq!(msg.role, Role::Model);
    assert!(msg.content.contains("quota exceeded"));
    assert_eq!(client.requests().len(), 1);
  }

  #[tokio::test]
  async fn orchestrator_routes_code_requests() {
    let (client, dispatcher) = dispatcher(vec![
      Ok(Reply::Actions(vec![FunctionCall {
        name: "write_code".to_string(),
        args: json!({ "task_description": "reverse a string" }),
      }])),
      Ok(Reply::text("def reverse(s):\n    return s[::-1]")),
    ]);
    let msg = dispatcher
      .respond("write a function to reverse a string", AgentMode::Orchestrator, &[], None)
      .await;
    assert_eq!(msg.kind(), "code");
    assert_eq!(client.requests().len(), 2);
  }

  #[tokio::test]
  async fn orchestrator_grounded_answer_has_sources() {
    let (_, dispatcher) = dispatcher(vec![Ok(Reply::Text {
      text: "Light rain, 14C.".to_string(),
      sources: vec![
        Source {
          uri: "https://a".to_string(),
          title: "Source".to_string(),
        },
        Source {
          uri: "https://b".to_string(),
          title: "JMA".to_string(),
        },
      ],
    })]);
    let msg = dispatcher
      .respond("what's the weather in Tokyo today", AgentMode::Orchestrator, &[], None)
      .await;
    assert_eq!(msg.kind(), "text");
    let sources = msg.sources().expect("grounded answer keeps sources");
    assert_eq!(sources[0].uri, "https://a");
    assert_eq!(sources[1].title, "JMA");
  }

  #[tokio::test]
  async fn orchestrator_with_attachment_analyzes_image() {
    let image = Attachment {
      mime_type: "image/jpeg".to_string(),
      data: "aGVsbG8=".to_string(),
    };
    let (client, dispatcher) = dispatcher(vec![Ok(Reply::text("A receipt."))]);
    let msg = dispatcher
      .respond("generate an image like this", AgentMode::Orchestrator, &[], Some(&image))
      .await;
    assert_eq!(msg.content, "A receipt.");
    assert_eq!(client.models(), vec![AppConfig::default().vision_model]);
  }
}
