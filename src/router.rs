//! Automatic routing: one decision call picks a capability or answers
//! directly.

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::ChatResult;
use crate::gemini::{history_contents, Content, FunctionCall, GenerateRequest, ModelClient, Part, Reply, Tool};
use crate::handlers::{text_message, Capability, Outcome, Turn};

pub const ROUTER_INSTRUCTION: &str = "You are OmniChat, a helpful multimodal assistant. For every user message \
choose exactly one of the following:
1. Call `generate_image` when the user wants a picture, drawing or illustration created.
2. Call `write_code` when the user wants a program, function, script or other code written.
3. Call `speak_text` when the user wants something said out loud.
4. Otherwise answer directly in text. Use Google Search for questions about current events or facts you are unsure of.
Never call more than one function.";

pub async fn route(client: &dyn ModelClient, config: &AppConfig, turn: &Turn<'_>) -> ChatResult<Outcome> {
  if turn.attachment.is_some() {
    info!("attachment present, routing to vision");
    return Capability::Vision.run(client, config, turn).await;
  }

  let reply = client.generate(decision_request(config, turn)).await?;
  match reply {
    Reply::Actions(calls) => {
      if calls.len() > 1 {
        debug!(ignored = calls.len() - 1, "router returned extra function calls");
      }
      match calls.into_iter().next() {
        Some(call) => follow(client, config, turn, call).await,
        None => Ok(Outcome::Message(text_message("", Vec::new()))),
      }
    }
    Reply::Text { text, sources } => {
      info!(sources = sources.len(), "router answered directly");
      Ok(Outcome::Message(text_message(&text, sources)))
    }
    Reply::Inline { caption, .. } => {
      warn!("router returned inline data, keeping caption only");
      Ok(Outcome::Message(text_message(caption.as_deref().unwrap_or_default(), Vec::new())))
    }
  }
}

fn decision_request(config: &AppConfig, turn: &Turn<'_>) -> GenerateRequest {
  let mut request = GenerateRequest::new(&config.router_model);
  request.system_instruction = Some(ROUTER_INSTRUCTION.to_string());
  request.contents = history_contents(turn.history, config.history_window);
  request.contents.push(Content::user(vec![Part::text(turn.prompt)]));
  request.tools = vec![Tool::Functions {
    function_declarations: Capability::declarations(),
  }];
  if config.search_grounding {
    request.tools.push(Tool::google_search());
  }
  request
}

/// Hands the chosen call to its capability, forwarding only the declared
/// argument. History goes along for code only.
async fn follow(client: &dyn ModelClient, config: &AppConfig, turn: &Turn<'_>, call: FunctionCall) -> ChatResult<Outcome> {
  let Some(capability) = Capability::from_tool_name(&call.name) else {
    warn!(name = %call.name, "unknown function call, answering as text");
    return Capability::Text.run(client, config, &detached(turn.prompt)).await;
  };
  let Some(tool) = capability.tool() else {
    return Capability::Text.run(client, config, &detached(turn.prompt)).await;
  };

  let argument = call.string_arg(tool.argument).unwrap_or_else(|| {
    warn!(name = %call.name, argument = tool.argument, "function call without argument, using prompt");
    turn.prompt
  });
  info!(capability = capability.as_str(), "router chose capability");

  let forwarded = Turn {
    prompt: argument,
    history: if capability == Capability::Code { turn.history } else { &[] },
    attachment: None,
  };
  capability.run(client, config, &forwarded).await
}

fn detached(prompt: &str) -> Turn<'_> {
  Turn {
    prompt,
    history: &[],
    attachment: None,
  }
}
