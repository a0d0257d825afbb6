mod attachment;
mod config;
mod dispatch;
mod error;
mod gemini;
mod handlers;
mod history;
mod logger;
mod models;
mod router;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use attachment::Attachment;
use config::{load_or_init, resolve_api_key, store_api_key};
use dispatch::Dispatcher;
use gemini::GeminiClient;
use models::AgentMode;
use server::{run_server, ServerState};

#[derive(Parser)]
#[command(name = "omnichat", version)]
#[command(about = "Routes chat turns to Gemini text, code, image, speech and vision models")]
struct Cli {
  /// Config file (defaults to config.json in the data directory)
  #[arg(long, env = "OMNICHAT_CONFIG")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API used by the browser client (default)
  Serve {
    /// Listen address, overrides `listen_addr` from the config
    #[arg(long)]
    addr: Option<String>,
  },
  /// Run a single turn and print the reply as JSON
  Ask {
    #[arg(long, short, default_value = "orchestrator")]
    mode: AgentMode,
    /// Image to attach
    #[arg(long)]
    image: Option<PathBuf>,
    prompt: String,
  },
  /// Store the Gemini API key in the OS keyring
  SetKey { key: String },
}

fn data_dir() -> anyhow::Result<PathBuf> {
  let dir = dirs::config_dir()
    .map(|d| d.join("omnichat"))
    .context("missing config dir")?;
  std::fs::create_dir_all(&dir)?;
  Ok(dir)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let data_dir = data_dir()?;
  logger::init(&data_dir.join("omnichat.log"))?;

  let config_path = cli.config.unwrap_or_else(|| data_dir.join("config.json"));
  let config = load_or_init(&config_path)
    .with_context(|| format!("failed to load {}", config_path.display()))?;

  match cli.command.unwrap_or(Command::Serve { addr: None }) {
    Command::SetKey { key } => {
      store_api_key(&key)?;
      tracing::info!("API key stored");
    }
    Command::Ask { mode, image, prompt } => {
      let attachment = image.as_deref().map(Attachment::from_file).transpose()?;
      let client = GeminiClient::new(resolve_api_key()?, &config);
      let dispatcher = Dispatcher::new(Arc::new(client), config);
      let reply = dispatcher.respond(&prompt, mode, &[], attachment.as_ref()).await;
      println!("{}", serde_json::to_string_pretty(&reply)?);
    }
    Command::Serve { addr } => {
      let addr = addr.unwrap_or_else(|| config.listen_addr.clone());
      let client = GeminiClient::new(resolve_api_key()?, &config);
      let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
      let state = ServerState::new(Dispatcher::new(Arc::new(client), config));
      run_server(listener, state).await?;
    }
  }

  Ok(())
}
