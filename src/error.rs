use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
  #[error("Gemini API key missing. Set GEMINI_API_KEY or run `omnichat set-key`.")]
  MissingKey,

  #[error("request to Gemini failed: {0}")]
  Transport(reqwest::Error),

  #[error("Gemini error ({status}): {body}")]
  RemoteStatus { status: u16, body: String },

  #[error("Gemini error: {0}")]
  Remote(String),

  #[error("could not decode Gemini response: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("invalid attachment: {0}")]
  InvalidAttachment(String),

  #[error("keyring error: {0}")]
  Keyring(#[from] keyring::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub type ChatResult<T> = Result<T, ChatError>;

// Request URLs never reach error messages.
impl From<reqwest::Error> for ChatError {
  fn from(err: reqwest::Error) -> Self {
    ChatError::Transport(err.without_url())
  }
}
