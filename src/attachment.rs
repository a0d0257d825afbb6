use std::path::Path;

use base64::Engine;

use crate::error::{ChatError, ChatResult};

const DEFAULT_MIME: &str = "image/png";

/// A user-supplied image, held without its data-URI prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
  pub mime_type: String,
  pub data: String,
}

impl Attachment {
  /// Accepts `data:<mime>;base64,<payload>` or a bare base64 payload.
  pub fn parse(raw: &str) -> ChatResult<Self> {
    let raw = raw.trim();
    let (mime_type, data) = match raw.strip_prefix("data:") {
      Some(rest) => {
        let (header, payload) = rest
          .split_once(',')
          .ok_or_else(|| ChatError::InvalidAttachment("data URI has no payload".to_string()))?;
        let mime = header
          .strip_suffix(";base64")
          .ok_or_else(|| ChatError::InvalidAttachment("data URI is not base64 encoded".to_string()))?;
        if !mime.starts_with("image/") {
          return Err(ChatError::InvalidAttachment(format!("unsupported type `{mime}`")));
        }
        (mime.to_string(), payload)
      }
      None => (DEFAULT_MIME.to_string(), raw),
    };

    if data.is_empty() {
      return Err(ChatError::InvalidAttachment("image payload is empty".to_string()));
    }
    base64::engine::general_purpose::STANDARD
      .decode(data)
      .map_err(|err| ChatError::InvalidAttachment(err.to_string()))?;

    Ok(Self {
      mime_type,
      data: data.to_string(),
    })
  }

  pub fn from_file(path: &Path) -> ChatResult<Self> {
    let bytes = std::fs::read(path)?;
    let mime_type = mime_for_path(path)
      .ok_or_else(|| ChatError::InvalidAttachment(format!("{} is not a supported image", path.display())))?;
    Ok(Self {
      mime_type: mime_type.to_string(),
      data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
  }

  pub fn data_url(&self) -> String {
    format!("data:{};base64,{}", self.mime_type, self.data)
  }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
  let ext = path.extension()?.to_str()?.to_ascii_lowercase();
  match ext.as_str() {
    "png" => Some("image/png"),
    "jpg" | "jpeg" => Some("image/jpeg"),
    "webp" => Some("image/webp"),
    "gif" => Some("image/gif"),
    "heic" => Some("image/heic"),
    _ => None,
  }
}
