use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::Message;

/// Messages of one conversation, in turn order. Entries are only ever
/// appended; `clear` drops all of them at once.
#[derive(Default, Debug)]
pub struct History {
  messages: Vec<Message>,
}

impl History {
  pub fn messages(&self) -> &[Message] {
    &self.messages
  }

  pub fn push(&mut self, message: Message) {
    self.messages.push(message);
  }

  pub fn clear(&mut self) {
    self.messages.clear();
  }

  pub fn len(&self) -> usize {
    self.messages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.messages.is_empty()
  }
}

pub type Conversation = Arc<Mutex<History>>;

/// In-memory conversations keyed by id. Holding a conversation's lock for a
/// whole turn keeps its turns in order.
#[derive(Default)]
pub struct ConversationStore {
  conversations: Mutex<HashMap<String, Conversation>>,
}

impl ConversationStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the named conversation, creating it (and an id, if none was
  /// given) when missing.
  pub async fn open(&self, id: Option<String>) -> (String, Conversation) {
    let id = id
      .filter(|id| !id.trim().is_empty())
      .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut conversations = self.conversations.lock().await;
    let conversation = conversations.entry(id.clone()).or_default().clone();
    (id, conversation)
  }

  pub async fn get(&self, id: &str) -> Option<Conversation> {
    self.conversations.lock().await.get(id).cloned()
  }

  /// Waits for any turn in flight, then discards the conversation.
  pub async fn clear(&self, id: &str) -> bool {
    let Some(conversation) = self.conversations.lock().await.remove(id) else {
      return false;
    };
    conversation.lock().await.clear();
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::MessageBody;

  #[tokio::test]
  async fn open_creates_and_reuses_conversations() {
    let store = ConversationStore::new();
    let (id, conversation) = store.open(None).await;
    assert!(!id.is_empty());
    conversation.lock().await.push(Message::user("hi", None));

    let (same_id, same) = store.open(Some(id.clone())).await;
    assert_eq!(same_id, id);
    assert_eq!(same.lock().await.len(), 1);

    let (blank_id, _) = store.open(Some("  ".to_string())).await;
    assert_ne!(blank_id, id);
  }

  #[tokio::test]
  async fn history_keeps_turn_order() {
    let store = ConversationStore::new();
    let (id, conversation) = store.open(Some("c1".to_string())).await;
    {
      let mut history = conversation.lock().await;
      history.push(Message::user("one", None));
      history.push(Message::model("two", MessageBody::text(vec![])));
    }
    let conversation = store.get(&id).await.expect("conversation exists");
    let history = conversation.lock().await;
    let contents: Vec<&str> = history.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two"]);
  }

  #[tokio::test]
  async fn clear_discards_history() {
    let store = ConversationStore::new();
    let (id, conversation) = store.open(None).await;
    conversation.lock().await.push(Message::user("hi", None));

    assert!(store.clear(&id).await);
    assert!(conversation.lock().await.is_empty());
    assert!(store.get(&id).await.is_none());
    assert!(!store.clear(&id).await);
  }
}
