//! Process-wide chat state: session logs plus the ingested-file registry.
//!
//! Both maps sit behind one lock so every operation is atomic with respect to
//! the others, including the registry's check-then-insert.

use std::collections::HashMap;

use chatdesk_schema::{ChatMessage, ChatsDump, FileInfo};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};

const INVALID_MESSAGE: &str = "Invalid message format";

#[derive(Debug, Default)]
struct StoreInner {
    sessions: HashMap<String, Vec<ChatMessage>>,
    /// file_name -> file_path
    files: HashMap<String, String>,
}

/// Shared state owned by the server process and handed to every handler.
#[derive(Debug, Default)]
pub struct ChatStore {
    inner: RwLock<StoreInner>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session and return its id.
    pub async fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.inner
            .write()
            .await
            .sessions
            .insert(session_id.clone(), Vec::new());
        tracing::debug!(%session_id, "session created");
        session_id
    }

    /// Validate a raw `message` value and append it to the session.
    ///
    /// On validation failure the store is left untouched.
    pub async fn append_message(&self, session_id: &str, message: &Value) -> Result<Vec<ChatMessage>> {
        let message = parse_message(message)?;
        Ok(self.append(session_id, message).await)
    }

    /// Append an already-validated message and return the session's full log.
    pub async fn append(&self, session_id: &str, message: ChatMessage) -> Vec<ChatMessage> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id) {
            Some(messages) => {
                messages.push(message);
                tracing::debug!(%session_id, count = messages.len(), "message appended");
                messages.clone()
            }
            None => {
                // First write to an unknown id creates the session.
                tracing::debug!(%session_id, "session created by first message");
                let messages = vec![message];
                inner.sessions.insert(session_id.to_string(), messages.clone());
                messages
            }
        }
    }

    /// The session's messages, or an empty log for an unknown id.
    pub async fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.inner
            .read()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.inner.read().await.sessions.keys().cloned().collect()
    }

    pub async fn all_sessions(&self) -> ChatsDump {
        self.inner.read().await.sessions.clone()
    }

    /// Record an ingested file. Both the name and the path must be unused.
    pub async fn register_file(
        &self,
        file_name: Option<&str>,
        file_path: Option<&str>,
    ) -> Result<FileInfo> {
        let (Some(file_name), Some(file_path)) = (non_blank(file_name), non_blank(file_path))
        else {
            return Err(StoreError::BadRequest(
                "file_name and file_path are required".to_string(),
            ));
        };

        let mut inner = self.inner.write().await;
        if inner.files.contains_key(file_name) {
            tracing::warn!(file_name, "file name already registered");
            return Err(StoreError::Conflict(format!(
                "file name already registered: {file_name}"
            )));
        }
        // Paths are not indexed; scan the stored values.
        if inner.files.values().any(|path| path == file_path) {
            tracing::warn!(file_path, "file path already registered");
            return Err(StoreError::Conflict(format!(
                "file path already registered: {file_path}"
            )));
        }

        inner
            .files
            .insert(file_name.to_string(), file_path.to_string());
        tracing::info!(file_name, file_path, "file registered");
        Ok(FileInfo::new(file_name, file_path))
    }

    pub async fn files(&self) -> Vec<FileInfo> {
        self.inner
            .read()
            .await
            .files
            .iter()
            .map(|(name, path)| FileInfo::new(name.clone(), path.clone()))
            .collect()
    }
}

/// Accept only an object carrying string `role` and `content` fields.
///
/// Extra fields are ignored.
pub fn parse_message(value: &Value) -> Result<ChatMessage> {
    let Some(object) = value.as_object() else {
        return Err(StoreError::BadRequest(INVALID_MESSAGE.to_string()));
    };
    let role = object.get("role").and_then(Value::as_str);
    let content = object.get("content").and_then(Value::as_str);
    match (role, content) {
        (Some(role), Some(content)) => Ok(ChatMessage::new(role, content)),
        _ => Err(StoreError::BadRequest(INVALID_MESSAGE.to_string())),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_session_starts_empty_and_is_listed() {
        let store = ChatStore::new();
        let id = store.create_session().await;

        assert!(Uuid::parse_str(&id).is_ok());
        assert!(store.history(&id).await.is_empty());
        assert_eq!(store.session_ids().await, vec![id.clone()]);
        assert_eq!(store.all_sessions().await.get(&id), Some(&Vec::new()));
    }

    #[tokio::test]
    async fn create_session_ids_are_unique() {
        let store = ChatStore::new();
        let a = store.create_session().await;
        let b = store.create_session().await;
        assert_ne!(a, b);
        assert_eq!(store.session_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn append_to_unknown_session_creates_it() {
        let store = ChatStore::new();
        let messages = store
            .append_message("abc", &json!({"role": "user", "content": "hi"}))
            .await
            .unwrap();

        assert_eq!(messages, vec![ChatMessage::user("hi")]);
        assert_eq!(store.history("abc").await, vec![ChatMessage::user("hi")]);
        assert!(store.session_ids().await.contains(&"abc".to_string()));
    }

    #[tokio::test]
    async fn append_preserves_insertion_order() {
        let store = ChatStore::new();
        let id = store.create_session().await;
        store.append(&id, ChatMessage::user("first")).await;
        let messages = store.append(&id, ChatMessage::assistant("second")).await;

        assert_eq!(
            messages,
            vec![ChatMessage::user("first"), ChatMessage::assistant("second")]
        );
        assert_eq!(store.history(&id).await, messages);
    }

    #[tokio::test]
    async fn append_rejects_missing_fields_without_mutation() {
        let store = ChatStore::new();
        let id = store.create_session().await;
        store.append(&id, ChatMessage::user("kept")).await;

        for bad in [
            json!({"role": "user"}),
            json!({"content": "no role"}),
            json!("just a string"),
            json!(null),
            json!([{"role": "user", "content": "hi"}]),
        ] {
            let err = store.append_message(&id, &bad).await.unwrap_err();
            assert_eq!(err, StoreError::BadRequest(INVALID_MESSAGE.to_string()));
        }

        assert_eq!(store.history(&id).await, vec![ChatMessage::user("kept")]);
    }

    #[tokio::test]
    async fn rejected_append_does_not_create_session() {
        let store = ChatStore::new();
        let _ = store.append_message("ghost", &json!({"role": "user"})).await;
        assert!(store.session_ids().await.is_empty());
    }

    #[tokio::test]
    async fn history_of_unknown_session_is_empty() {
        let store = ChatStore::new();
        assert!(store.history("missing").await.is_empty());
    }

    #[test]
    fn parse_message_ignores_extra_fields() {
        let msg = parse_message(&json!({"role": "system", "content": "note", "extra": 1})).unwrap();
        assert_eq!(msg, ChatMessage::system("note"));
    }

    #[test]
    fn parse_message_requires_string_content() {
        let err = parse_message(&json!({"role": "user", "content": 42})).unwrap_err();
        assert!(matches!(err, StoreError::BadRequest(_)));
    }

    #[tokio::test]
    async fn register_then_list_includes_pair_once() {
        let store = ChatStore::new();
        let info = store
            .register_file(Some("report.pdf"), Some("/data/report.pdf"))
            .await
            .unwrap();
        assert_eq!(info, FileInfo::new("report.pdf", "/data/report.pdf"));

        let files = store.files().await;
        assert_eq!(files.iter().filter(|f| **f == info).count(), 1);
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn register_duplicate_name_conflicts() {
        let store = ChatStore::new();
        store.register_file(Some("a.pdf"), Some("/x/a.pdf")).await.unwrap();
        let err = store
            .register_file(Some("a.pdf"), Some("/y/a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.files().await.len(), 1);
    }

    #[tokio::test]
    async fn register_duplicate_path_conflicts() {
        let store = ChatStore::new();
        store.register_file(Some("a.pdf"), Some("/x/a.pdf")).await.unwrap();
        let err = store
            .register_file(Some("b.pdf"), Some("/x/a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.files().await, vec![FileInfo::new("a.pdf", "/x/a.pdf")]);
    }

    #[tokio::test]
    async fn register_missing_or_blank_fields_is_bad_request() {
        let store = ChatStore::new();
        for (name, path) in [
            (None, Some("/x")),
            (Some("x"), None),
            (None, None),
            (Some("  "), Some("/x")),
        ] {
            let err = store.register_file(name, path).await.unwrap_err();
            assert_eq!(err.kind(), chatdesk_schema::ErrorKind::BadRequest);
        }
        assert!(store.files().await.is_empty());
    }
}
