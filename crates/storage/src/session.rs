use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use tracing::debug;

use trafficlens_core::types::ChatMessage;
use trafficlens_core::{Paths, Result};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_type")]
enum SessionLine {
    #[serde(rename = "metadata")]
    Metadata {
        created_at: String,
        updated_at: String,
        #[serde(default)]
        metadata: serde_json::Value,
    },
    #[serde(untagged)]
    Message(ChatMessage),
}

/// JSONL chat history, one file per session key: a metadata line followed
/// by one message per line.
pub struct SessionStore {
    paths: Paths,
}

impl SessionStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn load(&self, session_key: &str) -> Result<Vec<ChatMessage>> {
        let path = self.paths.session_file(session_key);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut messages = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<SessionLine>(&line) {
                Ok(SessionLine::Message(msg)) => {
                    messages.push(msg);
                }
                Ok(SessionLine::Metadata { .. }) => {
                    // Skip metadata line
                }
                Err(e) => {
                    debug!(error = %e, "Failed to parse session line, skipping");
                }
            }
        }

        Ok(messages)
    }

    pub fn save(&self, session_key: &str, messages: &[ChatMessage]) -> Result<()> {
        let path = self.paths.session_file(session_key);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let now = chrono::Utc::now().to_rfc3339();

        let mut file = File::create(&path)?;

        let metadata = SessionLine::Metadata {
            created_at: now.clone(),
            updated_at: now,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        };
        writeln!(file, "{}", serde_json::to_string(&metadata)?)?;

        for msg in messages {
            writeln!(file, "{}", serde_json::to_string(msg)?)?;
        }

        Ok(())
    }

    pub fn append(&self, session_key: &str, message: &ChatMessage) -> Result<()> {
        let path = self.paths.session_file(session_key);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if !path.exists() {
            let now = chrono::Utc::now().to_rfc3339();
            let mut file = File::create(&path)?;
            let metadata = SessionLine::Metadata {
                created_at: now.clone(),
                updated_at: now,
                metadata: serde_json::Value::Object(serde_json::Map::new()),
            };
            writeln!(file, "{}", serde_json::to_string(&metadata)?)?;
        }

        let mut file = OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(message)?)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(Paths::with_base(dir.path().to_path_buf()))
    }

    #[test]
    fn test_load_missing_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load("panel:default").unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let messages = vec![
            ChatMessage::user("what is this POST to /orders?"),
            ChatMessage::assistant("It creates an order with quantity 2."),
        ];
        store.save("panel:default", &messages).unwrap();

        let loaded = store.load("panel:default").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].role, "user");
        assert_eq!(loaded[1].content, "It creates an order with quantity 2.");
    }

    #[test]
    fn test_append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .append("panel:default", &ChatMessage::user("hello"))
            .unwrap();
        store
            .append("panel:default", &ChatMessage::assistant("hi"))
            .unwrap();

        let loaded = store.load("panel:default").unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_metadata_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save("panel:default", &[ChatMessage::user("x")]).unwrap();

        let path = Paths::with_base(dir.path().to_path_buf()).session_file("panel:default");
        let raw = std::fs::read_to_string(path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert_eq!(store.load("panel:default").unwrap().len(), 1);
    }
}
