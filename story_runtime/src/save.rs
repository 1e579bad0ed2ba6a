//! Save System - snapshots of a session, stored as base64-encoded JSON.
//!
//! The encoding only keeps casual players from editing their saves; it is
//! not meant to be secure. Saves carry no schema version.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use story_world::{NodeId, Variables};
use thiserror::Error;

use crate::manager::StoryManager;

/// Errors raised while saving or loading.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("save data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("save data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("save data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("nothing to save: the game has not started")]
    NothingToSave,

    #[error("saved node '{0}' does not exist in the loaded project")]
    UnknownNode(NodeId),
}

/// Everything needed to resume a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: f64,
    pub current_node_id: NodeId,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub history: Vec<NodeId>,
}

/// Snapshot, encode, persist and restore.
pub struct SaveSystem;

impl SaveSystem {
    /// Capture the session, or `None` before the game has started.
    pub fn snapshot(manager: &StoryManager) -> Option<SaveData> {
        let current_node_id = manager.current_node_id()?.clone();
        Some(SaveData {
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            current_node_id,
            variables: manager.variables().get_all(),
            history: manager.history().to_vec(),
        })
    }

    pub fn encode(data: &SaveData) -> Result<String, SaveError> {
        let json = serde_json::to_string(data)?;
        Ok(STANDARD.encode(json.as_bytes()))
    }

    pub fn decode(encoded: &str) -> Result<SaveData, SaveError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        let json = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Encode and write a snapshot.
    pub fn persist(data: &SaveData, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let path = path.as_ref();
        std::fs::write(path, Self::encode(data)?).map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a save file without touching any session.
    pub fn read(path: impl AsRef<Path>) -> Result<SaveData, SaveError> {
        let path = path.as_ref();
        let encoded = std::fs::read_to_string(path).map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&encoded)
    }

    /// Put a snapshot back into a manager.
    ///
    /// Variables and history are replaced wholesale, then the saved node is
    /// entered through the normal transition, so its `on_enter` scripts run
    /// again. No `on_exit` runs and nothing extra is pushed to history. The
    /// manager is left untouched if the saved node is not in its project.
    pub fn apply(manager: &mut StoryManager, data: SaveData) -> Result<(), SaveError> {
        let known = manager
            .project()
            .is_some_and(|project| project.contains_node(&data.current_node_id));
        if !known {
            return Err(SaveError::UnknownNode(data.current_node_id));
        }
        manager.resume(data.variables, data.history, &data.current_node_id);
        Ok(())
    }

    /// Read a save file and apply it.
    pub fn restore(manager: &mut StoryManager, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let data = Self::read(path)?;
        Self::apply(manager, data)
    }

    /// Snapshot and persist, reporting success as a flag.
    pub fn save_game(manager: &StoryManager, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let result = Self::snapshot(manager)
            .ok_or(SaveError::NothingToSave)
            .and_then(|data| Self::persist(&data, path));
        match result {
            Ok(()) => {
                tracing::info!("Game saved to {}", path.display());
                true
            }
            Err(e) => {
                tracing::error!("Save failed: {}", e);
                false
            }
        }
    }

    /// Restore from a file, reporting success as a flag. A missing file is
    /// simply `false`.
    pub fn load_game(manager: &mut StoryManager, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No save at {}", path.display());
            return false;
        }
        match Self::restore(manager, path) {
            Ok(()) => {
                tracing::info!("Game loaded from {}", path.display());
                true
            }
            Err(e) => {
                tracing::error!("Load failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use story_world::{Choice, Node, Project};

    fn manager() -> StoryManager {
        let mut project = Project::new();
        project.add_node(Node::new("a", "Start").with_choice(Choice::new("c1", "Go", "b")));
        project.add_node(Node::new("b", "End"));
        let mut manager = StoryManager::new();
        manager.load_project(project);
        manager
    }

    #[test]
    fn test_snapshot_requires_a_position() {
        let mut manager = manager();
        assert!(SaveSystem::snapshot(&manager).is_none());

        manager.start_game();
        let data = SaveSystem::snapshot(&manager).unwrap();
        assert_eq!(data.current_node_id, NodeId::from("a"));
        assert!(data.timestamp > 0.0);
    }

    #[test]
    fn test_encoding_is_base64_json() {
        let mut manager = manager();
        manager.start_game();
        let data = SaveSystem::snapshot(&manager).unwrap();

        let encoded = SaveSystem::encode(&data).unwrap();
        let raw = String::from_utf8(STANDARD.decode(&encoded).unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["current_node_id"], json!("a"));
        assert_eq!(SaveSystem::decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(SaveSystem::decode("%%%"), Err(SaveError::Base64(_))));
        let not_json = STANDARD.encode("hello");
        assert!(matches!(SaveSystem::decode(&not_json), Err(SaveError::Json(_))));
    }

    #[test]
    fn test_unknown_node_leaves_manager_untouched() {
        let mut manager = manager();
        manager.start_game();
        let data = SaveData {
            timestamp: 0.0,
            current_node_id: NodeId::from("gone"),
            variables: Variables::new(),
            history: vec![NodeId::from("a")],
        };

        assert!(matches!(
            SaveSystem::apply(&mut manager, data),
            Err(SaveError::UnknownNode(_))
        ));
        assert_eq!(manager.current_node_id(), Some(&NodeId::from("a")));
        assert!(manager.history().is_empty());
    }

    #[test]
    fn test_save_and_load_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot1.sav");

        let mut fresh = manager();
        assert!(!SaveSystem::save_game(&fresh, &path));
        assert!(!SaveSystem::load_game(&mut fresh, &path));

        std::fs::write(&path, "not a save").unwrap();
        assert!(!SaveSystem::load_game(&mut fresh, &path));
        assert!(fresh.current_node_id().is_none());
    }
}
