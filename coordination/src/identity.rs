//! Locally persisted participant identity
//!
//! Mirrors what the browser keeps in local storage: one stable,
//! session-independent participant id, plus per-session display name and
//! avatar emoji so a reload lands back at the join form pre-filled.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Error type for profile persistence
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for profile persistence
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Display name and avatar remembered for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub name: String,
    pub emoji: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileData {
    participant_id: Option<String>,
    #[serde(default)]
    sessions: HashMap<String, SessionProfile>,
}

/// JSON-file-backed profile store.
pub struct ProfileStore {
    path: PathBuf,
    data: ProfileData,
}

impl ProfileStore {
    /// Load the profile at `path`; a missing or unreadable file yields a
    /// fresh profile rather than an error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), "Corrupt profile file, starting fresh: {e}");
                    ProfileData::default()
                }
            },
            Err(_) => ProfileData::default(),
        };
        Self { path, data }
    }

    /// The stable participant id, minted on first use.
    pub fn participant_id(&mut self) -> ProfileResult<String> {
        if let Some(id) = &self.data.participant_id {
            return Ok(id.clone());
        }
        let id = Uuid::new_v4().to_string();
        self.data.participant_id = Some(id.clone());
        self.save()?;
        Ok(id)
    }

    /// Remember the name and emoji used for a session.
    pub fn remember(
        &mut self,
        session_id: &str,
        profile: SessionProfile,
    ) -> ProfileResult<()> {
        self.data.sessions.insert(session_id.to_string(), profile);
        self.save()
    }

    /// Name and emoji previously used for a session, if any.
    pub fn session_profile(&self, session_id: &str) -> Option<&SessionProfile> {
        self.data.sessions.get(session_id)
    }

    fn save(&self) -> ProfileResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_stable_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let mut store = ProfileStore::load(&path);
        let id = store.participant_id().unwrap();

        let mut reloaded = ProfileStore::load(&path);
        assert_eq!(reloaded.participant_id().unwrap(), id);
    }

    #[test]
    fn test_session_profile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let mut store = ProfileStore::load(&path);
        store
            .remember(
                "s1",
                SessionProfile {
                    name: "Ada".into(),
                    emoji: "🚀".into(),
                },
            )
            .unwrap();

        let reloaded = ProfileStore::load(&path);
        let profile = reloaded.session_profile("s1").unwrap();
        assert_eq!(profile.name, "Ada");
        assert_eq!(profile.emoji, "🚀");
        assert!(reloaded.session_profile("s2").is_none());
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = ProfileStore::load(&path);
        assert!(store.session_profile("s1").is_none());
    }
}
