//! Remembers the location permission decision across restarts.

use crate::geo::PermissionDecision;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Stored {
    decision: PermissionDecision,
}

/// The decision the user gave, optionally persisted as a small JSON file.
///
/// I/O failures are logged and otherwise ignored: the worst case is that the user is
/// asked again on the next start.
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    path: Option<PathBuf>,
    decision: Option<PermissionDecision>,
}

impl PermissionCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Reads a previously stored decision from `path`, if any.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let decision = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Stored>(&bytes) {
                Ok(stored) => Some(stored.decision),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable permission cache");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read permission cache");
                None
            }
        };
        debug!(path = %path.display(), ?decision, "Permission cache loaded");
        Self {
            path: Some(path),
            decision,
        }
    }

    pub fn get(&self) -> Option<PermissionDecision> {
        self.decision
    }

    pub async fn set(&mut self, decision: PermissionDecision) {
        self.decision = Some(decision);
        let Some(path) = &self.path else {
            return;
        };
        let written = match serde_json::to_vec(&Stored { decision }) {
            Ok(bytes) => tokio::fs::write(path, bytes).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = written {
            warn!(path = %path.display(), %error, "Could not persist permission decision");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decision_survives_reload() {
        let path = std::env::temp_dir().join(format!(
            "dispatch-permission-{}.json",
            std::process::id()
        ));
        let _ = tokio::fs::remove_file(&path).await;

        let mut cache = PermissionCache::load(&path).await;
        assert_eq!(cache.get(), None);
        cache.set(PermissionDecision::Denied).await;

        let reloaded = PermissionCache::load(&path).await;
        assert_eq!(reloaded.get(), Some(PermissionDecision::Denied));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_in_memory_cache_only_remembers() {
        let mut cache = PermissionCache::in_memory();
        cache.set(PermissionDecision::Granted).await;
        assert_eq!(cache.get(), Some(PermissionDecision::Granted));
    }
}
