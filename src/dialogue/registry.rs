//! NPC Content Registry
//!
//! Loads, caches, and manages NPC dialogue definitions from JSON files.
//! Supports hot-reloading during development.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::definition::{Npc, RawNpcFile};

/// Registry for all NPC definitions
pub struct NpcRegistry {
    /// Loaded NPC definitions
    npcs: RwLock<HashMap<String, Arc<Npc>>>,
    /// Base directory for NPC content files
    data_dir: PathBuf,
}

impl NpcRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            npcs: RwLock::new(HashMap::new()),
            data_dir: data_dir.to_path_buf(),
        }
    }

    /// Load all NPC definitions from the content directory
    pub async fn load_all(&self) -> Result<(), String> {
        info!("Loading NPC content from {:?}", self.data_dir);

        if !self.data_dir.exists() {
            warn!("NPC content directory does not exist: {:?}", self.data_dir);
            return Ok(());
        }

        let entries = std::fs::read_dir(&self.data_dir)
            .map_err(|e| format!("Failed to read directory {:?}: {}", self.data_dir, e))?;

        let mut loaded = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                match Self::load_npc_file(&path) {
                    Ok(npcs) => loaded.extend(npcs),
                    Err(e) => warn!("Failed to load NPC file {:?}: {}", path, e),
                }
            }
        }

        let count = loaded.len();
        let mut npcs = self.npcs.write().await;
        *npcs = loaded;
        info!("Loaded {} NPC definitions", count);

        Ok(())
    }

    /// Load a single content file: NPC id -> definition. NPCs that fail the
    /// option invariant are skipped with a warning; the rest of the file loads.
    fn load_npc_file(path: &Path) -> Result<HashMap<String, Arc<Npc>>, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

        let raw: RawNpcFile = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        let mut npcs = HashMap::new();
        for (id, raw_npc) in &raw {
            match Npc::from_raw(id, raw_npc) {
                Ok(npc) => {
                    info!("Loaded NPC: {} ({})", npc.name, npc.id);
                    npcs.insert(id.clone(), Arc::new(npc));
                }
                Err(e) => warn!("Skipping invalid NPC '{}': {}", id, e),
            }
        }

        Ok(npcs)
    }

    /// Get an NPC by id
    pub async fn get(&self, npc_id: &str) -> Option<Arc<Npc>> {
        let npcs = self.npcs.read().await;
        npcs.get(npc_id).cloned()
    }

    /// Get all NPC ids
    pub async fn all_ids(&self) -> Vec<String> {
        let npcs = self.npcs.read().await;
        npcs.keys().cloned().collect()
    }

    /// Get count of loaded NPCs
    pub async fn count(&self) -> usize {
        self.npcs.read().await.len()
    }

    /// Start file watcher for hot-reload.
    /// Returns a channel receiver that signals when reloads occur.
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<HotReloadEvent>, String> {
        use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let registry = Arc::clone(self);
        let data_dir = self.data_dir.clone();
        let rt = tokio::runtime::Handle::current();

        // Create the watcher in a blocking thread since notify is sync
        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if data_dir.exists() {
                if let Err(e) = watcher.watch(&data_dir, RecursiveMode::Recursive) {
                    tracing::error!("Failed to watch NPC content directory: {}", e);
                }
            }

            info!("NPC content hot-reload watcher started for {:?}", data_dir);

            loop {
                match notify_rx.recv() {
                    Ok(event) => {
                        use notify::EventKind;
                        match event.kind {
                            EventKind::Modify(_) | EventKind::Create(_) => {
                                for path in &event.paths {
                                    let extension = path
                                        .extension()
                                        .and_then(|e| e.to_str())
                                        .unwrap_or("");

                                    if extension == "json" {
                                        info!("Detected change in {:?}, triggering reload", path);

                                        let reg = Arc::clone(&registry);
                                        let tx = tx.clone();
                                        let path_clone = path.clone();

                                        rt.spawn(async move {
                                            if let Err(e) = reg.load_all().await {
                                                tracing::error!("Hot-reload failed: {}", e);
                                                let _ = tx.send(HotReloadEvent::Error(e)).await;
                                            } else {
                                                let _ = tx
                                                    .send(HotReloadEvent::Reloaded(
                                                        path_clone.to_string_lossy().to_string(),
                                                    ))
                                                    .await;
                                            }
                                        });
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    Err(_) => {
                        // Channel closed, exit
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// A file was reloaded successfully
    Reloaded(String),
    /// An error occurred during reload
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_npc_json() -> &'static str {
        r#"{
            "tutorial_guide": {
                "name": "Sage Elara",
                "greeting": "Welcome to ElderScape!",
                "quest_id": "tutorial_basics",
                "options": [
                    {"id": "tut_begin", "label": "Yes, let's begin."},
                    {"id": "close", "label": "Not now."}
                ],
                "responses": {
                    "tut_begin": {
                        "text": "Great! First, mine 5 copper ore.",
                        "quest": {"id": "tutorial_basics", "step_delta": 1}
                    }
                }
            },
            "broken_npc": {
                "name": "Broken",
                "greeting": "Hello",
                "options": [{"id": "dangling", "label": "..."}]
            }
        }"#
    }

    #[tokio::test]
    async fn test_load_npcs_and_skip_invalid() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("npcs.json"), create_test_npc_json()).unwrap();

        let registry = NpcRegistry::new(temp_dir.path());
        registry.load_all().await.unwrap();

        // Valid NPC loads
        let npc = registry.get("tutorial_guide").await.unwrap();
        assert_eq!(npc.name, "Sage Elara");
        assert_eq!(npc.quest_id.as_deref(), Some("tutorial_basics"));

        // NPC with a dangling option reference is skipped
        assert!(registry.get("broken_npc").await.is_none());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let registry = NpcRegistry::new(&temp_dir.path().join("does_not_exist"));
        assert!(registry.load_all().await.is_ok());
        assert_eq!(registry.count().await, 0);
    }
}
