use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::LspCapabilities;

pub const CACHE_FILE_NAME: &str = "lsp_cache.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheContents {
    pub capabilities: Option<LspCapabilities>,
    #[serde(default)]
    pub lsp_pubkeys: BTreeSet<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Best-effort on-disk cache of the last resolved capabilities and the LSP
/// node keys seen so far. Read and write failures are logged and otherwise
/// ignored; an empty cache is always a valid state.
#[derive(Debug)]
pub struct LspCache {
    path: Option<PathBuf>,
    contents: RwLock<CacheContents>,
}

impl LspCache {
    /// Cache that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            contents: RwLock::new(CacheContents::default()),
        }
    }

    /// Open the cache stored in `dir`, starting empty if it is missing or
    /// unreadable
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(CACHE_FILE_NAME);
        let contents = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CacheContents>(&raw) {
                Ok(contents) => {
                    debug!(
                        path = %path.display(),
                        pubkeys = contents.lsp_pubkeys.len(),
                        "Loaded LSP cache"
                    );
                    contents
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable LSP cache");
                    CacheContents::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheContents::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read LSP cache");
                CacheContents::default()
            }
        };

        Self {
            path: Some(path),
            contents: RwLock::new(contents),
        }
    }

    pub async fn capabilities(&self) -> Option<LspCapabilities> {
        self.contents.read().await.capabilities.clone()
    }

    pub async fn lsp_pubkeys(&self) -> BTreeSet<String> {
        self.contents.read().await.lsp_pubkeys.clone()
    }

    pub async fn snapshot(&self) -> CacheContents {
        self.contents.read().await.clone()
    }

    pub async fn store_capabilities(&self, capabilities: &LspCapabilities) {
        let mut contents = self.contents.write().await;
        contents.capabilities = Some(capabilities.clone());
        contents
            .lsp_pubkeys
            .extend(capabilities.node_pubkeys());
        contents.updated_at = Some(Utc::now());
        self.persist(&contents);
    }

    pub async fn remember_pubkeys(&self, pubkeys: impl IntoIterator<Item = String>) {
        let mut contents = self.contents.write().await;
        let before = contents.lsp_pubkeys.len();
        contents.lsp_pubkeys.extend(pubkeys);
        if contents.lsp_pubkeys.len() != before {
            contents.updated_at = Some(Utc::now());
            self.persist(&contents);
        }
    }

    /// Drop everything, in memory and on disk
    pub async fn invalidate(&self) {
        let mut contents = self.contents.write().await;
        *contents = CacheContents::default();
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "LSP cache invalidated"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove LSP cache"),
            }
        }
    }

    fn persist(&self, contents: &CacheContents) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_atomically(path, contents) {
            warn!(path = %path.display(), error = %e, "Failed to persist LSP cache");
        }
    }
}

fn write_atomically(path: &Path, contents: &CacheContents) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, serde_json::to_vec_pretty(contents)?)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}
