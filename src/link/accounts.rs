//! Account link store
//!
//! Maps a chat identity to the ledger account it has linked. This is the only
//! durable state in the bot: [`FileAccountLinks`] persists it to a JSON
//! registry, [`MemoryAccountLinks`] backs tests and throwaway sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::{AccountId, ActorId};

/// Actor → account mapping
#[async_trait]
pub trait AccountLinks: Send + Sync {
    /// Create or overwrite the link for `actor`
    async fn link(&self, actor: &ActorId, account: &AccountId) -> Result<()>;

    /// Linked account, if any
    async fn get_link(&self, actor: &ActorId) -> Result<Option<AccountId>>;

    /// Remove the link, returning whether one existed
    async fn unlink(&self, actor: &ActorId) -> Result<bool>;
}

/// Volatile link store
#[derive(Default)]
pub struct MemoryAccountLinks {
    links: DashMap<ActorId, AccountId>,
}

impl MemoryAccountLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[async_trait]
impl AccountLinks for MemoryAccountLinks {
    async fn link(&self, actor: &ActorId, account: &AccountId) -> Result<()> {
        self.links.insert(actor.clone(), account.clone());
        Ok(())
    }

    async fn get_link(&self, actor: &ActorId) -> Result<Option<AccountId>> {
        Ok(self.links.get(actor).map(|a| a.value().clone()))
    }

    async fn unlink(&self, actor: &ActorId) -> Result<bool> {
        Ok(self.links.remove(actor).is_some())
    }
}

/// One persisted link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub actor: ActorId,
    pub account: AccountId,
    pub linked_at: DateTime<Utc>,
}

/// On-disk registry format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRegistry {
    #[serde(default = "default_version")]
    pub version: String,
    pub links: Vec<LinkRecord>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self {
            version: default_version(),
            links: Vec::new(),
        }
    }
}

/// Write-through JSON file link store
pub struct FileAccountLinks {
    path: PathBuf,
    links: RwLock<HashMap<ActorId, LinkRecord>>,
}

impl FileAccountLinks {
    /// Load the registry at `path`, starting empty if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let registry = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::LinkStore(format!("Failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str::<LinkRegistry>(&content).map_err(|e| {
                Error::LinkStore(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            warn!(path = %path.display(), "Link registry not found, starting empty");
            LinkRegistry::default()
        };

        let links: HashMap<ActorId, LinkRecord> = registry
            .links
            .into_iter()
            .map(|r| (r.actor.clone(), r))
            .collect();

        info!("Loaded {} account links", links.len());

        Ok(Self {
            path: path.to_path_buf(),
            links: RwLock::new(links),
        })
    }

    async fn save(&self, links: &HashMap<ActorId, LinkRecord>) -> Result<()> {
        let mut records: Vec<LinkRecord> = links.values().cloned().collect();
        records.sort_by(|a, b| a.actor.cmp(&b.actor));
        let registry = LinkRegistry {
            version: default_version(),
            links: records,
        };

        let json = serde_json::to_string_pretty(&registry)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write to a sibling file then rename so a crash never leaves half a registry
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::LinkStore(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::LinkStore(format!("Failed to replace {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl AccountLinks for FileAccountLinks {
    async fn link(&self, actor: &ActorId, account: &AccountId) -> Result<()> {
        let mut links = self.links.write().await;
        links.insert(
            actor.clone(),
            LinkRecord {
                actor: actor.clone(),
                account: account.clone(),
                linked_at: Utc::now(),
            },
        );
        self.save(&links).await?;
        info!(actor = %actor, account = %account.short(), "Linked account");
        Ok(())
    }

    async fn get_link(&self, actor: &ActorId) -> Result<Option<AccountId>> {
        Ok(self.links.read().await.get(actor).map(|r| r.account.clone()))
    }

    async fn unlink(&self, actor: &ActorId) -> Result<bool> {
        let mut links = self.links.write().await;
        let existed = links.remove(actor).is_some();
        if existed {
            self.save(&links).await?;
            info!(actor = %actor, "Unlinked account");
        }
        Ok(existed)
    }
}
