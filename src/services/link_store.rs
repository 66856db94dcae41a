//! Persistent chat-to-account link store
//!
//! Links are loaded once at startup and cached in memory. Every mutation
//! writes the full state back to disk before returning.

use crate::types::{ChatId, Link, Platform, Result, RevtrackError, Role};
use directories::BaseDirs;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

/// One link as written to disk (the chat id is the enclosing key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LinkRecord {
    platform: Platform,
    account_id: String,
    #[serde(default)]
    role: Role,
    #[serde(default)]
    nickname: Option<String>,
}

/// Model entry of the multi-model shape that predates per-link roles
#[derive(Debug, Deserialize)]
struct ModelRecord {
    platform: Platform,
    platform_account_id: String,
    #[serde(default)]
    nickname: Option<String>,
}

/// Every on-disk shape a chat entry has had. Resolved once at load time.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatRecord {
    Links {
        links: Vec<LinkRecord>,
    },
    Models {
        models: Vec<ModelRecord>,
        #[serde(default)]
        chat_type: Role,
    },
    Legacy {
        platform: Platform,
        platform_account_id: String,
    },
}

impl ChatRecord {
    fn into_links(self, chat_id: ChatId) -> Vec<Link> {
        match self {
            ChatRecord::Links { links } => links
                .into_iter()
                .map(|r| Link {
                    chat_id,
                    platform: r.platform,
                    account_id: r.account_id,
                    role: r.role,
                    nickname: r.nickname,
                })
                .collect(),
            ChatRecord::Models { models, chat_type } => models
                .into_iter()
                .map(|m| Link {
                    chat_id,
                    platform: m.platform,
                    account_id: m.platform_account_id,
                    role: chat_type,
                    nickname: m.nickname,
                })
                .collect(),
            ChatRecord::Legacy {
                platform,
                platform_account_id,
            } => vec![Link::new(chat_id, platform, platform_account_id)],
        }
    }
}

/// Canonical on-disk shape
#[derive(Debug, Serialize)]
struct StoredChat {
    links: Vec<LinkRecord>,
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
    Added,
    Updated,
}

type LinkMap = BTreeMap<ChatId, Vec<Link>>;

pub struct LinkStore {
    path: PathBuf,
    links: RwLock<LinkMap>,
}

impl LinkStore {
    /// Open the store at `path`. A missing file is an empty store; a
    /// corrupt one is an error so it never gets overwritten by accident.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let links = Self::load(&path)?;
        info!(
            path = %path.display(),
            chats = links.len(),
            "loaded link store"
        );
        Ok(Self {
            path,
            links: RwLock::new(links),
        })
    }

    /// Default location (`~/.revtrack/links.json`)
    pub fn default_path() -> Result<PathBuf> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| RevtrackError::Config("Cannot determine home directory".into()))?;
        Ok(base_dirs.home_dir().join(".revtrack").join("links.json"))
    }

    /// Links of one chat in insertion order
    pub fn get(&self, chat_id: ChatId) -> Vec<Link> {
        self.read().get(&chat_id).cloned().unwrap_or_default()
    }

    /// Chats with at least one link
    pub fn chats(&self) -> Vec<ChatId> {
        self.read()
            .iter()
            .filter(|(_, links)| !links.is_empty())
            .map(|(chat_id, _)| *chat_id)
            .collect()
    }

    /// Snapshot of every chat
    pub fn all(&self) -> BTreeMap<ChatId, Vec<Link>> {
        self.read().clone()
    }

    /// Insert or overwrite the link identified by (chat, platform, account_id).
    /// An overwritten link keeps its position.
    pub fn put(&self, link: Link) -> Result<LinkChange> {
        let mut guard = self.write();
        let chat_links = guard.entry(link.chat_id).or_default();

        let change = match chat_links
            .iter_mut()
            .find(|l| l.same_account(link.platform, &link.account_id))
        {
            Some(existing) => {
                *existing = link;
                LinkChange::Updated
            }
            None => {
                chat_links.push(link);
                LinkChange::Added
            }
        };

        // In-memory state stays mutated if the write fails
        self.persist(&guard)?;
        Ok(change)
    }

    /// Remove links of a chat. `None` filters match anything, so
    /// `remove(chat, None, None)` drops every link of the chat.
    pub fn remove(
        &self,
        chat_id: ChatId,
        platform: Option<Platform>,
        account_id: Option<&str>,
    ) -> Result<Vec<Link>> {
        self.remove_where(chat_id, |link| {
            platform.map_or(true, |p| link.platform == p)
                && account_id.map_or(true, |id| link.account_id == id)
        })
    }

    /// Remove exactly the given links (matched by platform and account id)
    pub fn remove_links(&self, chat_id: ChatId, targets: &[Link]) -> Result<Vec<Link>> {
        self.remove_where(chat_id, |link| {
            targets
                .iter()
                .any(|t| link.same_account(t.platform, &t.account_id))
        })
    }

    fn remove_where<F>(&self, chat_id: ChatId, matches: F) -> Result<Vec<Link>>
    where
        F: Fn(&Link) -> bool,
    {
        let mut guard = self.write();
        let Some(chat_links) = guard.get_mut(&chat_id) else {
            return Ok(Vec::new());
        };

        let (removed, kept): (Vec<Link>, Vec<Link>) =
            chat_links.drain(..).partition(|link| matches(link));
        *chat_links = kept;
        if chat_links.is_empty() {
            guard.remove(&chat_id);
        }

        if removed.is_empty() {
            return Ok(removed);
        }

        self.persist(&guard)?;
        Ok(removed)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LinkMap> {
        self.links.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LinkMap> {
        self.links.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the store file under a shared lock
    fn load(path: &Path) -> Result<LinkMap> {
        if !path.exists() {
            return Ok(LinkMap::new());
        }

        let file = File::open(path)
            .map_err(|e| RevtrackError::Persistence(format!("Failed to open link store: {}", e)))?;
        file.lock_shared().map_err(|e| {
            RevtrackError::Persistence(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut content = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut content);
        let _ = file.unlock();
        read.map_err(|e| RevtrackError::Persistence(format!("Failed to read link store: {}", e)))?;

        if content.trim().is_empty() {
            return Ok(LinkMap::new());
        }

        let raw: BTreeMap<String, ChatRecord> = serde_json::from_str(&content).map_err(|e| {
            RevtrackError::Persistence(format!("Corrupted link store {}: {}", path.display(), e))
        })?;

        let mut links = LinkMap::new();
        for (key, record) in raw {
            let chat_id: ChatId = match key.trim().parse() {
                Ok(id) => id,
                Err(_) => {
                    warn!(key = %key, "skipping link store entry with non-numeric chat id");
                    continue;
                }
            };
            let chat_links = record.into_links(chat_id);
            if !chat_links.is_empty() {
                links.insert(chat_id, dedup_accounts(chat_links));
            }
        }
        Ok(links)
    }

    /// Save using atomic write (temp file + rename) with exclusive lock.
    fn persist(&self, links: &LinkMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    RevtrackError::Persistence(format!("Failed to create store directory: {}", e))
                })?;
            }
        }

        let stored: BTreeMap<String, StoredChat> = links
            .iter()
            .filter(|(_, chat_links)| !chat_links.is_empty())
            .map(|(chat_id, chat_links)| {
                let records = chat_links
                    .iter()
                    .map(|l| LinkRecord {
                        platform: l.platform,
                        account_id: l.account_id.clone(),
                        role: l.role,
                        nickname: l.nickname.clone(),
                    })
                    .collect();
                (chat_id.to_string(), StoredChat { links: records })
            })
            .collect();

        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| RevtrackError::Persistence(format!("Serialization failed: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");

        {
            let mut file = File::create(&temp_path).map_err(|e| {
                RevtrackError::Persistence(format!("Failed to create temp file: {}", e))
            })?;
            file.write_all(content.as_bytes()).map_err(|e| {
                RevtrackError::Persistence(format!("Failed to write temp file: {}", e))
            })?;
            file.sync_all().map_err(|e| {
                RevtrackError::Persistence(format!("Failed to sync temp file: {}", e))
            })?;
        }

        let target = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| RevtrackError::Persistence(format!("Failed to open link store: {}", e)))?;

        target.lock_exclusive().map_err(|e| {
            RevtrackError::Persistence(format!("Failed to acquire write lock: {}", e))
        })?;

        let renamed = fs::rename(&temp_path, &self.path);
        let _ = target.unlock();
        renamed.map_err(|e| {
            RevtrackError::Persistence(format!("Failed to rename temp file: {}", e))
        })?;

        debug!(path = %self.path.display(), chats = stored.len(), "persisted link store");
        Ok(())
    }
}

/// Keep the first occurrence of each (platform, account_id) pair
fn dedup_accounts(links: Vec<Link>) -> Vec<Link> {
    let mut unique: Vec<Link> = Vec::with_capacity(links.len());
    for link in links {
        if !unique
            .iter()
            .any(|u| u.same_account(link.platform, &link.account_id))
        {
            unique.push(link);
        }
    }
    unique
}
