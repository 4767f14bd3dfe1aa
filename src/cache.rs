// Poster cache: key normalization plus the two-tier (memory, disk) store.
// Disk layout is a single directory of <normalized_key>.jpg blobs.

use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Token used when normalization strips a title down to nothing.
const EMPTY_KEY_TOKEN: &str = "untitled";

/// Derive the cache key for a title and optional catalog id.
///
/// Deterministic and total: lowercase, drop everything outside word
/// characters / dash / underscore / dot / space, collapse whitespace runs to
/// a single underscore, collapse repeated underscores, trim underscores at
/// both ends. The result doubles as the on-disk filename stem, so it never
/// contains path separators and is never empty.
pub fn normalize_key(title: &str, id: Option<i64>) -> String {
    let mut key = String::with_capacity(title.len());

    for ch in title.to_lowercase().chars() {
        let mapped = if ch.is_whitespace() {
            '_'
        } else if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            ch
        } else {
            continue;
        };
        if mapped == '_' && key.ends_with('_') {
            continue;
        }
        key.push(mapped);
    }

    let mut key = key.trim_matches('_').to_string();
    if key.is_empty() {
        key.push_str(EMPTY_KEY_TOKEN);
    }
    if let Some(id) = id {
        key.push('_');
        key.push_str(&id.to_string());
    }
    key
}

/// Two-tier poster store. The single source of truth for "already resolved":
/// memory first, disk second, with disk as the durable tier.
pub struct CacheStore {
    dir: PathBuf,
    memory: Mutex<HashMap<String, Bytes>>,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.jpg"))
    }

    /// Look up a key, memory tier first. A disk hit populates the memory
    /// tier before returning.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        {
            let memory = self.memory.lock().await;
            if let Some(bytes) = memory.get(key) {
                tracing::debug!(key, "poster cache hit (memory)");
                return Some(bytes.clone());
            }
        }

        let path = self.entry_path(key);
        match fs::read(&path).await {
            Ok(data) => {
                let bytes = Bytes::from(data);
                tracing::debug!(key, path = %path.display(), "poster cache hit (disk)");
                self.memory.lock().await.insert(key.to_string(), bytes.clone());
                Some(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::debug!(key, "poster cache read failed: {e}");
                None
            }
        }
    }

    /// Write an entry, disk first so a concurrent reader never sees a memory
    /// hit without a durable disk copy. A disk write failure leaves the
    /// entry uncached; the caller still has the bytes for this request.
    pub async fn put(&self, key: &str, bytes: &Bytes) {
        if let Err(e) = fs::create_dir_all(&self.dir).await {
            tracing::warn!(dir = %self.dir.display(), "could not create poster cache dir: {e}");
            return;
        }

        let path = self.entry_path(key);
        if let Err(e) = fs::write(&path, bytes).await {
            tracing::warn!(key, path = %path.display(), "poster cache write failed, entry not cached: {e}");
            return;
        }

        self.memory.lock().await.insert(key.to_string(), bytes.clone());
        tracing::debug!(key, size = bytes.len(), "poster cached");
    }
}
