//! Download tokens: opaque handles mapping to server-local files for deferred retrieval.
//!
//! Entries are only ever added. Tokens do not expire and are not revoked on lookup, so a
//! token can be fetched any number of times for the life of the process.

use base64::Engine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Path prefix under which a transport serves downloads (`/download/<token>`).
pub const DOWNLOAD_PATH_PREFIX: &str = "/download/";

const TOKEN_BYTES: usize = 24;

#[derive(Default)]
pub struct DownloadStore {
    inner: RwLock<HashMap<String, PathBuf>>,
}

impl DownloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return a fresh token for it. Existing tokens are never overwritten.
    pub async fn create(&self, file_path: impl AsRef<Path>) -> String {
        let path = file_path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let mut g = self.inner.write().await;
        let token = loop {
            let candidate = new_token();
            if !g.contains_key(&candidate) {
                break candidate;
            }
        };
        log::debug!("downloads: {} -> {}", token, path.display());
        g.insert(token.clone(), path);
        token
    }

    pub async fn lookup(&self, token: &str) -> Option<PathBuf> {
        self.inner.read().await.get(token).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Relative link a reply can carry for a token.
pub fn download_link(token: &str) -> String {
    format!("{}{}", DOWNLOAD_PATH_PREFIX, token)
}

fn new_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf),
        Err(e) => {
            log::warn!("downloads: os randomness unavailable ({}), using uuid", e);
            uuid::Uuid::new_v4().simple().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_token_is_absent() {
        let store = DownloadStore::new();
        assert_eq!(store.lookup("never-issued").await, None);
        store.create("/tmp/report.csv").await;
        assert_eq!(store.lookup("never-issued").await, None);
    }

    #[tokio::test]
    async fn issued_token_is_stable_across_lookups() {
        let store = DownloadStore::new();
        let token = store.create("/tmp/report.csv").await;
        let first = store.lookup(&token).await;
        assert_eq!(first, Some(PathBuf::from("/tmp/report.csv")));
        assert_eq!(store.lookup(&token).await, first);
        assert_eq!(store.lookup(&token).await, first);
    }

    #[tokio::test]
    async fn same_file_gets_distinct_tokens() {
        let store = DownloadStore::new();
        let a = store.create("/tmp/a.txt").await;
        let b = store.create("/tmp/a.txt").await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
        assert!(!a.contains('/') && !a.contains('+'));
    }

    #[tokio::test]
    async fn relative_paths_are_made_absolute() {
        let store = DownloadStore::new();
        let token = store.create("out/data.json").await;
        assert!(store.lookup(&token).await.unwrap().is_absolute());
        assert_eq!(download_link(&token), format!("/download/{}", token));
    }
}
