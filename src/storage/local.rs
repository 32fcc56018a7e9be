use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::fs;

use super::BlobStore;

/// Blob store backed by a local directory and served under `/cache`.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
    base_url: String,
}

impl LocalFileStorage {
    pub fn new(base_dir: PathBuf, base_url: String) -> Self {
        Self { base_dir, base_url }
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    pub fn get_public_url(&self, key: &str) -> String {
        let base = normalize_base_url(&self.base_url);
        let key = key.trim_start_matches('/');
        format!("{base}/{key}")
    }

    pub fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let normalized = Path::new(key.trim_start_matches('/'));
        if normalized
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            bail!("invalid storage key: {key}");
        }
        Ok(self.base_dir.join(normalized))
    }
}

#[async_trait]
impl BlobStore for LocalFileStorage {
    async fn store(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        self.put(path, bytes).await?;
        tracing::debug!(path, content_type, size = bytes.len(), "stored blob locally");
        Ok(self.get_public_url(path))
    }
}

/// Trim trailing slashes and collapse doubled schemes such as
/// `http://https://host` that come from pasting a full URL into `DOMAIN`.
pub fn normalize_base_url(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    loop {
        let collapsed = if base.starts_with("http://http://") {
            base.replacen("http://http://", "http://", 1)
        } else if base.starts_with("https://https://") {
            base.replacen("https://https://", "https://", 1)
        } else if base.starts_with("http://https://") {
            base.replacen("http://https://", "https://", 1)
        } else if base.starts_with("https://http://") {
            base.replacen("https://http://", "http://", 1)
        } else {
            break;
        };
        base = collapsed;
    }
    base
}
