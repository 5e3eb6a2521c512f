use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Object storage for uploaded images
///
/// Write-only from the application's point of view; stored objects are
/// served back over HTTP by the static file layer.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, name: &str, data: &[u8]) -> Result<()>;
}

/// Filesystem-backed object store, one flat directory of uploads
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create upload directory {}", root.display()))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.root.join(name);
        fs::write(&path, data)
            .await
            .with_context(|| format!("failed to write object {}", path.display()))?;
        Ok(())
    }
}
