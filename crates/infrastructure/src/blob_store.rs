//! 本地磁盘附件存储
//!
//! 文件以 `{uuid}.{ext}` 命名写入上传目录，对外只暴露公开 URL，
//! 原始文件名只保留在描述里。

use std::path::PathBuf;

use application::storage::{BlobStore, StorageError, UploadedFile};
use async_trait::async_trait;
use domain::FileDescriptor;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, file: UploadedFile) -> Result<FileDescriptor, StorageError> {
        let stored_name = format!("{}.{}", Uuid::new_v4(), file.extension);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StorageError::Backend(err.to_string()))?;
        let path = self.root.join(&stored_name);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|err| StorageError::Backend(err.to_string()))?;

        tracing::debug!(path = %path.display(), bytes = file.bytes.len(), "附件写入磁盘");
        Ok(FileDescriptor {
            url: format!("{}/{stored_name}", self.public_base_url),
            filename: file.original_name,
            extension: file.extension,
        })
    }
}
