//! 附件存储协作方的抽象
//!
//! 二进制内容不经过实时通道：先交给存储，拿回描述后再作为文件消息投递。

use std::collections::HashSet;

use async_trait::async_trait;
use domain::FileDescriptor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file type .{0} is not allowed")]
    ExtensionNotAllowed(String),
    #[error("file exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("empty upload")]
    Empty,
    #[error("blob store failure: {0}")]
    Backend(String),
}

/// 已清洗的上传文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub original_name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, file: UploadedFile) -> Result<FileDescriptor, StorageError>;
}

/// 上传约束：扩展名白名单与大小上限
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed_extensions: HashSet<String>,
}

impl UploadPolicy {
    pub fn new<I, S>(max_bytes: usize, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            max_bytes,
            allowed_extensions: allowed
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn check(&self, original_name: &str, bytes: Vec<u8>) -> Result<UploadedFile, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge {
                limit: self.max_bytes,
            });
        }
        let original_name = sanitize_filename(original_name);
        let extension = original_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(StorageError::ExtensionNotAllowed(extension));
        }
        Ok(UploadedFile {
            original_name,
            extension,
            bytes,
        })
    }
}

/// 去掉路径部分，只保留 `[A-Za-z0-9._-]`
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_owned()
}
