use domain::{DomainError, ProtocolError, RepositoryError};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("authentication required")]
    Authentication,
    #[error("observer {observer} failed: {message}")]
    Observer { observer: String, message: String },
}

impl ApplicationError {
    /// 拒绝类错误在实时协议里是静默的空操作
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            ApplicationError::Authentication
                | ApplicationError::Domain(DomainError::PermissionDenied { .. })
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApplicationError::Domain(DomainError::RoomNotFound | DomainError::CallNotFound)
                | ApplicationError::Repository(RepositoryError::NotFound)
        )
    }
}
