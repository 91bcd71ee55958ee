use super::moderation_models::{Comment, Site, User};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Comment {0} not found")]
    NotFound(u64),
}

/// Persistence collaborators the moderation pipeline needs.
///
/// The pipeline only reads users and sites and only writes back the
/// `content` and `is_pending` fields of a comment.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Persist the comment's current content and pending flag.
    async fn update_comment(&self, comment: &Comment) -> Result<(), StoreError>;

    /// Resolve the author of a comment.
    async fn fetch_user_for_comment(&self, comment: &Comment) -> Result<User, StoreError>;

    /// Look up a site by name. `None` when no such site exists.
    async fn find_site(&self, name: &str) -> Result<Option<Site>, StoreError>;

    async fn find_comment(&self, id: u64) -> Result<Option<Comment>, StoreError>;
}

// The composition root shares one store between the service and the CLI.
#[async_trait]
impl<T: CommentStore + ?Sized> CommentStore for Arc<T> {
    async fn update_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        (**self).update_comment(comment).await
    }

    async fn fetch_user_for_comment(&self, comment: &Comment) -> Result<User, StoreError> {
        (**self).fetch_user_for_comment(comment).await
    }

    async fn find_site(&self, name: &str) -> Result<Option<Site>, StoreError> {
        (**self).find_site(name).await
    }

    async fn find_comment(&self, id: u64) -> Result<Option<Comment>, StoreError> {
        (**self).find_comment(id).await
    }
}
