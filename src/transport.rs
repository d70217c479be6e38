use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Friend, Message, Thread, UserId};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("gateway error: {error} ({description})")]
    Gateway { error: String, description: String },
    #[error("not logged in")]
    NotAuthenticated,
}

/// Remote operations the store relies on. Retry policy, if any, lives in the
/// implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    fn current_user_id(&self) -> UserId;

    async fn fetch_thread_list(&self, offset: usize, limit: usize) -> Result<Vec<Thread>, TransportError>;

    async fn fetch_friend_list(&self) -> Result<Vec<Friend>, TransportError>;

    async fn fetch_thread_history(
        &self,
        thread_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, TransportError>;

    async fn send_message(&self, body: &str, thread_id: &str) -> Result<(), TransportError>;
}
