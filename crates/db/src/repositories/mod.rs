use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use coverwise_core::domain::product::ProductKind;
use coverwise_core::domain::session::{CollectedInfo, ContextUpdate, Session, SessionId, Stage};
use coverwise_core::errors::ApplicationError;

pub mod memory;

pub use memory::InMemorySessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Per-session state shared by every product flow in a conversation.
///
/// Reads of an unknown session behave as if an empty session existed.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get_session(&self, id: &SessionId) -> Result<Session, RepositoryError>;

    async fn get_collected_info(
        &self,
        id: &SessionId,
        product: ProductKind,
    ) -> Result<CollectedInfo, RepositoryError>;

    async fn get_all_collected_info(
        &self,
        id: &SessionId,
    ) -> Result<BTreeMap<ProductKind, CollectedInfo>, RepositoryError>;

    async fn set_collected_info(
        &self,
        id: &SessionId,
        product: ProductKind,
        info: CollectedInfo,
    ) -> Result<(), RepositoryError>;

    async fn set_stage(
        &self,
        id: &SessionId,
        product: ProductKind,
        stage: Stage,
    ) -> Result<(), RepositoryError>;

    async fn update_conversation_context(
        &self,
        id: &SessionId,
        update: ContextUpdate,
    ) -> Result<(), RepositoryError>;
}
