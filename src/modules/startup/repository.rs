use crate::{
    api::error::ClientError,
    modules::startup::{
        model::{ReviewForm, StartupFilter},
        schema::{ReviewEntity, StartupEntity},
    },
};

#[async_trait::async_trait]
pub trait StartupRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<StartupEntity, ClientError>;

    async fn find_all(&self, filter: &StartupFilter) -> Result<Vec<StartupEntity>, ClientError>;

    /// Returns the startup as the server sees it after the toggle.
    async fn toggle_upvote(&self, id: &str) -> Result<StartupEntity, ClientError>;

    async fn create_review(&self, id: &str, review: &ReviewForm)
    -> Result<ReviewEntity, ClientError>;
}
