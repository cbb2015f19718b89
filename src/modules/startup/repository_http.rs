use crate::{
    api::error::ClientError,
    client::RemoteClient,
    modules::startup::{
        model::{ReviewForm, StartupFilter},
        repository::StartupRepository,
        schema::{ReviewEntity, StartupEntity},
    },
    utils::path_id,
};

#[derive(Clone)]
pub struct StartupRepositoryHttp {
    client: RemoteClient,
}

impl StartupRepositoryHttp {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl StartupRepository for StartupRepositoryHttp {
    async fn find_by_id(&self, id: &str) -> Result<StartupEntity, ClientError> {
        self.client.get(&format!("/startups/{}", path_id(id)?), &[]).await
    }

    async fn find_all(&self, filter: &StartupFilter) -> Result<Vec<StartupEntity>, ClientError> {
        self.client.get("/startups", &filter.params()).await
    }

    async fn toggle_upvote(&self, id: &str) -> Result<StartupEntity, ClientError> {
        let path = format!("/startups/{}/upvote", path_id(id)?);
        self.client.post(&path, &serde_json::json!({})).await
    }

    async fn create_review(
        &self,
        id: &str,
        review: &ReviewForm,
    ) -> Result<ReviewEntity, ClientError> {
        self.client.post(&format!("/startups/{}/reviews", path_id(id)?), review).await
    }
}
