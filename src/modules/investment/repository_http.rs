use crate::{
    api::error::ClientError,
    client::RemoteClient,
    modules::investment::{
        model::{CommitmentBody, CommitmentForm, StatusBody},
        repository::InvestmentRepository,
        schema::{CommitmentStatus, InvestmentCommitmentEntity},
    },
    utils::path_id,
};

#[derive(Clone)]
pub struct InvestmentRepositoryHttp {
    client: RemoteClient,
}

impl InvestmentRepositoryHttp {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl InvestmentRepository for InvestmentRepositoryHttp {
    async fn find_by_startup(
        &self,
        startup_id: &str,
    ) -> Result<Vec<InvestmentCommitmentEntity>, ClientError> {
        let path = format!("/investments/startup/{}", path_id(startup_id)?);
        self.client.get(&path, &[]).await
    }

    async fn find_mine(&self) -> Result<Vec<InvestmentCommitmentEntity>, ClientError> {
        self.client.get("/investments/me", &[]).await
    }

    async fn create(
        &self,
        startup_id: &str,
        form: &CommitmentForm,
    ) -> Result<InvestmentCommitmentEntity, ClientError> {
        self.client.post("/investments", &CommitmentBody { startup_id, form }).await
    }

    async fn update_status(
        &self,
        commitment_id: &str,
        status: CommitmentStatus,
    ) -> Result<InvestmentCommitmentEntity, ClientError> {
        let path = format!("/investments/{}/status", path_id(commitment_id)?);
        self.client.patch(&path, &StatusBody { status }).await
    }
}
