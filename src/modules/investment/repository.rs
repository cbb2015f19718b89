use crate::{
    api::error::ClientError,
    modules::investment::{
        model::CommitmentForm,
        schema::{CommitmentStatus, InvestmentCommitmentEntity},
    },
};

#[async_trait::async_trait]
pub trait InvestmentRepository: Send + Sync {
    async fn find_by_startup(
        &self,
        startup_id: &str,
    ) -> Result<Vec<InvestmentCommitmentEntity>, ClientError>;

    async fn find_mine(&self) -> Result<Vec<InvestmentCommitmentEntity>, ClientError>;

    async fn create(
        &self,
        startup_id: &str,
        form: &CommitmentForm,
    ) -> Result<InvestmentCommitmentEntity, ClientError>;

    async fn update_status(
        &self,
        commitment_id: &str,
        status: CommitmentStatus,
    ) -> Result<InvestmentCommitmentEntity, ClientError>;
}
