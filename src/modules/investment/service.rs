use chrono::Utc;
use std::sync::Arc;

use crate::{
    api::error::ClientError,
    cache::{fetcher, QueryKey},
    configs::SessionStore,
    modules::{
        investment::{
            model::CommitmentForm,
            repository::InvestmentRepository,
            schema::{CommitmentStatus, InvestmentCommitmentEntity},
        },
        startup::{schema::StartupEntity, service::detail_key},
    },
    mutation::{MutationController, OptimisticPlan},
    utils::{current_user_id, temp_id, IdRef},
};

pub const INVESTMENTS_ENTITY: &str = "investments";
pub const MY_INVESTMENTS_ENTITY: &str = "my_investments";

pub fn startup_commitments_key(startup_id: &str) -> QueryKey {
    QueryKey::new(INVESTMENTS_ENTITY).param("startup", startup_id)
}

pub fn my_commitments_key() -> QueryKey {
    QueryKey::new(MY_INVESTMENTS_ENTITY)
}

#[derive(Clone)]
pub struct InvestmentService<R>
where
    R: InvestmentRepository + 'static,
{
    repo: Arc<R>,
    mutations: MutationController,
    session: Arc<dyn SessionStore>,
}

impl<R> InvestmentService<R>
where
    R: InvestmentRepository + 'static,
{
    pub fn with_dependencies(
        repo: Arc<R>,
        mutations: MutationController,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        log::info!("InvestmentService initialized with dependencies");
        InvestmentService { repo, mutations, session }
    }

    pub async fn commitments_for_startup(
        &self,
        startup_id: &str,
    ) -> Result<Vec<InvestmentCommitmentEntity>, ClientError> {
        let repo = self.repo.clone();
        let owned_id = startup_id.to_string();
        let load = fetcher(move || {
            let repo = repo.clone();
            let startup_id = owned_id.clone();
            async move { repo.find_by_startup(&startup_id).await }
        });
        self.mutations.cache().fetch_query_as(startup_commitments_key(startup_id), load).await
    }

    pub async fn my_commitments(&self) -> Result<Vec<InvestmentCommitmentEntity>, ClientError> {
        let repo = self.repo.clone();
        let load = fetcher(move || {
            let repo = repo.clone();
            async move { repo.find_mine().await }
        });
        self.mutations.cache().fetch_query_as(my_commitments_key(), load).await
    }

    pub async fn commit(
        &self,
        startup_id: &str,
        form: CommitmentForm,
    ) -> Result<InvestmentCommitmentEntity, ClientError> {
        const LABEL: &str = "commit_investment";
        if let Err(e) = form.check() {
            return self.mutations.reject(LABEL, e);
        }
        let investor_id = match current_user_id(self.session.as_ref()).await {
            Ok(id) => id,
            Err(e) => return self.mutations.reject(LABEL, e),
        };

        let draft = InvestmentCommitmentEntity {
            id: temp_id(),
            startup: IdRef::from(startup_id),
            investor: IdRef::from(investor_id),
            amount: form.amount,
            milestone: form.milestone.as_deref().map(IdRef::from),
            deadline: form.deadline,
            status: CommitmentStatus::Pending,
            created_at: Some(Utc::now()),
            extra: Default::default(),
        };
        let for_startup = draft.clone();
        let plan = OptimisticPlan::new(LABEL)
            .update::<Vec<InvestmentCommitmentEntity>, _>(
                my_commitments_key(),
                move |commitments: &mut Vec<InvestmentCommitmentEntity>| {
                    commitments.push(draft.clone())
                },
            )
            .update::<Vec<InvestmentCommitmentEntity>, _>(
                startup_commitments_key(startup_id),
                move |commitments: &mut Vec<InvestmentCommitmentEntity>| {
                    commitments.push(for_startup.clone())
                },
            )
            .success_message("Investment commitment submitted");

        self.mutations.mutate(plan, self.repo.create(startup_id, &form)).await
    }

    /// Moves a pending commitment to committed or rejected. Only the startup's owner may do
    /// this; the check runs against the cached startup detail when one is loaded.
    pub async fn set_status(
        &self,
        startup_id: &str,
        commitment_id: &str,
        status: CommitmentStatus,
    ) -> Result<InvestmentCommitmentEntity, ClientError> {
        const LABEL: &str = "set_commitment_status";
        if status == CommitmentStatus::Pending {
            let err = ClientError::invalid("Status must be committed or rejected");
            return self.mutations.reject(LABEL, err);
        }
        let actor_id = match current_user_id(self.session.as_ref()).await {
            Ok(id) => id,
            Err(e) => return self.mutations.reject(LABEL, e),
        };
        if let Err(e) = self.check_transition(startup_id, commitment_id, &actor_id) {
            return self.mutations.reject(LABEL, e);
        }

        let target = commitment_id.to_string();
        let plan = OptimisticPlan::new(LABEL)
            .update::<Vec<InvestmentCommitmentEntity>, _>(
                startup_commitments_key(startup_id),
                move |commitments: &mut Vec<InvestmentCommitmentEntity>| {
                    for commitment in commitments.iter_mut().filter(|c| c.id == target) {
                        commitment.status = status;
                    }
                },
            )
            .invalidate(my_commitments_key())
            .success_message(match status {
                CommitmentStatus::Rejected => "Commitment rejected",
                _ => "Commitment accepted",
            });

        self.mutations.mutate(plan, self.repo.update_status(commitment_id, status)).await
    }

    fn check_transition(
        &self,
        startup_id: &str,
        commitment_id: &str,
        actor_id: &str,
    ) -> Result<(), ClientError> {
        let cache = self.mutations.cache();
        match cache.get_as::<StartupEntity>(&detail_key(startup_id))? {
            Some(startup) if startup.owner.is_some() && !startup.is_owned_by(actor_id) => {
                return Err(ClientError::invalid(
                    "Only the startup owner can update commitment status",
                ));
            }
            Some(_) => {}
            None => {
                log::debug!("Owner of {} not cached; leaving the check to the server", startup_id)
            }
        }

        let commitments: Vec<InvestmentCommitmentEntity> =
            cache.get_as(&startup_commitments_key(startup_id))?.unwrap_or_default();
        match commitments.iter().find(|c| c.id == commitment_id) {
            Some(c) if c.status != CommitmentStatus::Pending => {
                Err(ClientError::invalid("Only pending commitments can change status"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{CacheConfig, QueryCache},
        configs::MemorySessionStore,
        modules::investment::schema::DeadlineWindow,
        utils::test_token,
    };
    use chrono::Duration;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeInvestments {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    fn commitment(id: &str, status: &str) -> InvestmentCommitmentEntity {
        serde_json::from_value(json!({
            "_id": id,
            "startup": "s1",
            "investor": { "_id": "inv", "name": "Ivy" },
            "amount": 500.0,
            "status": status,
        }))
        .unwrap()
    }

    #[async_trait::async_trait]
    impl InvestmentRepository for FakeInvestments {
        async fn find_by_startup(
            &self,
            _startup_id: &str,
        ) -> Result<Vec<InvestmentCommitmentEntity>, ClientError> {
            Ok(vec![commitment("c1", "pending"), commitment("c2", "active")])
        }

        async fn find_mine(&self) -> Result<Vec<InvestmentCommitmentEntity>, ClientError> {
            Ok(vec![])
        }

        async fn create(
            &self,
            _startup_id: &str,
            form: &CommitmentForm,
        ) -> Result<InvestmentCommitmentEntity, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::server(500, "Could not save commitment"));
            }
            let mut created = commitment("c9", "pending");
            created.amount = form.amount;
            Ok(created)
        }

        async fn update_status(
            &self,
            commitment_id: &str,
            status: CommitmentStatus,
        ) -> Result<InvestmentCommitmentEntity, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut updated = commitment(commitment_id, "pending");
            updated.status = status;
            Ok(updated)
        }
    }

    async fn setup(actor: &str) -> (InvestmentService<FakeInvestments>, Arc<FakeInvestments>) {
        let cache = QueryCache::new(CacheConfig { auto_refetch: false, ..Default::default() });
        cache.set(detail_key("s1"), json!({ "_id": "s1", "name": "Acme", "owner": "founder" }));
        let repo =
            Arc::new(FakeInvestments { fail: AtomicBool::new(false), calls: AtomicUsize::new(0) });
        let service = InvestmentService::with_dependencies(
            repo.clone(),
            MutationController::new(cache),
            Arc::new(MemorySessionStore::with_token(test_token(actor))),
        );
        service.commitments_for_startup("s1").await.unwrap();
        service.my_commitments().await.unwrap();
        (service, repo)
    }

    #[tokio::test]
    async fn active_is_read_as_committed() {
        let (service, _repo) = setup("inv").await;
        let commitments = service.commitments_for_startup("s1").await.unwrap();
        assert_eq!(commitments[1].status, CommitmentStatus::Committed);
    }

    #[tokio::test]
    async fn invalid_commitments_never_reach_the_server() {
        let (service, repo) = setup("inv").await;
        let now = Utc::now();

        let err = service
            .commit("s1", CommitmentForm { amount: 0.0, milestone: None, deadline: None })
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Amount must be greater than zero");

        let backwards = DeadlineWindow { start: now, end: now - Duration::days(1) };
        let err = service
            .commit(
                "s1",
                CommitmentForm { amount: 10.0, milestone: None, deadline: Some(backwards) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation { .. }));
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_commit_restores_both_lists() {
        let (service, repo) = setup("inv").await;
        repo.fail.store(true, Ordering::SeqCst);

        let form = CommitmentForm { amount: 250.0, milestone: Some("m1".into()), deadline: None };
        assert!(service.commit("s1", form).await.is_err());

        let cache = service.mutations.cache();
        let mine: Vec<InvestmentCommitmentEntity> =
            cache.get_as(&my_commitments_key()).unwrap().unwrap();
        let for_startup: Vec<InvestmentCommitmentEntity> =
            cache.get_as(&startup_commitments_key("s1")).unwrap().unwrap();
        assert!(mine.is_empty());
        assert_eq!(for_startup.len(), 2);
    }

    #[tokio::test]
    async fn only_the_owner_changes_pending_commitments() {
        let (service, repo) = setup("inv").await;
        let err = service.set_status("s1", "c1", CommitmentStatus::Committed).await.unwrap_err();
        assert_eq!(err.user_message(), "Only the startup owner can update commitment status");
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);

        let (service, repo) = setup("founder").await;
        let err = service.set_status("s1", "c2", CommitmentStatus::Rejected).await.unwrap_err();
        assert_eq!(err.user_message(), "Only pending commitments can change status");
        let err = service.set_status("s1", "c1", CommitmentStatus::Pending).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation { .. }));
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);

        let updated = service.set_status("s1", "c1", CommitmentStatus::Rejected).await.unwrap();
        assert_eq!(updated.status, CommitmentStatus::Rejected);
        let cached: Vec<InvestmentCommitmentEntity> =
            service.mutations.cache().get_as(&startup_commitments_key("s1")).unwrap().unwrap();
        assert_eq!(cached[0].status, CommitmentStatus::Rejected);
    }
}
