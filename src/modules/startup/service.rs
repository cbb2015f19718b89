use chrono::Utc;
use serde_json::Map;
use std::sync::Arc;

use crate::{
    api::error::ClientError,
    cache::{fetcher, QueryKey},
    configs::SessionStore,
    modules::startup::{
        model::{ReviewForm, StartupFilter},
        repository::StartupRepository,
        schema::{ReviewEntity, StartupEntity},
    },
    mutation::{MutationController, OptimisticPlan},
    utils::{current_user_id, temp_id, validate_form, IdRef},
};

pub const STARTUP_ENTITY: &str = "startup";
pub const STARTUPS_ENTITY: &str = "startups";

pub fn detail_key(id: &str) -> QueryKey {
    QueryKey::new(STARTUP_ENTITY).param("id", id)
}

#[derive(Clone)]
pub struct StartupService<R>
where
    R: StartupRepository + 'static,
{
    repo: Arc<R>,
    mutations: MutationController,
    session: Arc<dyn SessionStore>,
}

impl<R> StartupService<R>
where
    R: StartupRepository + 'static,
{
    pub fn with_dependencies(
        repo: Arc<R>,
        mutations: MutationController,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        log::info!("StartupService initialized with dependencies");
        StartupService { repo, mutations, session }
    }

    pub async fn get_startup(&self, id: &str) -> Result<StartupEntity, ClientError> {
        let repo = self.repo.clone();
        let startup_id = id.to_string();
        let load = fetcher(move || {
            let repo = repo.clone();
            let startup_id = startup_id.clone();
            async move { repo.find_by_id(&startup_id).await }
        });
        self.mutations.cache().fetch_query_as(detail_key(id), load).await
    }

    /// Last cached detail, without touching the network.
    pub fn cached_startup(&self, id: &str) -> Result<Option<StartupEntity>, ClientError> {
        self.mutations.cache().get_as(&detail_key(id))
    }

    pub async fn list_startups(
        &self,
        filter: StartupFilter,
    ) -> Result<Vec<StartupEntity>, ClientError> {
        let key = filter.key();
        let repo = self.repo.clone();
        let load = fetcher(move || {
            let repo = repo.clone();
            let filter = filter.clone();
            async move { repo.find_all(&filter).await }
        });
        self.mutations.cache().fetch_query_as(key, load).await
    }

    /// Upvotes or removes the upvote depending on what the cache currently shows for the
    /// signed-in user. The detail and every cached listing are updated together.
    pub async fn toggle_upvote(&self, id: &str) -> Result<StartupEntity, ClientError> {
        const LABEL: &str = "toggle_upvote";
        let user_id = match current_user_id(self.session.as_ref()).await {
            Ok(user_id) => user_id,
            Err(e) => return self.mutations.reject(LABEL, e),
        };

        let plan = OptimisticPlan::new(LABEL)
            .update::<StartupEntity, _>(detail_key(id), {
                let user_id = user_id.clone();
                move |startup: &mut StartupEntity| {
                    startup.toggle_upvote(&user_id);
                }
            })
            .update_entity::<Vec<StartupEntity>, _>(STARTUPS_ENTITY, {
                let startup_id = id.to_string();
                move |startups: &mut Vec<StartupEntity>| {
                    for startup in startups.iter_mut().filter(|s| s.id == startup_id) {
                        startup.toggle_upvote(&user_id);
                    }
                }
            });

        self.mutations.mutate(plan, self.repo.toggle_upvote(id)).await
    }

    pub async fn add_review(
        &self,
        id: &str,
        mut form: ReviewForm,
    ) -> Result<ReviewEntity, ClientError> {
        const LABEL: &str = "add_review";
        form.comment = form.comment.trim().to_string();
        if let Err(e) = validate_form(&form) {
            return self.mutations.reject(LABEL, e);
        }
        let user_id = match current_user_id(self.session.as_ref()).await {
            Ok(user_id) => user_id,
            Err(e) => return self.mutations.reject(LABEL, e),
        };

        let draft = ReviewEntity {
            id: temp_id(),
            user: Some(IdRef::from(user_id)),
            rating: form.rating,
            comment: form.comment.clone(),
            created_at: Some(Utc::now()),
            extra: Map::new(),
        };
        let plan = OptimisticPlan::new(LABEL)
            .update::<StartupEntity, _>(detail_key(id), move |startup: &mut StartupEntity| {
                startup.reviews.push(draft.clone());
            })
            .success_message("Review posted");

        self.mutations.mutate(plan, self.repo.create_review(id, &form)).await
    }
}
