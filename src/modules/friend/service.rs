use std::sync::Arc;

use crate::{
    api::error::ClientError,
    cache::{fetcher, QueryKey},
    configs::SessionStore,
    modules::friend::{
        model::FriendRequestBody,
        repository::FriendRepo,
        schema::{FriendEntity, FriendRequestEntity, FriendRequestStatus, FriendRequestsEntity},
    },
    mutation::{MutationController, OptimisticPlan},
    utils::{current_user_id, temp_id, validate_form, IdRef},
};

pub const FRIENDS_ENTITY: &str = "friends";
pub const FRIEND_REQUESTS_ENTITY: &str = "friend_requests";

pub fn friends_key() -> QueryKey {
    QueryKey::new(FRIENDS_ENTITY)
}

pub fn friend_requests_key() -> QueryKey {
    QueryKey::new(FRIEND_REQUESTS_ENTITY)
}

#[derive(Clone)]
pub struct FriendService<R>
where
    R: FriendRepo + 'static,
{
    friend_repo: Arc<R>,
    mutations: MutationController,
    session: Arc<dyn SessionStore>,
}

impl<R> FriendService<R>
where
    R: FriendRepo + 'static,
{
    pub fn with_dependencies(
        friend_repo: Arc<R>,
        mutations: MutationController,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        log::info!("FriendService initialized with dependencies");
        FriendService { friend_repo, mutations, session }
    }

    pub async fn get_friends(&self) -> Result<Vec<FriendEntity>, ClientError> {
        let repo = self.friend_repo.clone();
        let load = fetcher(move || {
            let repo = repo.clone();
            async move { repo.find_friends().await }
        });
        self.mutations.cache().fetch_query_as(friends_key(), load).await
    }

    pub async fn get_friend_requests(&self) -> Result<FriendRequestsEntity, ClientError> {
        let repo = self.friend_repo.clone();
        let load = fetcher(move || {
            let repo = repo.clone();
            async move { repo.find_friend_requests().await }
        });
        self.mutations.cache().fetch_query_as(friend_requests_key(), load).await
    }

    /// Checks against what is cached; the server still has the final say.
    fn check_can_request(&self, sender_id: &str, recipient_id: &str) -> Result<(), ClientError> {
        if sender_id == recipient_id {
            return Err(ClientError::invalid("Cannot send friend request to yourself"));
        }

        let cache = self.mutations.cache();
        let friends: Vec<FriendEntity> = cache.get_as(&friends_key())?.unwrap_or_default();
        if friends.iter().any(|f| f.id == recipient_id) {
            return Err(ClientError::invalid("Users are already friends"));
        }

        let requests: FriendRequestsEntity =
            cache.get_as(&friend_requests_key())?.unwrap_or_default();
        if requests.has_pending(sender_id, recipient_id) {
            return Err(ClientError::invalid("Friend request already exists"));
        }
        Ok(())
    }

    pub async fn send_friend_request(
        &self,
        recipient_id: &str,
        message: Option<String>,
    ) -> Result<FriendRequestEntity, ClientError> {
        const LABEL: &str = "send_friend_request";
        let body = FriendRequestBody { recipient_id: recipient_id.trim().to_string(), message };
        if let Err(e) = validate_form(&body) {
            return self.mutations.reject(LABEL, e);
        }
        let sender_id = match current_user_id(self.session.as_ref()).await {
            Ok(id) => id,
            Err(e) => return self.mutations.reject(LABEL, e),
        };
        if let Err(e) = self.check_can_request(&sender_id, &body.recipient_id) {
            return self.mutations.reject(LABEL, e);
        }

        let draft = FriendRequestEntity {
            id: temp_id(),
            sender: IdRef::from(sender_id),
            recipient: IdRef::from(body.recipient_id.as_str()),
            status: FriendRequestStatus::Pending,
            message: body.message.clone(),
            created_at: Some(chrono::Utc::now()),
            extra: Default::default(),
        };
        let plan = OptimisticPlan::new(LABEL)
            .update::<FriendRequestsEntity, _>(
                friend_requests_key(),
                move |requests: &mut FriendRequestsEntity| requests.outgoing.push(draft.clone()),
            )
            .success_message("Friend request sent");

        self.mutations.mutate(plan, self.friend_repo.create_friend_request(&body)).await
    }

    /// Drops the request from the pending set and adds its sender to the friend list.
    pub async fn accept_friend_request(
        &self,
        request_id: &str,
    ) -> Result<FriendEntity, ClientError> {
        let requests: Option<FriendRequestsEntity> =
            self.mutations.cache().get_as(&friend_requests_key())?;
        let sender = requests
            .as_ref()
            .and_then(|r| r.find_incoming(request_id))
            .map(|r| FriendEntity::from(&r.sender));

        let accepted_id = request_id.to_string();
        let mut plan = OptimisticPlan::new("accept_friend_request")
            .update::<FriendRequestsEntity, _>(
                friend_requests_key(),
                move |requests: &mut FriendRequestsEntity| {
                    requests.incoming.retain(|r| r.id != accepted_id);
                },
            );
        plan = match sender {
            Some(sender) => plan.update::<Vec<FriendEntity>, _>(
                friends_key(),
                move |friends: &mut Vec<FriendEntity>| {
                    if !friends.iter().any(|f| f.id == sender.id) {
                        friends.push(sender.clone());
                    }
                },
            ),
            None => plan.invalidate(friends_key()),
        };
        let plan = plan.success_message("Friend request accepted");

        self.mutations.mutate(plan, self.friend_repo.accept_friend_request(request_id)).await
    }

    pub async fn decline_friend_request(&self, request_id: &str) -> Result<(), ClientError> {
        let declined_id = request_id.to_string();
        let plan = OptimisticPlan::new("decline_friend_request").update::<FriendRequestsEntity, _>(
            friend_requests_key(),
            move |requests: &mut FriendRequestsEntity| {
                requests.incoming.retain(|r| r.id != declined_id);
            },
        );
        self.mutations.mutate(plan, self.friend_repo.decline_friend_request(request_id)).await
    }

    pub async fn remove_friend(&self, friend_id: &str) -> Result<(), ClientError> {
        let removed_id = friend_id.to_string();
        let plan = OptimisticPlan::new("remove_friend").update::<Vec<FriendEntity>, _>(
            friends_key(),
            move |friends: &mut Vec<FriendEntity>| friends.retain(|f| f.id != removed_id),
        );
        self.mutations.mutate(plan, self.friend_repo.delete_friendship(friend_id)).await
    }
}
