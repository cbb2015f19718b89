use crate::{
    api::error::ClientError,
    modules::friend::{
        model::FriendRequestBody,
        schema::{FriendEntity, FriendRequestEntity, FriendRequestsEntity},
    },
};

#[async_trait::async_trait]
pub trait FriendRepository: Send + Sync {
    async fn find_friends(&self) -> Result<Vec<FriendEntity>, ClientError>;

    async fn delete_friendship(&self, friend_id: &str) -> Result<(), ClientError>;
}

#[async_trait::async_trait]
pub trait FriendRequestRepository: Send + Sync {
    async fn find_friend_requests(&self) -> Result<FriendRequestsEntity, ClientError>;

    async fn create_friend_request(
        &self,
        body: &FriendRequestBody,
    ) -> Result<FriendRequestEntity, ClientError>;

    /// Returns the sender, now a friend.
    async fn accept_friend_request(&self, request_id: &str) -> Result<FriendEntity, ClientError>;

    async fn decline_friend_request(&self, request_id: &str) -> Result<(), ClientError>;
}

pub trait FriendRepo: FriendRepository + FriendRequestRepository {}

impl<T: FriendRepository + FriendRequestRepository> FriendRepo for T {}
