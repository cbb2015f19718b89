use serde_json::{json, Value};

use crate::{
    api::error::ClientError,
    client::RemoteClient,
    modules::friend::{
        model::FriendRequestBody,
        repository::{FriendRepository, FriendRequestRepository},
        schema::{FriendEntity, FriendRequestEntity, FriendRequestsEntity},
    },
    utils::path_id,
};

#[derive(Clone)]
pub struct FriendRepositoryHttp {
    client: RemoteClient,
}

impl FriendRepositoryHttp {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl FriendRepository for FriendRepositoryHttp {
    async fn find_friends(&self) -> Result<Vec<FriendEntity>, ClientError> {
        self.client.get("/friends", &[]).await
    }

    async fn delete_friendship(&self, friend_id: &str) -> Result<(), ClientError> {
        let _: Value = self.client.delete(&format!("/friends/{}", path_id(friend_id)?)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl FriendRequestRepository for FriendRepositoryHttp {
    async fn find_friend_requests(&self) -> Result<FriendRequestsEntity, ClientError> {
        self.client.get("/friends/requests", &[]).await
    }

    async fn create_friend_request(
        &self,
        body: &FriendRequestBody,
    ) -> Result<FriendRequestEntity, ClientError> {
        self.client.post("/friends/requests", body).await
    }

    async fn accept_friend_request(&self, request_id: &str) -> Result<FriendEntity, ClientError> {
        let path = format!("/friends/requests/{}/accept", path_id(request_id)?);
        self.client.post(&path, &json!({})).await
    }

    async fn decline_friend_request(&self, request_id: &str) -> Result<(), ClientError> {
        let path = format!("/friends/requests/{}/decline", path_id(request_id)?);
        let _: Value = self.client.post(&path, &json!({})).await?;
        Ok(())
    }
}
