use reqwest::Method;

use crate::{
    api::error::ClientError,
    client::{RemoteClient, RequestOptions},
    modules::user::{
        model::{PremiumPurchase, ProfileForm, SignInModel},
        repository::UserRepository,
        schema::{AuthEntity, ChatTokenEntity, UserEntity},
    },
};

#[derive(Clone)]
pub struct UserRepositoryHttp {
    client: RemoteClient,
}

impl UserRepositoryHttp {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl UserRepository for UserRepositoryHttp {
    async fn sign_in(&self, credentials: &SignInModel) -> Result<AuthEntity, ClientError> {
        self.client.post("/auth/login", credentials).await
    }

    async fn find_me(&self) -> Result<UserEntity, ClientError> {
        self.client.get("/users/me", &[]).await
    }

    async fn update_me(&self, form: &ProfileForm) -> Result<UserEntity, ClientError> {
        self.client.patch("/users/me", form).await
    }

    async fn purchase_premium(
        &self,
        purchase: &PremiumPurchase,
    ) -> Result<UserEntity, ClientError> {
        self.client.post("/payments/premium", purchase).await
    }

    async fn chat_token(&self) -> Result<ChatTokenEntity, ClientError> {
        let options = RequestOptions { skip_token_capture: true };
        self.client
            .request_with(Method::GET, "/stream/token", None::<&()>, None, options)
            .await
    }
}
