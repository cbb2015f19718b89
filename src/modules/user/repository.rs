use crate::{
    api::error::ClientError,
    modules::user::{
        model::{PremiumPurchase, ProfileForm, SignInModel},
        schema::{AuthEntity, ChatTokenEntity, UserEntity},
    },
};

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn sign_in(&self, credentials: &SignInModel) -> Result<AuthEntity, ClientError>;

    async fn find_me(&self) -> Result<UserEntity, ClientError>;

    async fn update_me(&self, form: &ProfileForm) -> Result<UserEntity, ClientError>;

    async fn purchase_premium(&self, purchase: &PremiumPurchase)
    -> Result<UserEntity, ClientError>;

    /// Token for the chat and video SDK. It must never replace the session token.
    async fn chat_token(&self) -> Result<ChatTokenEntity, ClientError>;
}
