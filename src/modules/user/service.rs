use log::info;
use std::sync::Arc;

use crate::{
    api::error::ClientError,
    cache::{fetcher, QueryKey},
    configs::SessionStore,
    modules::user::{
        model::{PremiumPlan, PremiumPurchase, ProfileForm, SignInModel},
        repository::UserRepository,
        schema::{ChatSession, UserEntity},
    },
    mutation::{MutationController, OptimisticPlan},
    utils::validate_form,
};

pub const PROFILE_ENTITY: &str = "profile";

pub fn profile_key() -> QueryKey {
    QueryKey::new(PROFILE_ENTITY)
}

#[derive(Clone)]
pub struct UserService<R>
where
    R: UserRepository + 'static,
{
    repo: Arc<R>,
    mutations: MutationController,
    session: Arc<dyn SessionStore>,
}

impl<R> UserService<R>
where
    R: UserRepository + 'static,
{
    pub fn with_dependencies(
        repo: Arc<R>,
        mutations: MutationController,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        info!("UserService initialized with dependencies");
        UserService { repo, mutations, session }
    }

    pub async fn profile(&self) -> Result<UserEntity, ClientError> {
        let repo = self.repo.clone();
        let load = fetcher(move || {
            let repo = repo.clone();
            async move { repo.find_me().await }
        });
        self.mutations.cache().fetch_query_as(profile_key(), load).await
    }

    /// Signs in and seeds the profile. Anything cached for a previous user is dropped.
    pub async fn sign_in(&self, credentials: SignInModel) -> Result<UserEntity, ClientError> {
        const LABEL: &str = "sign_in";
        if let Err(e) = validate_form(&credentials) {
            return self.mutations.reject(LABEL, e);
        }
        let auth = match self.repo.sign_in(&credentials).await {
            Ok(auth) => auth,
            Err(e) => {
                log::warn!("Sign in failed: {}", e);
                self.mutations.notify_error(LABEL, &e, false);
                return Err(e);
            }
        };

        let cache = self.mutations.cache();
        cache.clear();
        cache.set_as(profile_key(), &auth.user)?;
        info!("User {} signed in", auth.user.id);
        Ok(auth.user)
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.session.clear().await?;
        self.mutations.cache().clear();
        info!("Signed out; session and cache cleared");
        Ok(())
    }

    pub async fn update_profile(&self, form: ProfileForm) -> Result<UserEntity, ClientError> {
        const LABEL: &str = "update_profile";
        if form.is_empty() {
            return self.mutations.reject(LABEL, ClientError::invalid("No fields to update"));
        }
        if let Err(e) = validate_form(&form) {
            return self.mutations.reject(LABEL, e);
        }

        let changes = form.clone();
        let plan = OptimisticPlan::new(LABEL)
            .update::<UserEntity, _>(profile_key(), move |user: &mut UserEntity| {
                if let Some(name) = &changes.name {
                    user.name = name.clone();
                }
                if let Some(bio) = &changes.bio {
                    user.bio = Some(bio.clone());
                }
                if let Some(avatar) = &changes.avatar {
                    user.avatar = Some(avatar.clone());
                }
            })
            .success_message("Profile updated");

        self.mutations.mutate(plan, self.repo.update_me(&form)).await
    }

    pub async fn purchase_premium(&self, plan: PremiumPlan) -> Result<UserEntity, ClientError> {
        let optimistic = OptimisticPlan::new("purchase_premium")
            .update::<UserEntity, _>(profile_key(), |user: &mut UserEntity| user.is_premium = true)
            .success_message("Premium activated");

        let purchase = PremiumPurchase { plan };
        self.mutations.mutate(optimistic, self.repo.purchase_premium(&purchase)).await
    }

    /// Token and identity for the chat and video SDK. Only premium members get one.
    pub async fn chat_session(&self) -> Result<ChatSession, ClientError> {
        const LABEL: &str = "chat_session";
        let user = match self.profile().await {
            Ok(user) => user,
            Err(e) => {
                self.mutations.notify_error(LABEL, &e, true);
                return Err(e);
            }
        };
        if !user.is_premium {
            let err = ClientError::invalid("Chat and video calls require a premium membership");
            return self.mutations.reject(LABEL, err);
        }

        match self.repo.chat_token().await {
            Ok(chat) => Ok(ChatSession {
                token: chat.token,
                user_id: user.id.clone(),
                display_name: user.display_name().to_string(),
                avatar_url: user.avatar.clone(),
            }),
            Err(e) => {
                log::warn!("Could not establish a chat session: {}", e);
                self.mutations.notify_error(LABEL, &e, true);
                Err(e)
            }
        }
    }
}
