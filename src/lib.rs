use std::sync::{Arc, LazyLock};

use tokio::task::JoinHandle;

use crate::{
    api::error::ClientError,
    cache::{CacheConfig, QueryCache},
    client::RemoteClient,
    modules::{
        friend::{repository_http::FriendRepositoryHttp, service::FriendService},
        investment::{repository_http::InvestmentRepositoryHttp, service::InvestmentService},
        startup::{repository_http::StartupRepositoryHttp, service::StartupService},
        user::{repository_http::UserRepositoryHttp, service::UserService},
    },
    mutation::MutationController,
};

pub mod api;
pub mod cache;
pub mod client;
pub mod configs;
pub mod constants;
pub mod middlewares;
pub mod modules;
pub mod mutation;
pub mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    let _ = env_logger::try_init();
    match constants::Env::load() {
        Ok(env) => {
            log::info!("Environment variables loaded");
            env
        }
        Err(e) => {
            log::error!("{}; falling back to defaults", e);
            constants::Env::default()
        }
    }
});

/// Every service wired to one remote client, one cache and one mutation controller.
#[derive(Clone)]
pub struct CampusClient {
    pub remote: RemoteClient,
    pub mutations: MutationController,
    pub users: UserService<UserRepositoryHttp>,
    pub friends: FriendService<FriendRepositoryHttp>,
    pub startups: StartupService<StartupRepositoryHttp>,
    pub investments: InvestmentService<InvestmentRepositoryHttp>,
    gc: Option<Arc<JoinHandle<()>>>,
}

impl CampusClient {
    pub fn new(remote: RemoteClient, cache: QueryCache) -> Self {
        let session = remote.session().clone();
        let mutations = MutationController::new(cache);

        let users = UserService::with_dependencies(
            Arc::new(UserRepositoryHttp::new(remote.clone())),
            mutations.clone(),
            session.clone(),
        );
        let friends = FriendService::with_dependencies(
            Arc::new(FriendRepositoryHttp::new(remote.clone())),
            mutations.clone(),
            session.clone(),
        );
        let startups = StartupService::with_dependencies(
            Arc::new(StartupRepositoryHttp::new(remote.clone())),
            mutations.clone(),
            session.clone(),
        );
        let investments = InvestmentService::with_dependencies(
            Arc::new(InvestmentRepositoryHttp::new(remote.clone())),
            mutations.clone(),
            session,
        );

        CampusClient { remote, mutations, users, friends, startups, investments, gc: None }
    }

    /// Builds the client from [`ENV`]. Inside a tokio runtime this also starts periodic
    /// garbage collection of the cache, which runs until [`CampusClient::stop_gc`].
    pub fn from_env() -> Result<Self, ClientError> {
        let remote = RemoteClient::from_env(&ENV)?;
        let cache = QueryCache::new(CacheConfig::from_env(&ENV));
        let gc = cache.spawn_gc();
        let mut client = Self::new(remote, cache);
        client.gc = gc.map(Arc::new);
        Ok(client)
    }

    pub fn stop_gc(&self) {
        if let Some(gc) = &self.gc {
            gc.abort();
            log::debug!("Cache garbage collection stopped");
        }
    }

    pub fn cache(&self) -> &QueryCache {
        self.mutations.cache()
    }
}
