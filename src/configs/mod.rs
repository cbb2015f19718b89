use deadpool_redis::{redis::AsyncCommands, Runtime};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::{api::error::ClientError, constants::Env};

/// Persistent home of the session token, the equivalent of browser local storage.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, ClientError>;

    async fn save(&self, token: &str) -> Result<(), ClientError>;

    async fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Mutex::new(Some(token.into())) }
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.token.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

/// JSON file holding a string map, with the token stored under a fixed key.
pub struct FileSessionStore {
    path: PathBuf,
    key: String,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self { path: path.into(), key: key.into() }
    }

    async fn read_map(&self) -> Result<HashMap<String, String>, ClientError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ClientError::network(format!("Session file unreadable: {e}"))),
        }
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> Result<(), ClientError> {
        let bytes = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| ClientError::network(format!("Session file unwritable: {e}")))
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.read_map().await?.remove(&self.key))
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        let mut map = self.read_map().await?;
        map.insert(self.key.clone(), token.to_string());
        self.write_map(&map).await
    }

    async fn clear(&self) -> Result<(), ClientError> {
        let mut map = self.read_map().await?;
        if map.remove(&self.key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

pub struct RedisSessionStore {
    pool: deadpool_redis::Pool,
    key: String,
}

impl RedisSessionStore {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, ClientError> {
        let mut cfg = deadpool_redis::Config::from_url(redis_url);
        cfg.pool = Some(deadpool_redis::PoolConfig { max_size: 4, ..Default::default() });
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool, key: key.into() })
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        let mut conn = self.pool.get().await?;
        let token: Option<String> = conn.get(&self.key).await?;
        Ok(token)
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        let mut conn = self.pool.get().await?;
        conn.set::<_, _, ()>(&self.key, token).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }
}

/// Picks the session store configured in the environment: Redis, then file, then memory.
pub fn session_store_from_env(env: &Env) -> Result<Arc<dyn SessionStore>, ClientError> {
    if let Some(url) = &env.redis_url {
        log::info!("Session token persisted in Redis under `{}`", env.token_storage_key);
        return Ok(Arc::new(RedisSessionStore::new(url, env.token_storage_key.clone())?));
    }
    if let Some(path) = &env.session_file {
        log::info!("Session token persisted in {path} under `{}`", env.token_storage_key);
        return Ok(Arc::new(FileSessionStore::new(path, env.token_storage_key.clone())));
    }
    log::info!("Session token kept in memory");
    Ok(Arc::new(MemorySessionStore::new()))
}

pub fn build_http_client(env: &Env) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = env.request_timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
