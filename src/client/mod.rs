use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::{
    api::{
        error::{ClientError, ErrorBody},
        success::unwrap_envelope,
    },
    configs::{build_http_client, session_store_from_env, SessionStore},
    constants::Env,
    middlewares::{attach_bearer, capture_token, prune_empty_entities},
    utils::SessionClaims,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Leave the stored session alone even if the body carries a `token`.
    pub skip_token_capture: bool,
}

/// Typed wrapper around the REST backend. Attaches the session bearer, rotates the stored token,
/// and classifies failures.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionStore>,
}

impl RemoteClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        RemoteClient { http, base_url, session }
    }

    pub fn from_env(env: &Env) -> Result<Self, ClientError> {
        let http = build_http_client(env)?;
        let session = session_store_from_env(env)?;
        Ok(Self::new(http, env.api_base_url.clone(), session))
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<T>(&self, path: &str, params: &[(&str, String)]) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, path, None::<&()>, Some(params)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body), None).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body), None).await
    }

    pub async fn delete<T>(&self, path: &str) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        self.request(Method::DELETE, path, None::<&()>, None).await
    }

    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        params: Option<&[(&str, String)]>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_with(method, path, body, params, RequestOptions::default()).await
    }

    pub async fn request_with<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        params: Option<&[(&str, String)]>,
        options: RequestOptions,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let token = self.session.load().await?;

        if let Some(claims) = token.as_deref().and_then(SessionClaims::peek) {
            if claims.is_expired() {
                log::debug!("Sending a session token that has already expired locally");
            }
        }

        let mut builder = self.http.request(method.clone(), &url);
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder = attach_bearer(builder, token.as_deref());

        log::debug!("{} {}", method, url);
        let response = builder.send().await.map_err(|e| {
            log::warn!("{} {} failed before a response: {:?}", method, url, e);
            ClientError::Network(e.to_string().into())
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| ClientError::Network(e.to_string().into()))?;

        let mut payload: Value = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(_) if !status.is_success() => {
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                Err(e) => {
                    log::error!("{} {} returned a non-JSON body: {:?}", method, url, e);
                    return Err(ClientError::server(
                        status.as_u16(),
                        "Malformed response from server",
                    ));
                }
            }
        };

        if !status.is_success() {
            let err = ClientError::from_response(status.as_u16(), ErrorBody::from_value(&payload));
            if err.is_authentication() {
                log::info!("Clearing stored session after {}: {}", status, err);
                if let Err(clear_err) = self.session.clear().await {
                    log::error!("Failed to clear stored session: {:?}", clear_err);
                }
            } else {
                log::debug!("{} {} rejected with {}: {}", method, url, status, err);
            }
            return Err(err);
        }

        if !options.skip_token_capture {
            if let Some(fresh) = capture_token(&payload) {
                if token.as_deref() != Some(fresh) {
                    self.session.save(fresh).await?;
                    log::info!("Session token rotated by {} {}", method, path);
                }
            }
        }

        prune_empty_entities(&mut payload);
        serde_json::from_value(unwrap_envelope(payload)).map_err(|e| {
            log::error!("{} {} returned an unexpected shape: {:?}", method, url, e);
            ClientError::server(status.as_u16(), "Unexpected response from server")
        })
    }
}
