use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, future::Future, sync::Arc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    api::error::ClientError,
    cache::{store::MutationTicket, QueryCache, QueryKey, Target},
};

const NOTIFICATION_CAPACITY: usize = 64;

pub type Updater = Arc<dyn Fn(&mut Value) -> Result<(), serde_json::Error> + Send + Sync>;

pub(crate) struct PlanStep {
    pub target: Target,
    pub updater: Option<Updater>,
}

impl PlanStep {
    pub(crate) fn replace(target: Target, value: Value) -> Self {
        let updater: Updater = Arc::new(move |current: &mut Value| {
            *current = value.clone();
            Ok(())
        });
        PlanStep { target, updater: Some(updater) }
    }
}

fn typed_updater<T, F>(apply: F) -> Updater
where
    T: Serialize + DeserializeOwned + 'static,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    Arc::new(move |value: &mut Value| {
        let mut typed = T::deserialize(&*value)?;
        apply(&mut typed);
        *value = serde_json::to_value(typed)?;
        Ok(())
    })
}

/// The cache side of a mutation: which keys it touches and how each optimistic value is
/// derived from the value currently cached.
///
/// Updaters must be pure. They run against whatever is cached when the mutation begins,
/// including values installed by mutations still in flight, and run again if an older
/// mutation on the same key fails while this one is pending. Keys with nothing cached are only
/// held and invalidated.
pub struct OptimisticPlan {
    label: &'static str,
    steps: Vec<PlanStep>,
    success_message: Option<Cow<'static, str>>,
    retryable: bool,
}

impl OptimisticPlan {
    pub fn new(label: &'static str) -> Self {
        OptimisticPlan { label, steps: Vec::new(), success_message: None, retryable: false }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn update<T, F>(mut self, key: QueryKey, apply: F) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.steps.push(PlanStep { target: Target::Key(key), updater: Some(typed_updater(apply)) });
        self
    }

    /// Applies `apply` to every cached key of `entity`, e.g. each filtered listing.
    pub fn update_entity<T, F>(mut self, entity: impl Into<Cow<'static, str>>, apply: F) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.steps.push(PlanStep {
            target: Target::Entity(entity.into()),
            updater: Some(typed_updater(apply)),
        });
        self
    }

    pub fn replace(mut self, key: QueryKey, value: Value) -> Self {
        self.steps.push(PlanStep::replace(Target::Key(key), value));
        self
    }

    /// Holds the key for the duration of the mutation and marks it stale on success.
    pub fn invalidate(mut self, key: QueryKey) -> Self {
        self.steps.push(PlanStep { target: Target::Key(key), updater: None });
        self
    }

    pub fn invalidate_entity(mut self, entity: impl Into<Cow<'static, str>>) -> Self {
        self.steps.push(PlanStep { target: Target::Entity(entity.into()), updater: None });
        self
    }

    pub fn success_message(mut self, msg: impl Into<Cow<'static, str>>) -> Self {
        self.success_message = Some(msg.into());
        self
    }

    /// Failure notifications offer a retry action.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Transient, toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub source: Cow<'static, str>,
    pub retryable: bool,
}

/// Rolls the mutation back if it is dropped before resolving.
struct PendingMutation<'a> {
    cache: &'a QueryCache,
    ticket: Option<MutationTicket>,
}

impl PendingMutation<'_> {
    fn settle(mut self) -> Vec<QueryKey> {
        self.ticket.take().map(|t| self.cache.settle_mutation(&t)).unwrap_or_default()
    }

    fn rollback(mut self) -> Vec<QueryKey> {
        self.ticket.take().map(|t| self.cache.rollback_mutation(&t)).unwrap_or_default()
    }
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            log::warn!("{} dropped before resolving; rolling back", ticket.label);
            let ready = self.cache.rollback_mutation(&ticket);
            self.cache.schedule_refetch(ready);
        }
    }
}

/// Runs state changes optimistically against the [`QueryCache`].
#[derive(Clone)]
pub struct MutationController {
    cache: QueryCache,
    notifications: broadcast::Sender<Notification>,
}

impl MutationController {
    pub fn new(cache: QueryCache) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        MutationController { cache, notifications }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn notify_error(&self, source: &'static str, err: &ClientError, retryable: bool) {
        let _ = self.notifications.send(Notification {
            level: NotificationLevel::Error,
            message: err.user_message().into_owned(),
            source: source.into(),
            retryable,
        });
    }

    /// Reports an error decided before any request and returns it.
    pub fn reject<T>(&self, source: &'static str, err: ClientError) -> Result<T, ClientError> {
        log::debug!("{} rejected locally: {}", source, err);
        self.notify_error(source, &err, false);
        Err(err)
    }

    /// Installs the plan's optimistic values, then awaits `remote_call`.
    ///
    /// On success every affected key is marked stale and refetched in the background once no
    /// other mutation holds it. On failure every key is restored from its snapshot, with newer
    /// pending mutations replayed on top, an error notification is sent, and the error is
    /// returned. Nothing is retried.
    pub async fn mutate<R, Fut>(
        &self,
        plan: OptimisticPlan,
        remote_call: Fut,
    ) -> Result<R, ClientError>
    where
        Fut: Future<Output = Result<R, ClientError>>,
    {
        let OptimisticPlan { label, steps, success_message, retryable } = plan;

        let ticket = match self.cache.begin_mutation(Uuid::now_v7(), label, &steps) {
            Ok(ticket) => ticket,
            Err(err) => {
                log::error!("{} could not compute its optimistic state: {}", label, err);
                return self.reject(label, err);
            }
        };
        log::debug!("{} began on {} keys", label, ticket.keys.len());
        let pending = PendingMutation { cache: &self.cache, ticket: Some(ticket) };

        match remote_call.await {
            Ok(result) => {
                let ready = pending.settle();
                log::debug!("{} confirmed", label);
                self.cache.schedule_refetch(ready);
                if let Some(message) = success_message {
                    let _ = self.notifications.send(Notification {
                        level: NotificationLevel::Success,
                        message: message.into_owned(),
                        source: label.into(),
                        retryable: false,
                    });
                }
                Ok(result)
            }
            Err(err) => {
                let ready = pending.rollback();
                log::warn!("{} failed and was rolled back: {}", label, err);
                self.cache.schedule_refetch(ready);
                self.notify_error(label, &err, retryable);
                Err(err)
            }
        }
    }
}
