use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::{contains_id, IdRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEntity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<IdRef>,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupEntity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdRef>,
    #[serde(default)]
    pub upvotes: Vec<IdRef>,
    #[serde(rename = "upvoteCount", default, skip_serializing_if = "Option::is_none")]
    pub upvote_count: Option<i64>,
    #[serde(default)]
    pub reviews: Vec<ReviewEntity>,
    /// Fields this client does not interpret, kept so cached payloads survive a round trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StartupEntity {
    pub fn upvote_count(&self) -> i64 {
        self.upvote_count.unwrap_or(self.upvotes.len() as i64)
    }

    pub fn has_upvoted(&self, user_id: &str) -> bool {
        contains_id(&self.upvotes, user_id)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner.as_ref().is_some_and(|owner| owner.is(user_id))
    }

    /// Flips `user_id`'s upvote based on current membership. Returns whether the user now
    /// upvotes the startup. The count never drops below zero.
    pub fn toggle_upvote(&mut self, user_id: &str) -> bool {
        let count = self.upvote_count();
        if self.has_upvoted(user_id) {
            self.upvotes.retain(|u| !u.is(user_id));
            self.upvote_count = Some((count - 1).max(0));
            false
        } else {
            self.upvotes.push(IdRef::from(user_id));
            self.upvote_count = Some(count + 1);
            true
        }
    }
}
