use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::IdRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendEntity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&IdRef> for FriendEntity {
    /// Builds a friend entry from a populated user reference, falling back to the bare id.
    fn from(user: &IdRef) -> Self {
        let name = ["name", "displayName", "username"]
            .iter()
            .find_map(|field| user.field_str(field))
            .unwrap_or_default()
            .to_string();
        let avatar = ["avatar", "avatarUrl"]
            .iter()
            .find_map(|field| user.field_str(field))
            .map(str::to_string);
        FriendEntity { id: user.id().to_string(), name, avatar, extra: Map::new() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    #[default]
    Pending,
    Accepted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestEntity {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender: IdRef,
    pub recipient: IdRef,
    #[serde(default)]
    pub status: FriendRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FriendRequestEntity {
    pub fn is_pending_between(&self, sender_id: &str, recipient_id: &str) -> bool {
        self.status == FriendRequestStatus::Pending
            && self.sender.is(sender_id)
            && self.recipient.is(recipient_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FriendRequestsEntity {
    #[serde(default)]
    pub incoming: Vec<FriendRequestEntity>,
    #[serde(default)]
    pub outgoing: Vec<FriendRequestEntity>,
}

impl FriendRequestsEntity {
    pub fn find_incoming(&self, request_id: &str) -> Option<&FriendRequestEntity> {
        self.incoming.iter().find(|r| r.id == request_id)
    }

    pub fn has_pending(&self, sender_id: &str, recipient_id: &str) -> bool {
        self.incoming
            .iter()
            .chain(&self.outgoing)
            .any(|r| r.is_pending_between(sender_id, recipient_id))
    }
}
