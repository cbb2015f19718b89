use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(rename = "isPremium", default)]
    pub is_premium: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserEntity {
    pub fn display_name(&self) -> &str {
        match self.name.trim() {
            "" => self.email.as_deref().unwrap_or(&self.id),
            name => name,
        }
    }
}

/// Body of a successful sign-in. The token itself is persisted by the client on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEntity {
    pub token: String,
    pub user: UserEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTokenEntity {
    pub token: String,
}

/// What the chat and video SDK needs to connect as the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub token: String,
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}
