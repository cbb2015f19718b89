use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    #[validate(length(min = 1, message = "Recipient is required"))]
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 300, message = "Message must be at most 300 characters long"))]
    pub message: Option<String>,
}
