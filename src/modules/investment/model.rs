use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::error::ClientError,
    modules::investment::schema::{CommitmentStatus, DeadlineWindow},
    utils::validate_form,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CommitmentForm {
    #[validate(range(exclusive_min = 0.0, message = "Amount must be greater than zero"))]
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DeadlineWindow>,
}

impl CommitmentForm {
    pub fn check(&self) -> Result<(), ClientError> {
        validate_form(self)?;
        if !self.amount.is_finite() {
            return Err(ClientError::invalid("Amount must be greater than zero"));
        }
        if let Some(window) = &self.deadline {
            if window.start > window.end {
                return Err(ClientError::invalid("Deadline start must not be after its end"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentBody<'a> {
    pub startup_id: &'a str,
    #[serde(flatten)]
    pub form: &'a CommitmentForm,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: CommitmentStatus,
}
