use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{cache::QueryKey, modules::startup::service::STARTUPS_ENTITY};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

impl StartupFilter {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Query string parameters; blank values are left out.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        [("category", &self.category), ("search", &self.search)]
            .into_iter()
            .filter_map(|(name, value)| {
                let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
                Some((name, value.to_string()))
            })
            .collect()
    }

    pub fn key(&self) -> QueryKey {
        QueryKey::new(STARTUPS_ENTITY)
            .param_opt("category", self.category.as_deref())
            .param_opt("search", self.search.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewForm {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(min = 1, message = "Review comment cannot be empty"))]
    pub comment: String,
}
