use std::{borrow::Cow, collections::BTreeMap, fmt};

/// Identifier of a logical query result: an entity name plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    entity: Cow<'static, str>,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(entity: impl Into<Cow<'static, str>>) -> Self {
        QueryKey { entity: entity.into(), params: BTreeMap::new() }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Adds the parameter only when it has a non-empty value, so `search=""` and no search
    /// share one cache entry.
    pub fn param_opt(self, name: impl Into<String>, value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.param(name, v),
            None => self,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entity)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            write!(f, "{}{}={}", if i == 0 { '?' } else { '&' }, name, value)?;
        }
        Ok(())
    }
}
