use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{
    de::{Deserializer, Error as DeError},
    Deserialize, Serialize, Serializer,
};
use serde_json::{Map, Value};
use validator::Validate;

use crate::{api::error::ClientError, configs::SessionStore};

/// Reference to another entity. The backend returns either the raw id or the populated object,
/// depending on the endpoint.
#[derive(Debug, Clone)]
pub enum IdRef {
    Id(String),
    Object { id: String, fields: Map<String, Value> },
}

impl IdRef {
    pub fn id(&self) -> &str {
        match self {
            IdRef::Id(id) => id,
            IdRef::Object { id, .. } => id,
        }
    }

    pub fn is(&self, id: &str) -> bool {
        self.id() == id
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            IdRef::Id(_) => None,
            IdRef::Object { fields, .. } => fields.get(name),
        }
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(IdRef::Id(s)),
            Value::Number(n) => Some(IdRef::Id(n.to_string())),
            Value::Object(fields) => {
                let id = ["_id", "id"].iter().find_map(|key| match fields.get(*key) {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })?;
                Some(IdRef::Object { id, fields })
            }
            _ => None,
        }
    }
}

impl From<&str> for IdRef {
    fn from(id: &str) -> Self {
        IdRef::Id(id.to_string())
    }
}

impl From<String> for IdRef {
    fn from(id: String) -> Self {
        IdRef::Id(id)
    }
}

/// Equality is always on the normalized id, never on the payload shape.
impl PartialEq for IdRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for IdRef {}

impl Serialize for IdRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IdRef::Id(id) => serializer.serialize_str(id),
            IdRef::Object { fields, .. } => fields.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for IdRef {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(de)?;
        IdRef::from_value(value)
            .ok_or_else(|| D::Error::custom("expected an id or an object carrying `_id`"))
    }
}

pub fn contains_id(refs: &[IdRef], id: &str) -> bool {
    refs.iter().any(|r| r.is(id))
}

/// Claims read from the stored session token. The signature is not checked here; the backend
/// does that on every request.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub iat: Option<u64>,
}

impl SessionClaims {
    pub fn peek(token: &str) -> Option<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        match decode::<Self>(token, &DecodingKey::from_secret(&[]), &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                log::warn!("Stored session token is not a readable JWT: {:?}", e);
                None
            }
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        [&self.sub, &self.id, &self.user_id, &self.object_id]
            .into_iter()
            .find_map(|v| v.as_deref().filter(|s| !s.is_empty()))
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.exp.is_some_and(|exp| exp <= now)
    }
}

/// Id of the signed-in user, taken from the stored session token.
pub async fn current_user_id(session: &dyn SessionStore) -> Result<String, ClientError> {
    let token = session.load().await?.ok_or_else(ClientError::not_logged_in)?;
    SessionClaims::peek(&token)
        .and_then(|claims| claims.user_id().map(str::to_string))
        .ok_or_else(ClientError::not_logged_in)
}

/// Placeholder id for an entity created optimistically, replaced on reconciliation.
pub fn temp_id() -> String {
    format!("optimistic-{}", uuid::Uuid::now_v7())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with("optimistic-")
}

/// Checks that an id can be used as a single URL path segment.
pub fn path_id(id: &str) -> Result<&str, ClientError> {
    let plain = id.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if id.is_empty() || !plain || id.chars().all(|c| c == '.') {
        return Err(ClientError::invalid(format!("Invalid id: {id:?}")));
    }
    Ok(id)
}

pub fn validate_form<T: Validate>(form: &T) -> Result<(), ClientError> {
    form.validate().map_err(ClientError::from)
}

#[cfg(test)]
pub(crate) fn test_token(user_id: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let exp = chrono::Utc::now().timestamp() as u64 + 3600;
    encode(
        &Header::new(Algorithm::HS256),
        &serde_json::json!({ "id": user_id, "exp": exp }),
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap()
}
