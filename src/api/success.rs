use serde_json::Value;
use std::borrow::Cow;

/// Success envelope used by the backend: `{ "data": ..., "message": ... }`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SuccessData<T> {
    pub data: Option<T>,
    pub message: Option<Cow<'static, str>>,
}

impl<T: serde::Serialize> SuccessData<T> {
    pub fn ok(data: T) -> Self {
        Self { data: Some(data), message: None }
    }

    pub fn message<M>(mut self, msg: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        self.message = Some(msg.into());
        self
    }
}

/// Returns the `data` member of an enveloped body, or the body itself when it is not enveloped.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
