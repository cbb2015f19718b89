use reqwest::{header::AUTHORIZATION, RequestBuilder};
use serde_json::Value;

pub fn attach_bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

/// Session token carried by a response body, at the top level or inside the `data` envelope.
pub fn capture_token(body: &Value) -> Option<&str> {
    let direct = body.get("token").and_then(Value::as_str);
    let enveloped = || body.get("data").and_then(|d| d.get("token")).and_then(Value::as_str);
    direct.or_else(enveloped).filter(|t| !t.is_empty())
}

/// Drops `null` and `{}` elements from every array in the payload. Related entities deleted on
/// the backend show up this way in populated lists.
pub fn prune_empty_entities(value: &mut Value) {
    match value {
        Value::Array(items) => {
            items.retain(|item| !is_empty_entity(item));
            items.iter_mut().for_each(prune_empty_entities);
        }
        Value::Object(map) => map.values_mut().for_each(prune_empty_entities),
        _ => {}
    }
}

fn is_empty_entity(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
