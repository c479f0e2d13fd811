//! Web-event payload rewrite.
//!
//! Supervisors forward web invocations with `__ow_`-prefixed control fields
//! mixed into the payload. When the rewrite is enabled, those fields are
//! renamed into the HTTP event shape most handler code expects, and the raw
//! query string is expanded into parameter maps. Everything else in the
//! payload passes through untouched.

use serde_json::{Map, Value};

/// Rewrite a web-event payload in place. Non-object payloads are left alone.
pub fn rewrite_web_event(payload: &mut Value) {
    let Value::Object(map) = payload else {
        return;
    };

    if let Some(method) = map.remove("__ow_method") {
        let method = match method {
            Value::String(text) => Value::String(text.to_uppercase()),
            other => other,
        };
        map.insert("httpMethod".to_string(), method);
    }
    if let Some(path) = map.remove("__ow_path") {
        map.insert("path".to_string(), path);
    }
    if let Some(headers) = map.remove("__ow_headers") {
        map.insert("headers".to_string(), headers);
    }
    if let Some(body) = map.remove("__ow_body") {
        map.insert("body".to_string(), body);
    }
    if let Some(flag) = map.remove("__ow_isBase64Encoded") {
        map.insert("isBase64Encoded".to_string(), flag);
    }
    if let Some(query) = map.remove("__ow_query") {
        if let Value::String(query) = query {
            let (multi, flat) = parse_query(&query);
            map.insert("multiValueQueryStringParameters".to_string(), multi);
            map.insert("queryStringParameters".to_string(), flat);
        }
    }
}

/// Expand a raw query string into the multi-value map (every value, in
/// order) and the flat map (first value per key).
fn parse_query(query: &str) -> (Value, Value) {
    let mut multi = Map::new();
    let mut flat = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let key = key.into_owned();
        let value = value.into_owned();
        let slot = multi
            .entry(key.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = slot {
            list.push(Value::String(value.clone()));
        }
        flat.entry(key).or_insert(Value::String(value));
    }
    (Value::Object(multi), Value::Object(flat))
}
