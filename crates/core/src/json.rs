//! A tagged JSON value tree, walked with explicit recursion.
//!
//! Shapes are user-supplied and open-ended, so we never derive a Rust type
//! per response: everything downstream walks this tree by hand.

use serde_json::Value;
use std::fmt;

/// Tagged JSON variant. Thin wrapper around [`serde_json::Value`] so that
/// every call site in this workspace names the five cases explicitly
/// instead of reaching for reflection-based (de)serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Json {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Arr(Vec<Json>),
    Obj(Vec<(String, Json)>),
}

impl Json {
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Num(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Json::Str(s.clone()),
            Value::Array(items) => Json::Arr(items.iter().map(Json::from_value).collect()),
            Value::Object(map) => {
                Json::Obj(map.iter().map(|(k, v)| (k.clone(), Json::from_value(v))).collect())
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Num(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Json::Str(s) => Value::String(s.clone()),
            Json::Arr(items) => Value::Array(items.iter().map(Json::to_value).collect()),
            Json::Obj(fields) => {
                Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
            }
        }
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let v: Value = serde_json::from_str(raw)?;
        Ok(Json::from_value(&v))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Json::Obj(_))
    }

    pub fn as_object(&self) -> Option<&[(String, Json)]> {
        match self {
            Json::Obj(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Json]> {
        match self {
            Json::Arr(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Json::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        match self {
            Json::Obj(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Shallow-remove a top-level key from an object, returning the new
    /// value and the removed field (if present). Used to strip `$cache`/
    /// `$error` hints out of a shape before the rest of the shape is used
    /// as a prompt fragment.
    pub fn without_key(&self, key: &str) -> (Json, Option<Json>) {
        match self {
            Json::Obj(fields) => {
                let mut kept = Vec::with_capacity(fields.len());
                let mut removed = None;
                for (k, v) in fields {
                    if k == key {
                        removed = Some(v.clone());
                    } else {
                        kept.push((k.clone(), v.clone()));
                    }
                }
                (Json::Obj(kept), removed)
            }
            other => (other.clone(), None),
        }
    }

    /// Walk the whole tree, invoking `visit` at every leaf (non-container)
    /// value with its dotted path (e.g. `"user.id"`, `"items[0].sku"`).
    pub fn walk_leaves<F: FnMut(&str, &Json)>(&self, mut visit: F) {
        fn go(node: &Json, path: &mut String, visit: &mut dyn FnMut(&str, &Json)) {
            match node {
                Json::Obj(fields) => {
                    for (k, v) in fields {
                        let len_before = path.len();
                        if !path.is_empty() {
                            path.push('.');
                        }
                        path.push_str(k);
                        go(v, path, visit);
                        path.truncate(len_before);
                    }
                }
                Json::Arr(items) => {
                    for (i, v) in items.iter().enumerate() {
                        let len_before = path.len();
                        path.push_str(&format!("[{}]", i));
                        go(v, path, visit);
                        path.truncate(len_before);
                    }
                }
                leaf => visit(path, leaf),
            }
        }
        let mut path = String::new();
        go(self, &mut path, &mut visit);
    }

    /// Render a leaf value as a plain string (for shared-key extraction and
    /// prompt-block formatting).
    pub fn leaf_to_string(&self) -> Option<String> {
        match self {
            Json::Str(s) => Some(s.clone()),
            Json::Num(n) => Some(format_num(*n)),
            Json::Bool(b) => Some(b.to_string()),
            Json::Null => None,
            _ => None,
        }
    }
}

fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Json {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_serde_value() {
        let raw = r#"{"id":1,"tags":["a","b"],"nested":{"ok":true}}"#;
        let j = Json::parse(raw).unwrap();
        assert!(j.is_object());
        assert_eq!(j.get("id").unwrap().leaf_to_string(), Some("1".to_string()));
    }

    #[test]
    fn without_key_strips_only_requested_field() {
        let j = Json::parse(r#"{"a":1,"$cache":3}"#).unwrap();
        let (stripped, removed) = j.without_key("$cache");
        assert!(stripped.get("$cache").is_none());
        assert!(stripped.get("a").is_some());
        assert_eq!(removed.unwrap().leaf_to_string(), Some("3".to_string()));
    }

    #[test]
    fn walk_leaves_visits_array_indices() {
        let j = Json::parse(r#"{"items":[{"sku":"A1"},{"sku":"B2"}]}"#).unwrap();
        let mut paths = Vec::new();
        j.walk_leaves(|path, _| paths.push(path.to_string()));
        assert!(paths.contains(&"items[0].sku".to_string()));
        assert!(paths.contains(&"items[1].sku".to_string()));
    }
}
