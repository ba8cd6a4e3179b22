//! Shape extractor (spec.md §4.2): pulls a JSON shape out of the query
//! string, the `X-Response-Shape` header, or a JSON/urlencoded body, and
//! hands it to [`mockllm_core::ShapeInfo::parse`] for `$cache`/`$error`
//! hint stripping.

use mockllm_core::{Json, ShapeInfo};

pub const RESPONSE_SHAPE_HEADER: &str = "x-response-shape";

/// Raw request body, already fully read by the transport layer. Multipart
/// bodies are drained to `{fieldName: value, files: [{filename,size,contentType}]}`
/// metadata upstream (spec.md §4.2) before reaching this module — this
/// type only ever sees JSON or urlencoded text.
#[derive(Debug, Clone)]
pub enum RawBody {
    Json(String),
    UrlEncoded(String),
    Empty,
}

/// Extracts the shape string from query params, header, or body, in the
/// priority order the spec defines, then delegates hint-stripping to
/// [`ShapeInfo::parse`].
pub fn extract_shape(
    query: &[(String, String)],
    header_value: Option<&str>,
    body: &RawBody,
    max_cache_per_key: u32,
) -> ShapeInfo {
    if let Some(raw) = query.iter().find(|(k, _)| k == "shape").map(|(_, v)| v.as_str()) {
        return ShapeInfo::parse(raw, max_cache_per_key);
    }
    if let Some(header) = header_value {
        if !header.is_empty() {
            return ShapeInfo::parse(header, max_cache_per_key);
        }
    }
    if let Some(raw) = shape_from_body(body) {
        return ShapeInfo::parse(&raw, max_cache_per_key);
    }
    ShapeInfo::none()
}

fn shape_from_body(body: &RawBody) -> Option<String> {
    match body {
        RawBody::Json(text) => {
            let value = Json::parse(text).ok()?;
            let shape = value.get("shape")?;
            Some(shape.to_string())
        }
        RawBody::UrlEncoded(text) => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(text).ok()?;
            pairs.into_iter().find(|(k, _)| k == "shape").map(|(_, v)| v)
        }
        RawBody::Empty => None,
    }
}

/// Parses a request body into a [`Json`] value for downstream use (prompt
/// assembly, context recording), per the three content-type families
/// spec.md §4.2 names. Multipart is out of scope here; see the doc
/// comment on [`RawBody`].
pub fn body_to_json(body: &RawBody) -> Json {
    match body {
        RawBody::Json(text) => Json::parse(text).unwrap_or(Json::Null),
        RawBody::UrlEncoded(text) => urlencoded_to_json(text),
        RawBody::Empty => Json::Null,
    }
}

/// Converts `a=1&a=2&b=3` into `{"a":["1","2"],"b":"3"}` — repeated keys
/// become arrays (spec.md §4.2).
fn urlencoded_to_json(text: &str) -> Json {
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(text) {
        Ok(p) => p,
        Err(_) => return Json::Null,
    };

    let mut obj: Vec<(String, Json)> = Vec::new();
    for (key, value) in pairs {
        if let Some(existing) = obj.iter_mut().find(|(k, _)| *k == key) {
            match &mut existing.1 {
                Json::Arr(items) => items.push(Json::Str(value)),
                other => {
                    let prior = std::mem::replace(other, Json::Null);
                    *other = Json::Arr(vec![prior, Json::Str(value)]);
                }
            }
        } else {
            obj.push((key, Json::Str(value)));
        }
    }
    Json::Obj(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_shape_takes_priority_over_header_and_body() {
        let query = vec![("shape".to_string(), r#"{"id":0}"#.to_string())];
        let info = extract_shape(&query, Some(r#"{"name":""}"#), &RawBody::Empty, 50);
        assert_eq!(info.shape.as_deref(), Some(r#"{"id":0}"#));
    }

    #[test]
    fn header_used_when_no_query_shape() {
        let info = extract_shape(&[], Some(r#"{"name":""}"#), &RawBody::Empty, 50);
        assert_eq!(info.shape.as_deref(), Some(r#"{"name":""}"#));
    }

    #[test]
    fn body_shape_field_used_as_last_resort() {
        let body = RawBody::Json(r#"{"shape":{"id":0},"other":"x"}"#.to_string());
        let info = extract_shape(&[], None, &body, 50);
        assert!(info.shape.is_some());
    }

    #[test]
    fn no_shape_anywhere_yields_none() {
        let info = extract_shape(&[], None, &RawBody::Empty, 50);
        assert!(info.shape.is_none());
    }

    #[test]
    fn cache_hint_in_query_shape_is_parsed() {
        let query = vec![("shape".to_string(), r#"{"id":0,"$cache":3}"#.to_string())];
        let info = extract_shape(&query, None, &RawBody::Empty, 50);
        assert_eq!(info.cache_count, 3);
    }

    #[test]
    fn urlencoded_repeated_keys_become_array() {
        let json = urlencoded_to_json("a=1&a=2&b=3");
        assert!(json.is_object());
        let a = json.get("a").unwrap();
        assert!(matches!(a, Json::Arr(items) if items.len() == 2));
    }

    #[test]
    fn urlencoded_single_key_stays_scalar() {
        let json = urlencoded_to_json("b=3");
        assert!(matches!(json.get("b"), Some(Json::Str(s)) if s == "3"));
    }
}
