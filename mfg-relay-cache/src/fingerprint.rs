use ahash::AHasher;
use serde_json::Value;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

const DOMAIN_BODY: u8 = 1;

/// Identity of a logical request: method, URL and canonical body.
///
/// Object keys in the body are sorted before hashing, so bodies that only
/// differ in key insertion order map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(Arc<str>);

impl RequestKey {
    pub fn new(method: &str, url: &str, body: Option<&Value>) -> Self {
        let method = method.to_ascii_uppercase();
        match body.and_then(Self::body_fingerprint) {
            Some(fp) => Self(Arc::from(format!("{method} {url} #{fp:016x}"))),
            None => Self(Arc::from(format!("{method} {url}"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn body_fingerprint(body: &Value) -> Option<u64> {
        if body.is_null() {
            return None;
        }
        let mut normalized = body.clone();
        normalized.sort_all_objects();
        let bytes = serde_json::to_vec(&normalized).ok()?;

        let mut hasher = AHasher::default();
        hasher.write_u8(DOMAIN_BODY);
        hasher.write(&bytes);
        Some(hasher.finish())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_key_order_produces_same_key() {
        let lhs = json!({"code": "RM-01", "lot": {"qty": 3, "unit": "kg"}});
        let rhs = json!({"lot": {"unit": "kg", "qty": 3}, "code": "RM-01"});

        assert_eq!(
            RequestKey::new("POST", "/api/materials/", Some(&lhs)),
            RequestKey::new("POST", "/api/materials/", Some(&rhs))
        );
    }

    #[test]
    fn method_and_url_distinguish_keys() {
        let get = RequestKey::new("get", "/api/batches/", None);
        assert_eq!(get.as_str(), "GET /api/batches/");
        assert_ne!(get, RequestKey::new("DELETE", "/api/batches/", None));
        assert_ne!(get, RequestKey::new("GET", "/api/batches/?page=2", None));
    }

    #[test]
    fn null_body_is_same_as_no_body() {
        assert_eq!(
            RequestKey::new("GET", "/api/orders/", Some(&Value::Null)),
            RequestKey::new("GET", "/api/orders/", None)
        );
    }

    #[test]
    fn array_order_changes_key() {
        let lhs = json!({"ids": [1, 2]});
        let rhs = json!({"ids": [2, 1]});
        assert_ne!(
            RequestKey::new("PATCH", "/api/po/", Some(&lhs)),
            RequestKey::new("PATCH", "/api/po/", Some(&rhs))
        );
    }
}
