use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Decode the payload JSON ("claims") from a JWT.
///
/// Signature-agnostic: only the payload segment is base64url-decoded and
/// parsed as JSON.
pub(crate) fn decode_jwt_claims(jwt: &str) -> Option<Value> {
    let payload_b64 = jwt.split('.').nth(1)?;

    // Most JWTs are base64url without padding, but some toolchains may include padding.
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(payload_b64))
        .ok()?;

    serde_json::from_slice(&bytes).ok()
}

/// Expiry (`exp`) of an access token, when it carries one.
pub(crate) fn token_expiry(jwt: &str) -> Option<DateTime<Utc>> {
    let exp = decode_jwt_claims(jwt)?.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Subject of the token; SimpleJWT puts it in `user_id`.
pub(crate) fn token_subject(jwt: &str) -> Option<String> {
    let claims = decode_jwt_claims(jwt)?;
    claims
        .get("sub")
        .or_else(|| claims.get("user_id"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}
