use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// In-memory credential held while authorized.
///
/// Only `refresh_token` survives a restart (through the credential store);
/// the access token is rebuilt by refreshing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: i64,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.expires_in_secs)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Token endpoint payload for both the device-code and refresh grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some providers omit this on refresh responses.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(deserialize_with = "seconds")]
    pub expires_in: i64,
}

impl TokenGrant {
    pub(crate) fn into_credential(self, fallback_refresh: &str) -> Credential {
        let refresh_token = self
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| fallback_refresh.to_string());
        Credential {
            access_token: self.access_token,
            refresh_token,
            expires_in_secs: self.expires_in,
            issued_at: Utc::now(),
        }
    }
}

/// Result of `tokeninfo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub aud: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Subset of the user profile endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Accepts `3600` as well as `"3600"`.
pub(crate) fn seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(num) => num
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("seconds out of range: {num}"))),
        serde_json::Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid seconds value: {text}"))),
        other => Err(D::Error::custom(format!("expected seconds, got {other}"))),
    }
}

pub(crate) fn optional_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "seconds")] i64);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(value)| value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_accepts_string_expiry() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"AT1","refresh_token":"RT1","expires_in":"3600"}"#,
        )
        .unwrap();
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.refresh_token.as_deref(), Some("RT1"));
    }

    #[test]
    fn grant_accepts_numeric_expiry_without_refresh_token() {
        let grant: TokenGrant =
            serde_json::from_str(r#"{"access_token":"AT2","expires_in":1800}"#).unwrap();
        assert_eq!(grant.expires_in, 1800);
        assert!(grant.refresh_token.is_none());
    }

    #[test]
    fn grant_rejects_garbage_expiry() {
        let result =
            serde_json::from_str::<TokenGrant>(r#"{"access_token":"AT","expires_in":"soon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_refresh_token_keeps_previous_one() {
        let grant = TokenGrant {
            access_token: "AT2".to_string(),
            refresh_token: None,
            expires_in: 3600,
        };
        let credential = grant.into_credential("RT1");
        assert_eq!(credential.refresh_token, "RT1");
        assert_eq!(credential.access_token, "AT2");
    }

    #[test]
    fn credential_expiry_uses_issue_time() {
        let issued_at = Utc::now();
        let credential = Credential {
            access_token: "AT".to_string(),
            refresh_token: "RT".to_string(),
            expires_in_secs: 60,
            issued_at,
        };
        assert!(!credential.is_expired_at(issued_at + Duration::seconds(59)));
        assert!(credential.is_expired_at(issued_at + Duration::seconds(60)));
    }
}
