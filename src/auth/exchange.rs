//! HTTP exchange with the Login with Amazon authorization server.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::device_code::{CodePairResponse, DevicePoll};
use super::error::ExchangeError;
use super::token::{TokenGrant, TokenInfo, UserProfile};
use crate::config::{CblConfig, DeviceIdentity};
use crate::error::{CblError, Result};

/// The request shapes the state machine needs from the authorization server.
///
/// Implementations must classify every failure as an [`ExchangeError`];
/// they never touch authorization state.
#[async_trait]
pub trait AuthExchange: Send + Sync {
    /// `POST create/codepair`.
    async fn request_code_pair(
        &self,
        identity: &DeviceIdentity,
        scope: &str,
    ) -> std::result::Result<CodePairResponse, ExchangeError>;

    /// `POST token` with the device-code grant.
    async fn poll_device_token(
        &self,
        device_code: &str,
        user_code: &str,
    ) -> std::result::Result<DevicePoll, ExchangeError>;

    /// `POST token` with the refresh-token grant.
    async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> std::result::Result<TokenGrant, ExchangeError>;

    /// `GET tokeninfo`.
    async fn verify_token(&self, access_token: &str)
        -> std::result::Result<TokenInfo, ExchangeError>;

    /// `GET` the user profile endpoint.
    async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> std::result::Result<UserProfile, ExchangeError>;
}

/// [`AuthExchange`] over HTTPS with `reqwest`.
///
/// # Example
/// ```no_run
/// use cbl::auth::HttpExchange;
/// use cbl::config::CblConfig;
///
/// let exchange = HttpExchange::new(&CblConfig::default())?;
/// # Ok::<(), cbl::error::CblError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HttpExchange {
    client: reqwest::Client,
    code_pair_url: Url,
    token_url: Url,
    token_info_url: Url,
    profile_url: Url,
}

impl HttpExchange {
    pub fn new(config: &CblConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| CblError::config(format!("cannot build HTTP client: {err}")))?;
        Self::with_client(client, &config.auth_base_url, &config.profile_url)
    }

    pub fn with_client(client: reqwest::Client, auth_base_url: &str, profile_url: &str) -> Result<Self> {
        let base = parse_base_url(auth_base_url)?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|err| CblError::config(format!("invalid endpoint {path}: {err}")))
        };
        Ok(Self {
            code_pair_url: join("create/codepair")?,
            token_url: join("token")?,
            token_info_url: join("tokeninfo")?,
            profile_url: Url::parse(profile_url)
                .map_err(|err| CblError::config(format!("invalid profile_url: {err}")))?,
            client,
        })
    }
}

#[async_trait]
impl AuthExchange for HttpExchange {
    async fn request_code_pair(
        &self,
        identity: &DeviceIdentity,
        scope: &str,
    ) -> std::result::Result<CodePairResponse, ExchangeError> {
        let scope_data = scope_data(identity).to_string();
        let resp = self
            .client
            .post(self.code_pair_url.clone())
            .form(&[
                ("response_type", "device_code"),
                ("client_id", identity.client_id.as_str()),
                ("scope", scope),
                ("scope_data", scope_data.as_str()),
            ])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ExchangeError::Protocol(format!(
                "Code pair request failed with status {}",
                resp.status()
            )));
        }
        read_json(resp).await
    }

    async fn poll_device_token(
        &self,
        device_code: &str,
        user_code: &str,
    ) -> std::result::Result<DevicePoll, ExchangeError> {
        let resp = self
            .client
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "device_code"),
                ("device_code", device_code),
                ("user_code", user_code),
            ])
            .send()
            .await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Ok(DevicePoll::Pending {
                status: status.as_u16(),
            });
        }
        let grant: TokenGrant = read_json(resp).await?;
        if grant.access_token.is_empty() {
            return Err(ExchangeError::missing_field("access_token"));
        }
        if grant.refresh_token.as_deref().map_or(true, str::is_empty) {
            return Err(ExchangeError::missing_field("refresh_token"));
        }
        Ok(DevicePoll::Authorized { grant })
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> std::result::Result<TokenGrant, ExchangeError> {
        let resp = self
            .client
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
            ])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ExchangeError::Protocol(format!(
                "Refresh request failed with status {}",
                resp.status()
            )));
        }
        let grant: TokenGrant = read_json(resp).await?;
        if grant.access_token.is_empty() {
            return Err(ExchangeError::missing_field("access_token"));
        }
        Ok(grant)
    }

    async fn verify_token(
        &self,
        access_token: &str,
    ) -> std::result::Result<TokenInfo, ExchangeError> {
        let resp = self
            .client
            .get(self.token_info_url.clone())
            .query(&[("access_token", access_token)])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ExchangeError::Protocol(format!(
                "Token verification failed with status {}",
                resp.status()
            )));
        }
        read_json(resp).await
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> std::result::Result<UserProfile, ExchangeError> {
        let resp = self
            .client
            .get(self.profile_url.clone())
            .header("Authorization", format!("bearer {access_token}"))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ExchangeError::Protocol(format!(
                "Profile request failed with status {}",
                resp.status()
            )));
        }
        read_json(resp).await
    }
}

fn scope_data(identity: &DeviceIdentity) -> serde_json::Value {
    json!({
        "alexa:all": {
            "productID": identity.product_id,
            "productInstanceAttributes": {
                "deviceSerialNumber": identity.device_serial_number,
            },
        },
    })
}

async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> std::result::Result<T, ExchangeError> {
    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|err| CblError::config(format!("invalid auth_base_url: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_data_nests_product_attributes() {
        let identity = DeviceIdentity::new("client", "sample_app", "DSN-1");
        let value = scope_data(&identity);
        assert_eq!(value["alexa:all"]["productID"], "sample_app");
        assert_eq!(
            value["alexa:all"]["productInstanceAttributes"]["deviceSerialNumber"],
            "DSN-1"
        );
    }

    #[test]
    fn endpoints_are_resolved_against_base_without_trailing_slash() {
        let exchange = HttpExchange::with_client(
            reqwest::Client::new(),
            "https://api.amazon.com/auth/O2",
            "https://api.amazon.com/user/profile",
        )
        .unwrap();
        assert_eq!(
            exchange.code_pair_url.as_str(),
            "https://api.amazon.com/auth/O2/create/codepair"
        );
        assert_eq!(exchange.token_url.as_str(), "https://api.amazon.com/auth/O2/token");
        assert_eq!(
            exchange.token_info_url.as_str(),
            "https://api.amazon.com/auth/O2/tokeninfo"
        );
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let err = HttpExchange::with_client(reqwest::Client::new(), "not a url", "https://x.test")
            .unwrap_err();
        assert!(matches!(err, CblError::Configuration(_)));
    }
}
