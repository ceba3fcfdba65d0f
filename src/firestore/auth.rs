//! OAuth access tokens for a Google service account.
//!
//! A short-lived RS256 JWT signed with the account's private key is exchanged
//! at `token_uri` for a bearer token (JWT bearer grant).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SyncError};

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_MINS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a service-account key file we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccount {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| SyncError::Settings(format!("invalid service account JSON: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn claims(account: &ServiceAccount, now: DateTime<Utc>) -> Claims<'_> {
    Claims {
        iss: &account.client_email,
        scope: DATASTORE_SCOPE,
        aud: &account.token_uri,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ASSERTION_LIFETIME_MINS)).timestamp(),
    }
}

fn signed_assertion(account: &ServiceAccount, now: DateTime<Utc>) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
        .map_err(|e| SyncError::Settings(format!("service account private key: {}", e)))?;
    encode(&Header::new(Algorithm::RS256), &claims(account, now), &key)
        .map_err(|e| SyncError::Settings(format!("cannot sign token request: {}", e)))
}

/// Exchange a signed assertion for an access token. Any failure, transport
/// included, is a `Config` error.
pub async fn fetch_access_token(http: &reqwest::Client, account: &ServiceAccount) -> Result<String> {
    let assertion = signed_assertion(account, Utc::now())?;
    let response = http
        .post(&account.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(exchange_failed)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(exchange_failed)?;
    let token = token_from_response(status, &body)?;
    debug!("Obtained access token for {}", account.client_email);
    Ok(token)
}

fn exchange_failed(e: reqwest::Error) -> SyncError {
    SyncError::Config(format!("token exchange failed: {}", e))
}

fn token_from_response(status: u16, body: &str) -> Result<String> {
    if !(200..300).contains(&status) {
        return Err(SyncError::Config(format!(
            "token exchange returned HTTP {}: {}",
            status, body
        )));
    }
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| SyncError::Config(format!("token response: {}", e)))?;
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn account() -> ServiceAccount {
        ServiceAccount::from_json(
            r#"{
                "type": "service_account",
                "project_id": "wandrr-test",
                "private_key_id": "k1",
                "private_key": "not a pem",
                "client_email": "sync@wandrr-test.iam.gserviceaccount.com"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn token_uri_defaults() {
        assert_eq!(account().token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn claims_cover_one_hour() {
        let acct = account();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let c = claims(&acct, now);
        assert_eq!(c.iss, "sync@wandrr-test.iam.gserviceaccount.com");
        assert_eq!(c.aud, acct.token_uri);
        assert_eq!(c.scope, DATASTORE_SCOPE);
        assert_eq!(c.exp - c.iat, 3600);
    }

    #[test]
    fn bad_private_key_rejected() {
        let err = signed_assertion(&account(), Utc::now()).unwrap_err();
        assert!(matches!(err, SyncError::Settings(_)));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            ServiceAccount::from_json("{\"project_id\": 1}"),
            Err(SyncError::Settings(_))
        ));
    }

    #[test]
    fn token_read_from_success_body() {
        let body = r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer"}"#;
        assert_eq!(token_from_response(200, body).unwrap(), "ya29.abc");
    }

    #[test]
    fn rejected_or_garbled_exchange_is_config_error() {
        let denied = token_from_response(400, r#"{"error":"invalid_grant"}"#).unwrap_err();
        assert!(matches!(denied, SyncError::Config(ref m) if m.contains("HTTP 400")));
        assert!(matches!(token_from_response(200, "<html>"), Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn transport_failure_is_config_error() {
        let err = reqwest::Client::new()
            .post("not a url")
            .send()
            .await
            .unwrap_err();
        assert!(matches!(exchange_failed(err), SyncError::Config(_)));
    }
}
