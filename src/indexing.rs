use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::errors::IndexingError;
use crate::models::ServiceAccountCredentials;

pub const INDEXING_SCOPE: &str = "https://www.googleapis.com/auth/indexing";
pub const PUBLISH_ENDPOINT: &str = "https://indexing.googleapis.com/v3/urlNotifications:publish";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The external indexing service.
#[async_trait]
pub trait IndexingClient: Send + Sync {
    async fn publish(
        &self,
        url: &str,
        credentials: &ServiceAccountCredentials,
    ) -> Result<(), IndexingError>;
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Serialize)]
struct UrlNotification<'a> {
    url: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

struct AccessToken {
    client_email: String,
    value: String,
    expires_at: Instant,
}

/// Google Indexing API client authenticating as a service account.
pub struct GoogleIndexingClient {
    http: reqwest::Client,
    endpoint: String,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleIndexingClient {
    pub fn new(timeout: Duration) -> Result<Self, IndexingError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: PUBLISH_ENDPOINT.to_string(),
            token: Mutex::new(None),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn sign_assertion(credentials: &ServiceAccountCredentials) -> Result<String, IndexingError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = AssertionClaims {
            iss: &credentials.client_email,
            scope: INDEXING_SCOPE,
            aud: &credentials.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    async fn access_token(
        &self,
        credentials: &ServiceAccountCredentials,
    ) -> Result<String, IndexingError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.client_email == credentials.client_email
                && Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at
            {
                return Ok(token.value.clone());
            }
        }

        let assertion = Self::sign_assertion(credentials)?;
        let response = self
            .http
            .post(&credentials.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IndexingError::Token(response.status().as_u16()));
        }
        let token: TokenResponse = response.json().await?;
        tracing::debug!(client = %credentials.client_email, expires_in = token.expires_in, "obtained indexing access token");

        *cached = Some(AccessToken {
            client_email: credentials.client_email.clone(),
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl IndexingClient for GoogleIndexingClient {
    async fn publish(
        &self,
        url: &str,
        credentials: &ServiceAccountCredentials,
    ) -> Result<(), IndexingError> {
        let token = self.access_token(credentials).await?;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&UrlNotification {
                url,
                kind: "URL_UPDATED",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexingError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        tracing::info!(url, status = status.as_u16(), "indexing notification accepted");
        Ok(())
    }
}
