//! FCM HTTP v1 sender.
//!
//! The service-account key is read and parsed when the client is built, so a
//! bad credentials file fails at startup. The OAuth access token is minted
//! lazily on the first send and reused for the rest of the process. Batch runs
//! finish well inside the token's one-hour lifetime, so there is no refresh
//! path.

pub mod error;
pub mod types;

pub use error::{FcmError, Result};
pub use types::ServiceAccount;

use std::path::Path;
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tokio::sync::OnceCell;

use types::{JwtClaims, Message, Notification, SendRequest, SendResponse, TokenResponse};

const BASE_URL: &str = "https://fcm.googleapis.com/v1";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

pub struct FcmClient {
    client: reqwest::Client,
    account: ServiceAccount,
    signing_key: EncodingKey,
    base_url: String,
    access_token: OnceCell<String>,
}

impl FcmClient {
    /// Load a service-account key file and build a client for its project.
    pub fn new(credentials_path: impl AsRef<Path>) -> Result<Self> {
        let path = credentials_path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FcmError::Credentials(format!("{}: {e}", path.display())))?;
        let account: ServiceAccount = serde_json::from_str(&raw)
            .map_err(|e| FcmError::Credentials(format!("invalid service account: {e}")))?;
        Self::from_account(account)
    }

    pub fn from_account(account: ServiceAccount) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| FcmError::Credentials(format!("invalid private key: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            client,
            account,
            signing_key,
            base_url: BASE_URL.to_string(),
            access_token: OnceCell::new(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.account.project_id
    }

    /// Whether an OAuth access token has been minted.
    pub fn is_initialized(&self) -> bool {
        self.access_token.initialized()
    }

    async fn access_token(&self) -> Result<&str> {
        self.access_token
            .get_or_try_init(|| self.mint_access_token())
            .await
            .map(String::as_str)
    }

    async fn mint_access_token(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &self.account.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?;

        let resp = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FcmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = serde_json::from_str(&resp.text().await?)?;
        tracing::info!(project_id = %self.account.project_id, "FCM session initialized");
        Ok(token.access_token)
    }

    /// Send one notification. Returns the FCM message name on acceptance.
    pub async fn send(&self, device_token: &str, title: &str, body: &str) -> Result<String> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/projects/{}/messages:send",
            self.base_url, self.account.project_id
        );
        let request = SendRequest {
            message: Message {
                token: device_token,
                notification: Notification { title, body },
            },
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FcmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SendResponse = serde_json::from_str(&resp.text().await?)?;
        Ok(sent.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("sa.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_credentials_file_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let err = FcmClient::new(dir.path().join("absent.json")).err().unwrap();
        assert!(matches!(err, FcmError::Credentials(_)));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn service_account_without_key_fields_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"project_id": "p"}"#);

        let err = FcmClient::new(&path).err().unwrap();
        assert!(matches!(err, FcmError::Credentials(_)));
    }

    #[test]
    fn unparseable_private_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{
                "project_id": "poppang",
                "client_email": "scout@poppang.iam.gserviceaccount.com",
                "private_key": "not a pem"
            }"#,
        );

        let err = FcmClient::new(&path).err().unwrap();
        assert!(matches!(err, FcmError::Credentials(ref m) if m.contains("private key")));
    }
}
