//! HTTPS relay client.
//!
//! Speaks the envsync REST contract with JSON bodies and a bearer token.
//! 401 responses become [`RelayError::Unauthorized`] so callers can tell
//! "log in again" apart from server or network trouble.

use std::time::Duration;

use async_trait::async_trait;
use envsync_types::{
    CreateProjectRequest, EnvCiphertext, EnvSnapshot, ErrorBody, HistoryPage, IdentityPublicKey,
    Invitation, InviteRequest, KeyGrant, Member, MemberId, MemberIdentity, Project, ProjectId,
    PushEnvRequest, PushEnvResponse, RegisterIdentityRequest, Version, VersionResponse,
};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::{Relay, RelayError};

/// Connection settings for [`HttpRelay`].
#[derive(Clone)]
pub struct HttpRelayConfig {
    /// Base URL, e.g. `https://relay.example.com/api`.
    pub base_url: String,
    /// Bearer token from `envsync login`.
    pub token: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpRelayConfig {
    /// Create a config with the default 30 second timeout.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for HttpRelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRelayConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Relay reached over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    http: reqwest::Client,
    config: HttpRelayConfig,
}

impl HttpRelay {
    /// Build a client for the given relay.
    pub fn new(config: HttpRelayConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("envsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Network(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(&self.config.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path)).bearer_auth(&self.config.token)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, RelayError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RelayError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RelayError::Decode(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout
    } else {
        RelayError::Network(err.to_string())
    }
}

/// Map a non-success status and body to a [`RelayError`].
fn error_for_status(status: StatusCode, body: &str) -> RelayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                trimmed.to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => RelayError::Unauthorized,
        StatusCode::NOT_FOUND => RelayError::NotFound(message),
        _ => RelayError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn register_identity(&self, public_key: &IdentityPublicKey) -> Result<(), RelayError> {
        let body = RegisterIdentityRequest {
            public_key: *public_key,
        };
        self.execute(self.post("/identity").json(&body)).await?;
        Ok(())
    }

    async fn whoami(&self) -> Result<Member, RelayError> {
        self.json(self.get("/me")).await
    }

    async fn create_project(&self, name: &str, key: KeyGrant) -> Result<Project, RelayError> {
        let body = CreateProjectRequest {
            name: name.to_string(),
            key,
        };
        self.json(self.post("/projects").json(&body)).await
    }

    async fn push_env(
        &self,
        project: &ProjectId,
        ciphertext: EnvCiphertext,
        message: Option<String>,
    ) -> Result<Version, RelayError> {
        let body = PushEnvRequest {
            ciphertext,
            message,
        };
        let resp: PushEnvResponse = self
            .json(self.post(&format!("/projects/{}/env", project)).json(&body))
            .await?;
        Ok(resp.version)
    }

    async fn pull_env(&self, project: &ProjectId) -> Result<EnvSnapshot, RelayError> {
        self.json(self.get(&format!("/projects/{}/env", project)))
            .await
    }

    async fn env_version(&self, project: &ProjectId) -> Result<Version, RelayError> {
        let resp: VersionResponse = self
            .json(self.get(&format!("/projects/{}/env/version", project)))
            .await?;
        Ok(resp.version)
    }

    async fn env_at(
        &self,
        project: &ProjectId,
        version: Version,
    ) -> Result<EnvSnapshot, RelayError> {
        self.json(self.get(&format!("/projects/{}/env/{}", project, version)))
            .await
    }

    async fn history(
        &self,
        project: &ProjectId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, RelayError> {
        let request = self
            .get(&format!("/projects/{}/env/history", project))
            .query(&[("page", page), ("limit", limit)]);
        self.json(request).await
    }

    async fn list_members(&self, project: &ProjectId) -> Result<Vec<Member>, RelayError> {
        self.json(self.get(&format!("/projects/{}/members", project)))
            .await
    }

    async fn pending_keys(&self, project: &ProjectId) -> Result<Vec<MemberIdentity>, RelayError> {
        self.json(self.get(&format!("/projects/{}/members/pending-keys", project)))
            .await
    }

    async fn upload_member_key(
        &self,
        project: &ProjectId,
        member: &MemberId,
        grant: KeyGrant,
    ) -> Result<(), RelayError> {
        let path = format!("/projects/{}/members/{}/key", project, member);
        self.execute(self.post(&path).json(&grant)).await?;
        Ok(())
    }

    async fn my_key(&self, project: &ProjectId) -> Result<KeyGrant, RelayError> {
        self.json(self.get(&format!("/projects/{}/members/me/key", project)))
            .await
    }

    async fn invite(&self, project: &ProjectId, email: &str) -> Result<Invitation, RelayError> {
        let body = InviteRequest {
            project_id: project.clone(),
            email: email.to_string(),
        };
        self.json(self.post("/invitations").json(&body)).await
    }

    async fn accept_invitation(&self, invitation_id: &str) -> Result<Project, RelayError> {
        self.json(self.post(&format!("/invitations/{}/accept", invitation_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_distinct() {
        let err = error_for_status(StatusCode::UNAUTHORIZED, r#"{"error":"token expired"}"#);
        assert!(err.is_unauthorized());
    }

    #[test]
    fn not_found_carries_message() {
        let err = error_for_status(StatusCode::NOT_FOUND, r#"{"error":"no snapshot"}"#);
        assert!(matches!(err, RelayError::NotFound(ref m) if m == "no snapshot"));
    }

    #[test]
    fn other_statuses_keep_code_and_text() {
        let err = error_for_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            RelayError::Http { status: 502, ref message } if message == "upstream down"
        ));
    }

    #[test]
    fn empty_body_falls_back_to_reason() {
        let err = error_for_status(StatusCode::FORBIDDEN, "");
        assert!(matches!(
            err,
            RelayError::Http { status: 403, ref message } if message == "Forbidden"
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let relay = HttpRelay::new(HttpRelayConfig::new("https://relay.test/api/", "t")).unwrap();
        assert_eq!(relay.url("/projects"), "https://relay.test/api/projects");
    }

    #[test]
    fn config_debug_redacts_token() {
        let config = HttpRelayConfig::new("https://relay.test", "super-secret-token");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-token"));
    }
}
