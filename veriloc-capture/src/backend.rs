//! Backend and challenge-provider ports, plus the HTTP adapter
//!
//! The workflow talks to two external collaborators: a challenge provider
//! (bot check) and the submission backend. Both are ports so tests can
//! script them; [`HttpBackend`] is the production adapter for the backend's
//! two endpoints: token verification and location submission.

use crate::session::SessionSnapshot;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use veriloc_common::{Error, Identity, Result, SubmissionReceipt};
use veriloc_common::config::SubmissionConfig;

/// Opaque proof that a human initiated the submission.
///
/// Issued by the challenge provider with a provider-defined expiry; held
/// only for the duration of one attempt, never cached across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken(String);

impl VerificationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Port for the third-party bot-check challenge.
///
/// `open` suspends until the user completes (or fails) the challenge; the
/// pipeline drives only the handshake, never the challenge itself.
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    async fn open(&self) -> Result<VerificationToken>;
}

/// Port for the backend submission endpoint
#[async_trait]
pub trait SubmissionBackend: Send + Sync {
    /// Verify the challenge token server-side (single round trip)
    async fn verify_token(&self, token: &VerificationToken) -> Result<()>;

    /// Submit the snapshot. Errors are classified:
    /// `ValidationRejected` (4xx, terminal), `TransientSubmissionFailure`
    /// (transport/timeout/5xx, retryable).
    async fn submit(
        &self,
        snapshot: &SessionSnapshot,
        identity: &Identity,
        token: &VerificationToken,
    ) -> Result<SubmissionReceipt>;
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AddLocationResponse {
    #[serde(alias = "record_id")]
    id: String,
    #[serde(default)]
    message: String,
}

/// HTTP adapter for the backend's verify and submit endpoints
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, config: &SubmissionConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::TransientSubmissionFailure(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SubmissionBackend for HttpBackend {
    async fn verify_token(&self, token: &VerificationToken) -> Result<()> {
        let url = format!("{}/api/verify-recaptcha", self.base_url);
        tracing::debug!(url = %url, "Verifying challenge token");

        let response = self
            .http_client
            .post(&url)
            .json(&json!({ "token": token.as_str() }))
            .send()
            .await
            .map_err(|e| Error::VerificationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::VerificationFailed(format!(
                "verification endpoint returned {}",
                response.status()
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| Error::VerificationFailed(format!("unparseable response: {}", e)))?;

        if !body.success {
            let reason = if body.message.is_empty() {
                "challenge rejected".to_string()
            } else {
                body.message
            };
            return Err(Error::VerificationFailed(reason));
        }

        tracing::info!("Challenge token verified");
        Ok(())
    }

    async fn submit(
        &self,
        snapshot: &SessionSnapshot,
        identity: &Identity,
        token: &VerificationToken,
    ) -> Result<SubmissionReceipt> {
        let url = format!("{}/api/location/add", self.base_url);
        tracing::debug!(
            url = %url,
            session_id = %snapshot.session_id,
            idempotency_key = %snapshot.idempotency_key,
            "Submitting location"
        );

        let mut request = self
            .http_client
            .post(&url)
            .header("Idempotency-Key", snapshot.idempotency_key.to_string())
            .json(&json!({
                "userID": identity.user_id,
                "address": snapshot.address,
                "coordinate": {
                    "latitude": snapshot.coordinate.latitude,
                    "longitude": snapshot.coordinate.longitude,
                },
                "media": {
                    "uri": snapshot.media.uri,
                    "type": snapshot.media.content_type,
                },
                "rotationDegrees": snapshot.accumulated_degrees,
                "recaptchaToken": token.as_str(),
            }));
        if let Some(auth) = &identity.auth_token {
            request = request.bearer_auth(auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::TransientSubmissionFailure(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let reason = rejection_reason(status.as_u16(), &response.text().await.unwrap_or_default());
            return Err(Error::ValidationRejected(reason));
        }
        if !status.is_success() {
            return Err(Error::TransientSubmissionFailure(format!(
                "submission endpoint returned {}",
                status
            )));
        }

        let body: AddLocationResponse = response
            .json()
            .await
            .map_err(|e| Error::TransientSubmissionFailure(format!("unparseable response: {}", e)))?;

        tracing::info!(record_id = %body.id, "Location submission accepted");
        Ok(SubmissionReceipt {
            record_id: body.id,
            message: body.message,
        })
    }
}

/// Extract the server's reported reason verbatim, falling back to the status
fn rejection_reason(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or_else(|| format!("submission rejected with status {}", status))
}
