use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::KioskError;
use crate::events::Role;

/// Status of a call request as reported by the call service.
///
/// Unrecognized strings deserialize to `Unknown`, which the poll loop
/// treats as a no-op tick and keeps polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ringing,
    Accepted,
    NoDoctor,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartCallResponse {
    pub call_id: String,
    pub status: CallStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: CallStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinRequest {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub call_id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

/// Join response. Either `{token, sessionName}` credentials or a legacy
/// `{meetingNumber, password?}` redirect payload; all fields optional so
/// the resolver can check the redirect variant first.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinResponse {
    pub token: Option<String>,
    #[serde(rename = "sessionName")]
    pub session_name: Option<String>,
    #[serde(rename = "meetingNumber")]
    pub meeting_number: Option<String>,
    pub password: Option<String>,
}

/// REST boundary to the on-call matching service.
#[async_trait]
pub trait CallApi: Send + Sync {
    async fn start_call(&self, location_id: &str) -> Result<StartCallResponse, KioskError>;
    async fn call_status(&self, call_id: &str) -> Result<StatusResponse, KioskError>;
    async fn join_call(&self, request: &JoinRequest) -> Result<JoinResponse, KioskError>;
}

/// `CallApi` over HTTP, against the `/qr/calls` routes.
pub struct HttpCallApi {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpCallApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Turn a non-success response into a transport error, preferring the
    /// server-provided message over the bare status code.
    async fn error_from_response(resp: reqwest::Response) -> KioskError {
        let status = resp.status();
        if let Ok(body) = resp.json::<ApiErrorBody>().await {
            if let Some(msg) = body.error.or(body.message).filter(|m| !m.is_empty()) {
                return KioskError::Transport(msg);
            }
        }
        KioskError::Transport(format!("call service returned status {status}"))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, KioskError> {
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| KioskError::Transport(format!("invalid call service response: {e}")))
    }
}

#[async_trait]
impl CallApi for HttpCallApi {
    async fn start_call(&self, location_id: &str) -> Result<StartCallResponse, KioskError> {
        let url = format!("{}/qr/calls/start", self.base_url);
        tracing::info!("starting call for location {location_id}");
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "location_id": location_id }))
            .send()
            .await
            .map_err(|e| KioskError::Transport(e.to_string()))?;
        Self::read_json(resp).await
    }

    async fn call_status(&self, call_id: &str) -> Result<StatusResponse, KioskError> {
        let url = format!("{}/qr/calls/{}/status", self.base_url, call_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| KioskError::Transport(e.to_string()))?;
        Self::read_json(resp).await
    }

    async fn join_call(&self, request: &JoinRequest) -> Result<JoinResponse, KioskError> {
        let url = format!("{}/qr/calls/{}/join", self.base_url, request.call_id);
        tracing::info!("requesting session join for call {}", request.call_id);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| KioskError::Transport(e.to_string()))?;
        Self::read_json(resp).await
    }
}
