//! HTTP client for a remote procurement backend.
//!
//! Endpoints, relative to the configured base url:
//! - `GET  api/documents/{id}`
//! - `POST api/documents/{id}/approve`
//! - `POST api/documents/{id}/send-back`
//! - `POST api/documents/{id}/submit-rfq`
//! - `POST api/target-rates`
//!
//! Every request carries `Authorization: Bearer <token>`. Action endpoints answer with
//! `{ status, message | error }`; a non-2xx HTTP status is reported through the same
//! shape so the review session can surface the server's explanation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use procura_core::config::GatewayConfig;
use procura_core::domain::document::DocumentId;
use procura_core::gateway::{
    ActionResponse, ApproveRequest, GatewayError, ProcurementGateway, RawDocument,
    SendBackRequest, SubmitRfqRequest, TargetRateRecord, TargetRateRequest, TargetRateSource,
};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("gateway.base_url is required for the remote gateway")]
    MissingBaseUrl,
    #[error("gateway.api_token is required for the remote gateway")]
    MissingToken,
    #[error("could not build http client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct HttpProcurementGateway {
    client: Client,
    base_url: String,
    api_token: SecretString,
}

/// Target-rate responses arrive either as a bare array or wrapped in `message`/`data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TargetRateEnvelope {
    Bare(Vec<TargetRateRecord>),
    Message { message: Vec<TargetRateRecord> },
    Data { data: Vec<TargetRateRecord> },
}

impl TargetRateEnvelope {
    fn into_records(self) -> Vec<TargetRateRecord> {
        match self {
            Self::Bare(records) | Self::Message { message: records } | Self::Data { data: records } => {
                records
            }
        }
    }
}

impl HttpProcurementGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RemoteError::MissingBaseUrl);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url, api_token })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, RemoteError> {
        let base_url = config.base_url.clone().ok_or(RemoteError::MissingBaseUrl)?;
        let api_token = config.api_token.clone().ok_or(RemoteError::MissingToken)?;
        Self::new(base_url, api_token, Duration::from_secs(config.timeout_secs.max(1)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn document_url(&self, id: &DocumentId, suffix: &str) -> String {
        self.url(&format!("api/documents/{}{suffix}", encode_segment(&id.0)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.api_token.expose_secret())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        self.authorized(request).send().await.map_err(|error| {
            warn!(event_name = "remote.request.failed", error = %error, "procurement backend unreachable");
            GatewayError::Unavailable(error.to_string())
        })
    }

    async fn post_action<T: serde::Serialize + Sync>(
        &self,
        url: String,
        body: &T,
    ) -> Result<ActionResponse, GatewayError> {
        let response = self.send(self.client.post(&url).json(body)).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| GatewayError::InvalidResponse(error.to_string()))?;
        debug!(event_name = "remote.action.response", url = %url, status = status.as_u16(), "action response");
        Ok(interpret_action(status, &body))
    }
}

/// Percent-encodes the characters that would change a path segment's meaning.
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(char::from(byte))
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let body = response.text().await.map_err(|error| GatewayError::InvalidResponse(error.to_string()))?;
    serde_json::from_str(&body).map_err(|error| GatewayError::InvalidResponse(error.to_string()))
}

/// Maps an action reply onto [`ActionResponse`]. The HTTP status wins over a body that
/// claims success, and a body without a usable message falls back to the raw text.
fn interpret_action(status: StatusCode, body: &str) -> ActionResponse {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|value| value.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|text| !text.trim().is_empty())
    };
    let body_status = parsed
        .as_ref()
        .and_then(|value| value.get("status"))
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok());

    if status.is_success() {
        let status = body_status.unwrap_or(200);
        if status == 200 {
            return ActionResponse { status, message: field("message"), error: None };
        }
        return ActionResponse {
            status,
            message: field("message"),
            error: field("error").or_else(|| field("message")),
        };
    }

    let error = field("error")
        .or_else(|| field("message"))
        .or_else(|| Some(body.trim().to_string()).filter(|text| !text.is_empty()));
    ActionResponse { status: status.as_u16(), message: None, error }
}

#[async_trait]
impl ProcurementGateway for HttpProcurementGateway {
    async fn fetch_document(&self, id: &DocumentId) -> Result<RawDocument, GatewayError> {
        let response = self.send(self.client.get(self.document_url(id, ""))).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(id.clone())),
            status if status.is_success() => read_json(response).await,
            status => Err(GatewayError::Unavailable(format!("document fetch returned {status}"))),
        }
    }

    async fn approve(&self, request: ApproveRequest) -> Result<ActionResponse, GatewayError> {
        let url = self.document_url(&request.document_id, "/approve");
        self.post_action(url, &request).await
    }

    async fn send_back(&self, request: SendBackRequest) -> Result<ActionResponse, GatewayError> {
        let url = self.document_url(request.document_id(), "/send-back");
        self.post_action(url, &request).await
    }

    async fn submit_rfq(&self, request: SubmitRfqRequest) -> Result<ActionResponse, GatewayError> {
        let url = self.document_url(&request.document_id, "/submit-rfq");
        self.post_action(url, &request).await
    }
}

#[async_trait]
impl TargetRateSource for HttpProcurementGateway {
    async fn fetch_target_rates(
        &self,
        request: &TargetRateRequest,
    ) -> Result<Vec<TargetRateRecord>, GatewayError> {
        let response = self.send(self.client.post(self.url("api/target-rates")).json(request)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Unavailable(format!("target-rate lookup returned {status}")));
        }
        read_json::<TargetRateEnvelope>(response).await.map(TargetRateEnvelope::into_records)
    }
}
