//! Request/response boundary to the procurement backend.
//!
//! Implementations live outside the core crate (SQLite-backed local backend, HTTP
//! client). Everything crossing this boundary is in wire shape; [`wire::decode_document`]
//! is the one place that turns it into domain types.

pub mod wire;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::document::{DocumentId, ItemId, ProjectId};
use crate::domain::rfq::RfqData;
use crate::domain::vendor::VendorId;

pub use wire::{
    decode_document, decode_target_rates, encode_document, ContributingQuoteRecord, DecodeError,
    RawDocument, RawLineItem, TargetRateRecord,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("document `{0}` was not found")]
    NotFound(DocumentId),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRateRequest {
    pub item_ids: Vec<ItemId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub project_id: ProjectId,
    pub document_id: DocumentId,
    pub selected_items: Vec<ItemId>,
    pub selected_vendors: BTreeMap<ItemId, VendorId>,
    pub custom: bool,
}

/// Publishes the working RFQ and puts the document up for approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRfqRequest {
    pub document_id: DocumentId,
    pub rfq_data: RfqData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendBackRequest {
    /// Category documents: only the listed items go back for reconsideration.
    Items {
        document_id: DocumentId,
        selected_items: Vec<ItemId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    /// Custom documents: the whole document is rejected.
    Document {
        document_id: DocumentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
}

impl SendBackRequest {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Items { document_id, .. } | Self::Document { document_id, .. } => document_id,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::Items { comment, .. } | Self::Document { comment, .. } => comment.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { status: 200, message: Some(message.into()), error: None }
    }

    pub fn failed(status: u16, error: impl Into<String>) -> Self {
        Self { status, message: None, error: Some(error.into()) }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Server-provided explanation for a failed action.
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| format!("action failed with status {}", self.status))
    }
}

#[async_trait]
pub trait ProcurementGateway: Send + Sync {
    async fn fetch_document(&self, id: &DocumentId) -> Result<RawDocument, GatewayError>;
    async fn approve(&self, request: ApproveRequest) -> Result<ActionResponse, GatewayError>;
    async fn send_back(&self, request: SendBackRequest) -> Result<ActionResponse, GatewayError>;
    async fn submit_rfq(&self, request: SubmitRfqRequest) -> Result<ActionResponse, GatewayError>;
}

#[async_trait]
pub trait TargetRateSource: Send + Sync {
    async fn fetch_target_rates(
        &self,
        request: &TargetRateRequest,
    ) -> Result<Vec<TargetRateRecord>, GatewayError>;
}
