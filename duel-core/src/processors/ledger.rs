//! Settlement collaborator boundary.
//!
//! The coordinator never calls the ledger bridge directly; the settlement
//! dispatcher invokes a [`LedgerGateway`] per queued job and feeds the
//! answer back as an event. Requests are never retried here: a failed
//! settlement is surfaced to the players as pending and left to the ledger.

use crate::config::LedgerConfig;
use async_trait::async_trait;
use duel_sdk::objects::{LedgerAck, PreStakeRefundRequest, SettlementRequest};
use duel_sdk::signature::{SIGNATURE_HEADER, Signature, SignedObject};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

/// Errors that can occur while talking to the ledger bridge.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The bridge answered with a non-success status.
    #[error("ledger rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid ledger endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("ledger request timed out")]
    Timeout,
}

/// The external ledger collaborator.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Ask the ledger to pay out a completed match.
    async fn request_settlement(&self, request: &SettlementRequest)
    -> Result<LedgerAck, LedgerError>;

    /// Ask the ledger to return a stake declared for a match that never
    /// started.
    async fn request_pre_stake_refund(
        &self,
        request: &PreStakeRefundRequest,
    ) -> Result<LedgerAck, LedgerError>;
}

/// Posts signed JSON requests to the ledger bridge.
///
/// The HMAC secret is read from the shared ledger config on every request,
/// so a reloaded secret applies to the next call.
pub struct HttpLedgerGateway {
    http: reqwest::Client,
    endpoint: Url,
    ledger: Arc<RwLock<LedgerConfig>>,
}

impl HttpLedgerGateway {
    pub fn new(
        endpoint: Url,
        ledger: Arc<RwLock<LedgerConfig>>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint,
            ledger,
        }
    }

    /// Resolve `path` below the configured endpoint, keeping any base path.
    fn endpoint_url(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.endpoint.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
    }

    async fn post<T: Signature + Clone>(&self, path: &str, body: &T) -> Result<LedgerAck, LedgerError> {
        let secret = self.ledger.read().await.secret.clone();
        let signed = SignedObject::new(body.clone(), &secret)?;
        let url = self.endpoint_url(path)?;
        debug!(url = %url, "Posting ledger request");

        let response = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(LedgerAck::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn request_settlement(
        &self,
        request: &SettlementRequest,
    ) -> Result<LedgerAck, LedgerError> {
        self.post("settlements", request).await
    }

    async fn request_pre_stake_refund(
        &self,
        request: &PreStakeRefundRequest,
    ) -> Result<LedgerAck, LedgerError> {
        self.post("refunds", request).await
    }
}

/// Stand-in used when no ledger endpoint is configured: logs and
/// acknowledges every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLedgerGateway;

#[async_trait]
impl LedgerGateway for LoggingLedgerGateway {
    async fn request_settlement(
        &self,
        request: &SettlementRequest,
    ) -> Result<LedgerAck, LedgerError> {
        info!(
            match_id = %request.match_id,
            stake = %request.stake_amount,
            result = ?request.result,
            "No ledger endpoint configured, settlement logged only"
        );
        Ok(LedgerAck::default())
    }

    async fn request_pre_stake_refund(
        &self,
        request: &PreStakeRefundRequest,
    ) -> Result<LedgerAck, LedgerError> {
        info!(
            participant = %request.participant,
            amount = %request.amount,
            "No ledger endpoint configured, refund logged only"
        );
        Ok(LedgerAck::default())
    }
}
