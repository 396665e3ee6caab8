//! Helpers for the ledger bridge side.
//!
//! The bridge reports on-chain progress with [`LedgerNotifier`] and
//! authenticates the coordinator's settlement and refund requests with
//! [`verify_ledger_request`].

use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::{ConfirmationReceipt, LedgerConfirmation};
use crate::signature::{SIGNATURE_HEADER, Signature, SignatureError, SignedObject};

/// Posts signed [`LedgerConfirmation`]s to the coordinator.
#[derive(Debug, Clone)]
pub struct LedgerNotifier {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
}

impl LedgerNotifier {
    /// * `base_url` – root URL of the coordinator.
    /// * `secret` – the HMAC secret shared with the coordinator.
    pub fn new(base_url: Url, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/ledger/confirmations`
    pub async fn confirm(
        &self,
        confirmation: LedgerConfirmation,
    ) -> Result<ConfirmationReceipt, ClientError> {
        let signed = SignedObject::new(confirmation, &self.secret).map_err(ClientError::Json)?;

        let url = self.base_url.join("/api/v1/ledger/confirmations")?;

        let resp = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await?;

        parse_response(resp).await
    }
}

/// Verify and deserialize a request sent by the coordinator.
///
/// * `signature_header` – value of the `Duel-Signature` request header.
/// * `body` – raw JSON request body string.
/// * `secret` – the HMAC secret shared with the coordinator.
///
/// # Example
///
/// ```ignore
/// use duel_sdk::client::verify_ledger_request;
/// use duel_sdk::objects::SettlementRequest;
///
/// let request: SettlementRequest =
///     verify_ledger_request(signature_header, &body, ledger_secret)?;
/// ```
pub fn verify_ledger_request<T: Signature>(
    signature_header: &str,
    body: &str,
    secret: &[u8],
) -> Result<T, SignatureError> {
    SignedObject::<T>::from_header_and_body(signature_header, body.to_owned())?.verify(secret)
}
