//! Ledger bridge configuration.

use url::Url;

/// Connection to the external settlement collaborator.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the ledger bridge. Without one, settlement requests are
    /// only logged.
    pub endpoint: Option<Url>,
    /// Shared HMAC secret for outbound requests and inbound confirmations.
    pub secret: Box<[u8]>,
    pub request_timeout: std::time::Duration,
}

impl LedgerConfig {
    pub fn new(
        endpoint: Option<Url>,
        secret: impl Into<Box<[u8]>>,
        request_timeout: std::time::Duration,
    ) -> Self {
        Self {
            endpoint,
            secret: secret.into(),
            request_timeout,
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}
