//! Query API client.

use reqwest::{Client, StatusCode};
use url::Url;
use uuid::Uuid;

use super::{ClientError, parse_response};
use crate::objects::{HealthResponse, MatchView, StatsResponse};

/// Typed HTTP client for the read-only query endpoints.
#[derive(Debug, Clone)]
pub struct QueryClient {
    http: Client,
    base_url: Url,
}

impl QueryClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = self.base_url.join("/health")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/stats`
    pub async fn stats(&self) -> Result<StatsResponse, ClientError> {
        let url = self.base_url.join("/api/v1/stats")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/matches/{match_id}`
    ///
    /// Returns `Ok(None)` when the match is unknown or already evicted.
    pub async fn get_match(&self, match_id: Uuid) -> Result<Option<MatchView>, ClientError> {
        let url = self.base_url.join(&format!("/api/v1/matches/{match_id}"))?;
        let resp = self.http.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_response(resp).await.map(Some)
    }
}
