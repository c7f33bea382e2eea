use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{header::ACCEPT, Method};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use shared::poap::{PoapEvent, PoapToken, QrClaimInfo, QrCode, RedeemedPoap};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::config::PoapConfig;
use crate::metrics::Metrics;

const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 60 * 60);
const HOLDER_TOKENS_TTL: Duration = Duration::from_secs(60);

/// The badge-minting platform. Every call returns `None` on failure after
/// logging it; callers defer to their next scheduled interval.
#[async_trait]
pub trait BadgePlatform: Send + Sync {
    async fn unused_codes(&self, event_id: i64, secret: &str) -> Option<Vec<String>>;
    async fn holder_tokens(&self, address: &str) -> Option<Vec<PoapToken>>;
    async fn event_info(&self, event_id: i64) -> Option<PoapEvent>;
    async fn token_info(&self, token_id: &str) -> Option<PoapToken>;
    async fn clear_token_cache(&self, token_id: &str);
    async fn claim_info(&self, qr_hash: &str) -> Option<QrClaimInfo>;
    async fn redeem(&self, address: &str, qr_hash: &str) -> Option<RedeemedPoap>;
    /// Codes are not returned; they arrive in the event's inventory later.
    async fn request_codes(&self, event_id: i64, secret: &str, count: u32) -> bool;
}

struct AccessToken {
    value: String,
    fetched_at: Instant,
}

#[derive(Deserialize)]
struct AuthResponse {
    access_token: String,
}

pub struct PoapClient {
    client: reqwest::Client,
    config: PoapConfig,
    metrics: Arc<Metrics>,
    access_token: Mutex<Option<AccessToken>>,
    holder_tokens: Cache<String, Vec<PoapToken>>,
    events: Cache<i64, PoapEvent>,
    tokens: Cache<String, PoapToken>,
}

impl PoapClient {
    pub fn new(config: PoapConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            metrics,
            access_token: Mutex::new(None),
            holder_tokens: Cache::builder().time_to_live(HOLDER_TOKENS_TTL).build(),
            events: Cache::builder().build(),
            tokens: Cache::builder().build(),
        }
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut guard = self.access_token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.fetched_at.elapsed() < ACCESS_TOKEN_LIFETIME {
                return Ok(token.value.clone());
            }
        }

        tracing::info!("Retrieving a new POAP API token");
        let response = self
            .client
            .post(format!("{}/oauth/token", self.config.auth_url))
            .json(&json!({
                "audience": "gitpoap",
                "grant_type": "client_credentials",
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Bad response ({status}) from POAP auth: {text}");
        }
        let data: AuthResponse = response
            .json()
            .await
            .context("Failed to parse POAP auth response")?;

        *guard = Some(AccessToken {
            value: data.access_token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(data.access_token)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> anyhow::Result<T> {
        let token = self.access_token().await?;
        let mut request = self
            .client
            .request(method, format!("{}{}", self.config.api_url, path))
            .bearer_auth(token)
            .header("X-API-Key", &self.config.api_key)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Bad response ({status}): {text}");
        }
        Ok(response.json::<T>().await?)
    }

    /// `route` is the templated path used as the metric label.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        route: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Option<T> {
        let started = Instant::now();
        let result = self.send(method.clone(), path, body).await;
        self.metrics
            .observe_poap_request(method.as_str(), route, result.is_ok(), started);

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Error while calling POAP API {method} {path}: {e:#}");
                None
            }
        }
    }
}

#[async_trait]
impl BadgePlatform for PoapClient {
    #[instrument(skip(self, secret))]
    async fn unused_codes(&self, event_id: i64, secret: &str) -> Option<Vec<String>> {
        let codes: Vec<QrCode> = self
            .request(
                Method::POST,
                "/event/:id/qr-codes",
                &format!("/event/{event_id}/qr-codes"),
                Some(json!({ "secret_code": secret })),
            )
            .await?;
        Some(
            codes
                .into_iter()
                .filter(|code| !code.claimed)
                .map(|code| code.qr_hash)
                .collect(),
        )
    }

    #[instrument(skip(self))]
    async fn holder_tokens(&self, address: &str) -> Option<Vec<PoapToken>> {
        if let Some(tokens) = self.holder_tokens.get(address).await {
            tracing::debug!("Found tokens of {address} in cache");
            return Some(tokens);
        }

        let tokens: Vec<PoapToken> = self
            .request(
                Method::GET,
                "/actions/scan/:address",
                &format!("/actions/scan/{address}"),
                None,
            )
            .await?;
        self.holder_tokens
            .insert(address.to_string(), tokens.clone())
            .await;
        Some(tokens)
    }

    #[instrument(skip(self))]
    async fn event_info(&self, event_id: i64) -> Option<PoapEvent> {
        if let Some(event) = self.events.get(&event_id).await {
            return Some(event);
        }

        let event: PoapEvent = self
            .request(
                Method::GET,
                "/events/id/:id",
                &format!("/events/id/{event_id}"),
                None,
            )
            .await?;
        self.events.insert(event_id, event.clone()).await;
        Some(event)
    }

    #[instrument(skip(self))]
    async fn token_info(&self, token_id: &str) -> Option<PoapToken> {
        if let Some(token) = self.tokens.get(token_id).await {
            return Some(token);
        }

        let token: PoapToken = self
            .request(
                Method::GET,
                "/token/:id",
                &format!("/token/{token_id}"),
                None,
            )
            .await?;
        self.tokens
            .insert(token_id.to_string(), token.clone())
            .await;
        Some(token)
    }

    async fn clear_token_cache(&self, token_id: &str) {
        self.tokens.invalidate(token_id).await;
    }

    #[instrument(skip(self))]
    async fn claim_info(&self, qr_hash: &str) -> Option<QrClaimInfo> {
        self.request(
            Method::GET,
            "/actions/claim-qr",
            &format!("/actions/claim-qr?qr_hash={qr_hash}"),
            None,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn redeem(&self, address: &str, qr_hash: &str) -> Option<RedeemedPoap> {
        let Some(info) = self.claim_info(qr_hash).await else {
            tracing::error!("Failed to retrieve minting secret for qr_hash {qr_hash}");
            return None;
        };

        self.request(
            Method::POST,
            "/actions/claim-qr",
            "/actions/claim-qr",
            Some(json!({
                "address": address,
                "qr_hash": qr_hash,
                "secret": info.secret,
            })),
        )
        .await
    }

    #[instrument(skip(self, secret))]
    async fn request_codes(&self, event_id: i64, secret: &str, count: u32) -> bool {
        self.request::<serde_json::Value>(
            Method::POST,
            "/redeem-requests",
            "/redeem-requests",
            Some(json!({
                "event_id": event_id,
                "requested_codes": count,
                "secret_code": secret,
                "redeem_type": "qr_code",
            })),
        )
        .await
        .is_some()
    }
}
