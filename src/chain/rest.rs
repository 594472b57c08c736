//! REST endpoint pool with failover, shared by the sidecar and Horizon clients

use crate::error::{RampError, RampResult};
use crate::ramp::Network;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RestPool {
    network: Network,
    client: reqwest::Client,
    endpoints: Vec<String>,
    current: AtomicUsize,
}

enum Body<'a, B> {
    None,
    Json(&'a B),
    Form(&'a B),
}

impl RestPool {
    pub fn new(network: Network, endpoints: &[String]) -> RampResult<Self> {
        let endpoints: Vec<String> = endpoints
            .iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if endpoints.is_empty() {
            return Err(RampError::chain(network, "no endpoints configured"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RampError::chain(network, e))?;

        Ok(Self {
            network,
            client,
            endpoints,
            current: AtomicUsize::new(0),
        })
    }

    fn base(&self) -> &str {
        let idx = self.current.load(Ordering::Relaxed);
        &self.endpoints[idx % self.endpoints.len()]
    }

    fn failover(&self) {
        let current = self.current.load(Ordering::Relaxed);
        let next = (current + 1) % self.endpoints.len();
        self.current.store(next, Ordering::Relaxed);
        warn!("{} failover to endpoint {}", self.network, next);
    }

    /// GET `path`; a 404 yields `None`
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> RampResult<Option<T>> {
        self.send::<(), T>(reqwest::Method::GET, path, Body::None).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> RampResult<T> {
        self.send(reqwest::Method::POST, path, Body::Json(body))
            .await?
            .ok_or_else(|| RampError::chain(self.network, format!("POST {} returned 404", path)))
    }

    pub async fn post_form<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> RampResult<T> {
        self.send(reqwest::Method::POST, path, Body::Form(body))
            .await?
            .ok_or_else(|| RampError::chain(self.network, format!("POST {} returned 404", path)))
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Body<'_, B>,
    ) -> RampResult<Option<T>> {
        let mut last_err = String::new();

        for _ in 0..self.endpoints.len() {
            let url = format!("{}{}", self.base(), path);
            let mut request = self.client.request(method.clone(), &url);
            request = match body {
                Body::None => request,
                Body::Json(b) => request.json(b),
                Body::Form(b) => request.form(b),
            };

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!("{} request to {} failed: {}", self.network, url, e);
                    last_err = e.to_string();
                    self.failover();
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status.is_server_error() {
                last_err = format!("{} returned {}", url, status);
                self.failover();
                continue;
            }
            if !status.is_success() {
                // Client errors are deterministic, another endpoint would answer the same
                let text = response.text().await.unwrap_or_default();
                return Err(RampError::chain(
                    self.network,
                    format!("{} returned {}: {}", url, status, text),
                ));
            }

            return response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| {
                    RampError::chain(self.network, format!("bad response from {}: {}", url, e))
                });
        }

        Err(RampError::chain(
            self.network,
            format!("all endpoints failed: {}", last_err),
        ))
    }
}
