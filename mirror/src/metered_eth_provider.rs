// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::metrics::MirrorMetrics;
use ethers::providers::{Http, HttpClientError, JsonRpcClient, Provider};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use url::{ParseError, Url};

/// Requests in flight per provider.
const MAX_CONCURRENT_REQUESTS: usize = 4;

/// Http transport that counts and times every request and spaces requests
/// at least `min_request_interval` apart. Failed requests, rate limits included,
/// are returned as they are.
#[derive(Debug, Clone)]
pub struct MeteredEthHttpProvider {
    inner: Http,
    metrics: Arc<MirrorMetrics>,
    semaphore: Arc<Semaphore>,
    min_request_interval: Duration,
    last_request_time: Arc<Mutex<Instant>>,
}

#[async_trait::async_trait]
impl JsonRpcClient for MeteredEthHttpProvider {
    type Error = HttpClientError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, HttpClientError> {
        // The semaphore is never closed, a failed acquire only drops the concurrency cap
        let _permit = self.semaphore.acquire().await.ok();

        if !self.min_request_interval.is_zero() {
            let mut last_request = self.last_request_time.lock().await;
            let elapsed = Instant::now().saturating_duration_since(*last_request);
            if elapsed < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - elapsed).await;
            }
            *last_request = Instant::now();
        }

        self.metrics.rpc_queries.with_label_values(&[method]).inc();
        let _guard = self
            .metrics
            .rpc_queries_latency
            .with_label_values(&[method])
            .start_timer();

        let result = self.inner.request(method, &params).await;
        if result.is_err() {
            self.metrics.rpc_errors.with_label_values(&[method]).inc();
        }
        result
    }
}

impl MeteredEthHttpProvider {
    pub fn new(
        url: impl Into<Url>,
        min_request_interval: Duration,
        metrics: Arc<MirrorMetrics>,
    ) -> Self {
        Self {
            inner: Http::new(url),
            metrics,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            min_request_interval,
            last_request_time: Arc::new(Mutex::new(
                Instant::now()
                    .checked_sub(min_request_interval)
                    .unwrap_or_else(Instant::now),
            )),
        }
    }
}

pub fn new_metered_eth_provider(
    url: &str,
    min_request_interval: Duration,
    metrics: Arc<MirrorMetrics>,
) -> Result<Provider<MeteredEthHttpProvider>, ParseError> {
    let http_provider =
        MeteredEthHttpProvider::new(Url::parse(url)?, min_request_interval, metrics);
    Ok(Provider::new(http_provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use ethers::providers::Middleware;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_metered_eth_provider() {
        let metrics = Arc::new(MirrorMetrics::new_for_testing());
        let provider =
            new_metered_eth_provider("http://localhost:9876", Duration::ZERO, metrics.clone())
                .unwrap();

        assert_eq!(
            metrics
                .rpc_queries
                .get_metric_with_label_values(&["eth_blockNumber"])
                .unwrap()
                .get(),
            0
        );

        provider.get_block_number().await.unwrap_err(); // the rpc call fails, only metrics matter

        assert_eq!(
            metrics
                .rpc_queries
                .get_metric_with_label_values(&["eth_blockNumber"])
                .unwrap()
                .get(),
            1
        );
        assert_eq!(
            metrics
                .rpc_queries_latency
                .get_metric_with_label_values(&["eth_blockNumber"])
                .unwrap()
                .get_sample_count(),
            1
        );
        assert_eq!(
            metrics
                .rpc_errors
                .get_metric_with_label_values(&["eth_blockNumber"])
                .unwrap()
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_returned_once() {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        let app = Router::new().route(
            "/",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "error": {"code": -32005, "message": "Too Many Requests"}
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let metrics = Arc::new(MirrorMetrics::new_for_testing());
        let provider =
            new_metered_eth_provider(&format!("http://{addr}"), Duration::ZERO, metrics.clone())
                .unwrap();
        let started = Instant::now();
        provider.get_block_number().await.unwrap_err();

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            metrics
                .rpc_errors
                .get_metric_with_label_values(&["eth_blockNumber"])
                .unwrap()
                .get(),
            1
        );
    }
}
