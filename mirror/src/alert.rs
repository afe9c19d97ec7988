// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator alerts for repaired reorganizations and fatal sync errors.
//!
//! Alerts are posted as JSON to a webhook. Without a configured webhook they are
//! only logged.

use crate::types::ChainId;
use crate::utils::truncate_hash;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    ReorgRepaired {
        chain: String,
        fork_block: u64,
        depth: u64,
        rebuilt_domains: usize,
        fork_hash: String,
    },
    /// The chain's sync stopped and needs an operator.
    SyncHalted { chain: String, error: String },
}

impl Alert {
    pub fn reorg_repaired(
        chain: ChainId,
        fork_block: u64,
        depth: u64,
        rebuilt_domains: usize,
        fork_hash: &str,
    ) -> Self {
        Alert::ReorgRepaired {
            chain: chain.to_string(),
            fork_block,
            depth,
            rebuilt_domains,
            fork_hash: fork_hash.to_string(),
        }
    }

    pub fn sync_halted(chain: ChainId, error: impl ToString) -> Self {
        Alert::SyncHalted {
            chain: chain.to_string(),
            error: error.to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Alert::ReorgRepaired {
                chain,
                fork_block,
                depth,
                rebuilt_domains,
                fork_hash,
            } => format!(
                "[Domain Mirror] Chain reorganization repaired on {}\n\
                Fork point: {} ({})\n\
                Depth: {} blocks\n\
                Rebuilt domains: {}",
                chain,
                fork_block,
                truncate_hash(fork_hash),
                depth,
                rebuilt_domains
            ),
            Alert::SyncHalted { chain, error } => format!(
                "[Domain Mirror] Sync of {} halted, manual action required\n\
                Error: {}",
                chain, error
            ),
        }
    }
}

pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self { client, url })
    }

    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Deliver an alert. Delivery failures are logged and never propagated.
    pub async fn notify(&self, alert: &Alert) {
        let message = alert.message();
        let Some(url) = self.url.as_deref().filter(|url| !url.is_empty()) else {
            info!("Alert webhook not configured, would send: {}", message);
            return;
        };

        for attempt in 0..MAX_RETRIES {
            match self
                .client
                .post(url)
                .json(&json!({
                    "text": message,
                    "alert": alert,
                }))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => {
                    warn!(
                        "Alert delivery attempt {}/{} failed: {}",
                        attempt + 1,
                        MAX_RETRIES,
                        resp.status()
                    );
                }
                Err(e) => {
                    warn!(
                        "Alert delivery attempt {}/{} failed: {:?}",
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                }
            }

            if attempt < MAX_RETRIES - 1 {
                tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS * (attempt as u64 + 1)))
                    .await;
            }
        }

        warn!("Failed to deliver alert after {} attempts", MAX_RETRIES);
    }
}

pub type SharedNotifier = Arc<WebhookNotifier>;
