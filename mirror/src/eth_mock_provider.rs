// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, MockError};
use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// JSON-RPC client answering from canned responses keyed by method and params.
#[derive(Debug, Clone, Default)]
pub struct EthMockProvider {
    responses: Arc<Mutex<HashMap<(String, String), serde_json::Value>>>,
}

impl EthMockProvider {
    pub fn add_response<P, R, K>(&self, method: &str, params: P, data: K) -> Result<(), MockError>
    where
        P: Serialize,
        R: Serialize,
        K: Borrow<R>,
    {
        let params = serde_json::to_string(&params)?;
        let value = serde_json::to_value(data.borrow())?;
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), params), value);
        Ok(())
    }
}

#[async_trait]
impl JsonRpcClient for EthMockProvider {
    type Error = MockError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, MockError> {
        let params = serde_json::to_string(&params)?;
        let value = self
            .responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), params))
            .cloned()
            .ok_or(MockError::EmptyResponses)?;
        Ok(serde_json::from_value(value)?)
    }
}
