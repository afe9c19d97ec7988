// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::EventError;
use crate::types::ChainEvent;
use crate::utils::token_id_to_node;
use ethers::types::{Address, U256};
use std::str::FromStr;

/// Decoded registry events, one variant per state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Transfer {
        from: Address,
        to: Address,
        token_id: U256,
    },
    NewUri {
        token_id: U256,
        uri: String,
    },
    Set {
        token_id: U256,
        key: String,
        value: String,
    },
    ResetRecords {
        token_id: U256,
    },
    Resolve {
        token_id: U256,
        to: Address,
    },
    Sync {
        resolver: Address,
        update_id: U256,
        token_id: U256,
    },
    SetReverse {
        address: Address,
        token_id: U256,
    },
    RemoveReverse {
        address: Address,
    },
    /// Journaled without touching the mirror.
    Other {
        name: String,
        token_id: Option<U256>,
    },
}

impl RegistryEvent {
    pub fn name(&self) -> &str {
        match self {
            RegistryEvent::Transfer { .. } => "Transfer",
            RegistryEvent::NewUri { .. } => "NewURI",
            RegistryEvent::Set { .. } => "Set",
            RegistryEvent::ResetRecords { .. } => "ResetRecords",
            RegistryEvent::Resolve { .. } => "Resolve",
            RegistryEvent::Sync { .. } => "Sync",
            RegistryEvent::SetReverse { .. } => "SetReverse",
            RegistryEvent::RemoveReverse { .. } => "RemoveReverse",
            RegistryEvent::Other { name, .. } => name,
        }
    }

    pub fn token_id(&self) -> Option<U256> {
        match self {
            RegistryEvent::Transfer { token_id, .. }
            | RegistryEvent::NewUri { token_id, .. }
            | RegistryEvent::Set { token_id, .. }
            | RegistryEvent::ResetRecords { token_id }
            | RegistryEvent::Resolve { token_id, .. }
            | RegistryEvent::Sync { token_id, .. }
            | RegistryEvent::SetReverse { token_id, .. } => Some(*token_id),
            RegistryEvent::RemoveReverse { .. } => None,
            RegistryEvent::Other { token_id, .. } => *token_id,
        }
    }

    pub fn node(&self) -> Option<String> {
        self.token_id().map(token_id_to_node)
    }

    pub fn is_mint_of(&self, token: U256) -> bool {
        matches!(
            self,
            RegistryEvent::Transfer { from, token_id, .. } if from.is_zero() && *token_id == token
        )
    }
}

impl TryFrom<&ChainEvent> for RegistryEvent {
    type Error = EventError;

    fn try_from(event: &ChainEvent) -> Result<Self, Self::Error> {
        let args = EventArgs(event);
        Ok(match event.event_name.as_str() {
            "Transfer" => RegistryEvent::Transfer {
                from: args.address("from")?,
                to: args.address("to")?,
                token_id: args.uint("tokenId")?,
            },
            "NewURI" => RegistryEvent::NewUri {
                token_id: args.uint("tokenId")?,
                uri: args.string("uri")?,
            },
            "Set" => RegistryEvent::Set {
                token_id: args.uint("tokenId")?,
                key: args.string("key")?,
                value: args.string("value")?,
            },
            "ResetRecords" => RegistryEvent::ResetRecords {
                token_id: args.uint("tokenId")?,
            },
            "Resolve" => RegistryEvent::Resolve {
                token_id: args.uint("tokenId")?,
                to: args.address("to")?,
            },
            "Sync" => RegistryEvent::Sync {
                resolver: args.address("resolver")?,
                update_id: args.uint("updateId")?,
                token_id: args.uint("tokenId")?,
            },
            "SetReverse" => RegistryEvent::SetReverse {
                address: args.address("addr")?,
                token_id: args.uint("tokenId")?,
            },
            "RemoveReverse" => RegistryEvent::RemoveReverse {
                address: args.address("addr")?,
            },
            other => RegistryEvent::Other {
                name: other.to_string(),
                token_id: event
                    .arg("tokenId")
                    .map(|_| args.uint("tokenId"))
                    .transpose()?,
            },
        })
    }
}

struct EventArgs<'a>(&'a ChainEvent);

impl EventArgs<'_> {
    fn raw(&self, arg: &'static str) -> Result<&str, EventError> {
        self.0.arg(arg).ok_or_else(|| EventError::MissingArgument {
            event: self.0.event_name.clone(),
            arg,
        })
    }

    fn invalid(&self, arg: &'static str, value: &str) -> EventError {
        EventError::InvalidArgument {
            event: self.0.event_name.clone(),
            arg,
            value: value.to_string(),
        }
    }

    fn string(&self, arg: &'static str) -> Result<String, EventError> {
        self.raw(arg).map(str::to_string)
    }

    fn uint(&self, arg: &'static str) -> Result<U256, EventError> {
        let value = self.raw(arg)?;
        U256::from_dec_str(value).map_err(|_| self.invalid(arg, value))
    }

    fn address(&self, arg: &'static str) -> Result<Address, EventError> {
        let value = self.raw(arg)?;
        Address::from_str(value).map_err(|_| self.invalid(arg, value))
    }
}
