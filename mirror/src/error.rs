// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failures surfaced by a [`crate::chain_client::ChainClient`]. Never retried by the client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The contract call reverted or returned values that cannot be decoded.
    #[error("contract call reverted: {0}")]
    Reverted(String),
    /// Network, rate-limit or node availability failure.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// The node answered with a malformed payload (missing log fields, unknown block).
    #[error("provider error: {0}")]
    Provider(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
}

impl ChainError {
    pub fn is_revert(&self) -> bool {
        matches!(self, ChainError::Reverted(_))
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ChainError::Reverted(_) => "reverted",
            ChainError::Transient(_) => "transient",
            ChainError::Provider(_) => "provider",
            ChainError::BlockNotFound(_) => "block_not_found",
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Structural problems with a single event. The event is skipped and not recorded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("{event} event is missing argument `{arg}`")]
    MissingArgument { event: String, arg: &'static str },
    #[error("{event} event has invalid `{arg}`: {value}")]
    InvalidArgument {
        event: String,
        arg: &'static str,
        value: String,
    },
    #[error("{event} event was not processed: could not find domain for {node}")]
    DomainNotFound { event: &'static str, node: String },
    #[error("NewURI event was not processed: invalid domain name {name} for node {node}")]
    InvalidDomainName { name: String, node: String },
    #[error(
        "NewURI event was not processed: expected previous event to be the mint Transfer of {node}, got {previous}"
    )]
    UnexpectedEventOrder { node: String, previous: String },
}

impl EventError {
    pub fn reason(&self) -> &'static str {
        match self {
            EventError::MissingArgument { .. } => "missing_argument",
            EventError::InvalidArgument { .. } => "invalid_argument",
            EventError::DomainNotFound { .. } => "domain_not_found",
            EventError::InvalidDomainName { .. } => "invalid_domain_name",
            EventError::UnexpectedEventOrder { .. } => "unexpected_event_order",
        }
    }
}

/// Record lookups that the processor tolerates as "no data".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("no record key known for key hash {0}")]
    UnknownKeyHash(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error(
        "reorg too large: oldest recorded block {block_number} within the last {max_reorg_depth} recorded blocks diverged, manual resync required"
    )]
    ReorgTooDeep {
        block_number: u64,
        max_reorg_depth: u64,
    },
    #[error("invalid block range: to block {to_block} is behind mirrored block {from_block}")]
    InvalidRange { from_block: u64, to_block: u64 },
    #[error("two events share position (block {block_number}, log index {log_index})")]
    DuplicateEventPosition { block_number: u64, log_index: u64 },
}

impl MirrorError {
    /// Whether the run must stop and an operator be alerted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MirrorError::ReorgTooDeep { .. }
                | MirrorError::InvalidRange { .. }
                | MirrorError::DuplicateEventPosition { .. }
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            MirrorError::Event(_) => "event",
            MirrorError::Chain(e) => e.error_type(),
            MirrorError::Storage(_) => "storage",
            MirrorError::ReorgTooDeep { .. } => "reorg_too_deep",
            MirrorError::InvalidRange { .. } => "invalid_range",
            MirrorError::DuplicateEventPosition { .. } => "duplicate_event_position",
        }
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MirrorError::ReorgTooDeep {
            block_number: 10,
            max_reorg_depth: 5
        }
        .is_fatal());
        assert!(MirrorError::InvalidRange {
            from_block: 10,
            to_block: 5
        }
        .is_fatal());
        assert!(!MirrorError::Chain(ChainError::Transient("timeout".into())).is_fatal());
        assert!(!MirrorError::Storage(anyhow::anyhow!("connection reset")).is_fatal());
    }

    #[test]
    fn test_error_type_labels() {
        assert_eq!(
            MirrorError::Chain(ChainError::Reverted("0x".into())).error_type(),
            "reverted"
        );
        assert!(ChainError::Reverted("execution reverted".into()).is_revert());
        assert!(!ChainError::BlockNotFound(3).is_revert());
    }
}
