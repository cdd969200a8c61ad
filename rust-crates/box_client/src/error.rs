use alloy_primitives::{
    Address,
    B256,
};
use thiserror::Error;

pub const USER_REJECTED_CODE: i64 = 4001;
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

const REVERT_PREFIX: &str = "execution reverted:";

/// Failures reported by the wallet or node, with EIP-1193 semantics.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("user rejected the request")]
    UserRejected,
    /// The chain id is known when the wallet names it; a bare 4902 response
    /// does not.
    #[error("requested chain has not been added to the wallet")]
    UnrecognizedChain(Option<u64>),
    #[error("rpc error (code {code:?}): {message}")]
    Rpc { code: Option<i64>, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        match code {
            USER_REJECTED_CODE => ProviderError::UserRejected,
            UNRECOGNIZED_CHAIN_CODE => ProviderError::UnrecognizedChain(None),
            _ => ProviderError::Rpc {
                code: Some(code),
                message: message.into(),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ProviderError::Rpc { message, .. } | ProviderError::Transport(message) => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("no wallet provider detected")]
    NoProviderDetected,
    #[error("wallet connection was rejected")]
    UserRejected,
    #[error("transaction signature was rejected in the wallet")]
    UserRejectedSignature,
    #[error("wrong network: expected chain {expected}, wallet is on chain {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },
    #[error("chain {chain_id} is not configured in the wallet")]
    UnsupportedNetwork { chain_id: u64 },
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("transaction rejected: {0}")]
    RemoteRejected(String),
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("transaction {tx_hash} confirmed but no {event} event could be decoded")]
    DecodeInconsistency { tx_hash: B256, event: &'static str },
    #[error("wallet is not connected")]
    NotConnected,
    #[error("a transaction for this action is already pending")]
    AlreadyPending,
    #[error("box #{token_id} cannot be opened: {reason}")]
    NotOpenable { token_id: u64, reason: String },
    #[error("box #{token_id} has an invalid on-chain record: {reason}")]
    InvalidBoxRecord { token_id: u64, reason: String },
    #[error("no contract code found at {address}")]
    ContractNotDeployed { address: Address },
}

/// Read failures are never the user's fault; they all mean the node could not
/// answer.
pub fn classify_read(err: ProviderError) -> ClientError {
    ClientError::RemoteUnavailable(err.message())
}

pub fn classify_submission(err: ProviderError) -> ClientError {
    match err {
        ProviderError::UserRejected => ClientError::UserRejectedSignature,
        other => {
            let message = other.message();
            if message.to_lowercase().contains("insufficient funds") {
                ClientError::InsufficientFunds(revert_reason(&message))
            } else {
                ClientError::RemoteRejected(revert_reason(&message))
            }
        }
    }
}

pub fn classify_session(err: ProviderError) -> ClientError {
    match err {
        ProviderError::UserRejected => ClientError::UserRejected,
        ProviderError::UnrecognizedChain(Some(chain_id)) => {
            ClientError::UnsupportedNetwork { chain_id }
        }
        other => ClientError::RemoteUnavailable(other.message()),
    }
}

/// The most readable part of a node error message: the revert reason when the
/// node reports one, the raw message otherwise.
pub fn revert_reason(message: &str) -> String {
    match message.find(REVERT_PREFIX) {
        Some(idx) => {
            let reason = message[idx + REVERT_PREFIX.len()..].trim();
            if reason.is_empty() {
                "execution reverted".to_string()
            } else {
                reason.to_string()
            }
        }
        None => message.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn classify_submission__maps_user_rejection_to_signature_rejection() {
        let err = ProviderError::from_code(USER_REJECTED_CODE, "User denied");
        assert_eq!(classify_submission(err), ClientError::UserRejectedSignature);
    }

    #[test]
    fn classify_submission__detects_insufficient_funds_in_message() {
        // given
        let err = ProviderError::Rpc {
            code: Some(-32000),
            message: "Insufficient funds for gas * price + value".to_string(),
        };

        // when
        let classified = classify_submission(err);

        // then
        assert_eq!(
            classified,
            ClientError::InsufficientFunds(
                "Insufficient funds for gas * price + value".to_string()
            )
        );
    }

    #[test]
    fn classify_submission__extracts_revert_reason() {
        // given
        let err = ProviderError::Rpc {
            code: Some(3),
            message: "execution reverted: Incorrect payment amount".to_string(),
        };

        // when
        let classified = classify_submission(err);

        // then
        assert_eq!(
            classified,
            ClientError::RemoteRejected("Incorrect payment amount".to_string())
        );
    }

    #[test]
    fn classify_session__maps_unrecognized_chain_to_unsupported_network() {
        let err = ProviderError::UnrecognizedChain(Some(11_155_111));
        assert_eq!(
            classify_session(err),
            ClientError::UnsupportedNetwork {
                chain_id: 11_155_111
            }
        );
    }

    #[test]
    fn from_code__maps_eip1193_codes() {
        assert_eq!(
            ProviderError::from_code(USER_REJECTED_CODE, "User denied"),
            ProviderError::UserRejected
        );
        assert_eq!(
            ProviderError::from_code(UNRECOGNIZED_CHAIN_CODE, "Unrecognized chain ID"),
            ProviderError::UnrecognizedChain(None)
        );
        assert_eq!(
            ProviderError::from_code(-32000, "nonce too low"),
            ProviderError::Rpc {
                code: Some(-32000),
                message: "nonce too low".to_string(),
            }
        );
    }

    #[test]
    fn classify_read__reports_remote_unavailable() {
        let err = ProviderError::Transport("connection refused".to_string());
        assert_eq!(
            classify_read(err),
            ClientError::RemoteUnavailable("connection refused".to_string())
        );
    }

    #[test]
    fn revert_reason__falls_back_for_bare_revert() {
        assert_eq!(revert_reason("execution reverted: "), "execution reverted");
        assert_eq!(revert_reason(" nonce too low "), "nonce too low");
    }
}
