use serde::Serialize;
use std::sync::Arc;

use crate::{
    error::Result,
    models::TransactionRequest,
    utils::short_hex,
    wallet::{ContractCall, WalletConnector},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionState {
    Idle,
    /// A network switch was requested; the next attempt submits.
    SwitchingNetwork {
        from_chain_id: u64,
        target_chain_id: u64,
    },
    Submitted {
        hash: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confirmed: Option<bool>,
    },
    Failed {
        error: String,
    },
}

impl TransactionState {
    pub fn hash(&self) -> Option<&str> {
        match self {
            TransactionState::Submitted { hash, .. } => Some(hash),
            _ => None,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, TransactionState::Submitted { .. })
    }
}

/// Submits a validated contract call through the connected wallet.
pub struct TransactionHandler {
    wallet: Arc<dyn WalletConnector>,
}

impl TransactionHandler {
    pub fn new(wallet: Arc<dyn WalletConnector>) -> Self {
        Self { wallet }
    }

    /// One user-triggered attempt. Never retries on its own.
    pub async fn run(&self, request: &TransactionRequest) -> TransactionState {
        let current = match self.wallet.chain_id().await {
            Ok(id) => id,
            Err(e) => return failed(e.to_string()),
        };

        if current != request.chain_id {
            tracing::info!(
                "Wallet on chain {}, switching to {} before submitting",
                current,
                request.chain_id
            );
            return match self.wallet.switch_chain(request.chain_id).await {
                Ok(()) => TransactionState::SwitchingNetwork {
                    from_chain_id: current,
                    target_chain_id: request.chain_id,
                },
                Err(e) => failed(e.to_string()),
            };
        }

        let call = match ContractCall::from_request(request) {
            Ok(call) => call,
            Err(e) => return failed(e.to_string()),
        };

        match self.wallet.send_transaction(&call).await {
            Ok(hash) => {
                tracing::info!("Transaction {} submitted: {}", call.signature, short_hex(&hash));
                TransactionState::Submitted {
                    hash,
                    confirmed: None,
                }
            }
            Err(e) => failed(e.to_string()),
        }
    }

    /// Waits for the receipt of a submitted transaction.
    pub async fn confirm(&self, hash: &str) -> Result<bool> {
        self.wallet.wait_for_receipt(hash).await
    }
}

fn failed(error: String) -> TransactionState {
    tracing::warn!("Transaction attempt failed: {}", error);
    TransactionState::Failed { error }
}
