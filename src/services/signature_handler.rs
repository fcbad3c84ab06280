use serde::Serialize;
use std::sync::Arc;

use crate::{models::SignatureRequest, wallet::WalletConnector};

/// Exactly one of signature or error per attempt; a new attempt overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignatureState {
    Idle,
    Signed { signature: String },
    Failed { error: String },
}

impl SignatureState {
    pub fn signature(&self) -> Option<&str> {
        match self {
            SignatureState::Signed { signature } => Some(signature),
            _ => None,
        }
    }
}

pub struct SignatureHandler {
    wallet: Arc<dyn WalletConnector>,
}

impl SignatureHandler {
    pub fn new(wallet: Arc<dyn WalletConnector>) -> Self {
        Self { wallet }
    }

    pub async fn run(&self, request: &SignatureRequest) -> SignatureState {
        match self.wallet.sign_typed_data(request).await {
            Ok(signature) => {
                tracing::info!(
                    "Signed {} for {}",
                    request.primary_type,
                    request.domain.name
                );
                SignatureState::Signed { signature }
            }
            Err(e) => {
                tracing::warn!("Signature request failed: {}", e);
                SignatureState::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
