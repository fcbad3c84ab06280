use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip712::TypedData, TransactionRequest as EthTransactionRequest, H256, U256,
        U64,
    },
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use super::{ContractCall, WalletConnector, WalletEvent, WalletEvents};
use crate::{
    error::{AppError, Result},
    models::SignatureRequest,
    utils::short_hex,
};

type ChainClient = SignerMiddleware<Provider<Http>, LocalWallet>;

struct ActiveChain {
    chain_id: u64,
    client: Arc<ChainClient>,
}

/// Server-side wallet: a local key signing through JSON-RPC endpoints, one
/// per configured chain.
pub struct EthersWallet {
    signer: LocalWallet,
    rpc_urls: HashMap<u64, String>,
    active: RwLock<Arc<ActiveChain>>,
    events: WalletEvents,
}

impl EthersWallet {
    pub async fn connect(
        private_key: &str,
        rpc_urls: HashMap<u64, String>,
        chain_id: u64,
        events: WalletEvents,
    ) -> Result<Self> {
        let signer = LocalWallet::from_str(private_key.trim().trim_start_matches("0x"))
            .map_err(|e| AppError::Wallet(format!("Invalid wallet key: {}", e)))?;
        let client = build_client(&signer, &rpc_urls, chain_id).await?;

        let wallet = Self {
            signer,
            rpc_urls,
            active: RwLock::new(Arc::new(ActiveChain { chain_id, client })),
            events,
        };

        tracing::info!(
            "Wallet {} connected on chain {}",
            wallet.account(),
            chain_id
        );
        wallet.events.emit(WalletEvent::Connected {
            account: wallet.account(),
            chain_id,
        });
        Ok(wallet)
    }

    fn active(&self) -> Result<Arc<ActiveChain>> {
        self.active
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| AppError::Internal("wallet state poisoned".to_string()))
    }
}

async fn build_client(
    signer: &LocalWallet,
    rpc_urls: &HashMap<u64, String>,
    chain_id: u64,
) -> Result<Arc<ChainClient>> {
    let url = rpc_urls
        .get(&chain_id)
        .ok_or_else(|| AppError::Wallet(format!("Chain {} is not configured", chain_id)))?;
    let provider = Provider::<Http>::try_from(url.as_str())
        .map_err(|e| AppError::Wallet(format!("Invalid RPC URL for chain {}: {}", chain_id, e)))?;

    let reported = provider
        .get_chainid()
        .await
        .map_err(|e| AppError::Wallet(format!("RPC for chain {} unreachable: {}", chain_id, e)))?;
    if reported != U256::from(chain_id) {
        return Err(AppError::Wallet(format!(
            "RPC configured for chain {} reports chain {}",
            chain_id, reported
        )));
    }

    Ok(Arc::new(SignerMiddleware::new(
        provider,
        signer.clone().with_chain_id(chain_id),
    )))
}

/// Turns raw node/middleware errors into something a caller can act on.
pub fn describe_wallet_error(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let reason = if lower.contains("insufficient funds") {
        "Insufficient funds for gas and value"
    } else if lower.contains("execution reverted") {
        "Transaction reverted"
    } else if lower.contains("gas required exceeds") || lower.contains("cannot estimate gas") {
        "Gas estimation failed"
    } else if lower.contains("nonce too low") || lower.contains("replacement transaction") {
        "Nonce conflict"
    } else if lower.contains("rejected") || lower.contains("denied") {
        "Request rejected"
    } else {
        return raw.to_string();
    };
    format!("{}: {}", reason, raw)
}

#[async_trait]
impl WalletConnector for EthersWallet {
    fn account(&self) -> String {
        format!("{:#x}", self.signer.address())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.active()?.chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        if self.active()?.chain_id == chain_id {
            return Ok(());
        }
        let client = build_client(&self.signer, &self.rpc_urls, chain_id).await?;
        {
            let mut guard = self
                .active
                .write()
                .map_err(|_| AppError::Internal("wallet state poisoned".to_string()))?;
            *guard = Arc::new(ActiveChain { chain_id, client });
        }
        tracing::info!("Wallet switched to chain {}", chain_id);
        self.events.emit(WalletEvent::ChainChanged { chain_id });
        Ok(())
    }

    async fn send_transaction(&self, call: &ContractCall) -> Result<String> {
        let active = self.active()?;
        if active.chain_id != call.chain_id {
            return Err(AppError::Wallet(format!(
                "Wallet is on chain {}, call targets chain {}",
                active.chain_id, call.chain_id
            )));
        }

        let tx = EthTransactionRequest::new()
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .chain_id(call.chain_id);

        let pending = active
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| AppError::Wallet(describe_wallet_error(&e.to_string())))?;
        let hash = format!("{:#x}", pending.tx_hash());
        tracing::info!("Submitted {} -> {}", call.signature, short_hex(&hash));
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: &str) -> Result<bool> {
        let tx_hash = H256::from_str(hash)
            .map_err(|e| AppError::BadRequest(format!("Invalid transaction hash: {}", e)))?;
        let active = self.active()?;
        let receipt = PendingTransaction::new(tx_hash, active.client.provider())
            .await
            .map_err(|e| AppError::Wallet(format!("Receipt lookup failed: {}", e)))?;

        match receipt {
            Some(receipt) => Ok(receipt.status == Some(U64::from(1))),
            None => Err(AppError::Wallet(format!(
                "Transaction {} dropped from mempool",
                short_hex(hash)
            ))),
        }
    }

    async fn sign_typed_data(&self, request: &SignatureRequest) -> Result<String> {
        let payload = serde_json::json!({
            "types": request.types,
            "primaryType": request.primary_type,
            "domain": request.domain,
            "message": request.message,
        });
        let typed: TypedData = serde_json::from_value(payload)
            .map_err(|e| AppError::BadRequest(format!("Invalid typed data: {}", e)))?;

        let signature = self
            .signer
            .sign_typed_data(&typed)
            .await
            .map_err(|e| AppError::Wallet(describe_wallet_error(&e.to_string())))?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}
