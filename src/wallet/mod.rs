// Wallet connectivity: the connector trait the operation handlers drive,
// the ethers-backed implementation, ABI call building and wallet events.

pub mod abi;
pub mod ethers_wallet;
pub mod events;
#[cfg(test)]
pub mod stub;

use async_trait::async_trait;

use crate::{error::Result, models::SignatureRequest};

pub use abi::ContractCall;
pub use ethers_wallet::EthersWallet;
pub use events::{Subscription, WalletEvent, WalletEvents};

/// What the operation handlers need from a connected wallet.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Connected account, `0x`-prefixed.
    fn account(&self) -> String;

    async fn chain_id(&self) -> Result<u64>;

    /// Moves the wallet to `chain_id`. Emits `ChainChanged` on success.
    async fn switch_chain(&self, chain_id: u64) -> Result<()>;

    /// Submits the call and returns the transaction hash without waiting
    /// for it to be mined.
    async fn send_transaction(&self, call: &ContractCall) -> Result<String>;

    /// Waits for the receipt of `hash`; `true` when the call succeeded.
    async fn wait_for_receipt(&self, hash: &str) -> Result<bool>;

    /// EIP-712 signature over `request`, `0x`-prefixed hex.
    async fn sign_typed_data(&self, request: &SignatureRequest) -> Result<String>;
}
