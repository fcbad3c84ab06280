// In-memory connector for unit tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use super::{ContractCall, WalletConnector, WalletEvent, WalletEvents};
use crate::{
    error::{AppError, Result},
    models::SignatureRequest,
};

pub const STUB_ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

pub struct StubWallet {
    pub chain_id: Mutex<u64>,
    pub events: WalletEvents,
    pub sent: Mutex<Vec<ContractCall>>,
    pub send_error: Mutex<Option<String>>,
    pub sign_error: Mutex<Option<String>>,
    pub receipt: Mutex<std::result::Result<bool, String>>,
    pub receipt_delay: Duration,
    pub send_delay: Duration,
}

impl StubWallet {
    pub fn new(chain_id: u64, events: WalletEvents) -> Self {
        Self {
            chain_id: Mutex::new(chain_id),
            events,
            sent: Mutex::new(Vec::new()),
            send_error: Mutex::new(None),
            sign_error: Mutex::new(None),
            receipt: Mutex::new(Ok(true)),
            receipt_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
        }
    }

    pub fn fail_sends(&self, message: &str) {
        *self.send_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_signs(&self, message: &str) {
        *self.sign_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl WalletConnector for StubWallet {
    fn account(&self) -> String {
        STUB_ACCOUNT.to_string()
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(*self.chain_id.lock().unwrap())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        *self.chain_id.lock().unwrap() = chain_id;
        self.events.emit(WalletEvent::ChainChanged { chain_id });
        Ok(())
    }

    async fn send_transaction(&self, call: &ContractCall) -> Result<String> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        if let Some(message) = self.send_error.lock().unwrap().clone() {
            return Err(AppError::Wallet(message));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(call.clone());
        Ok(format!("0x{:064x}", sent.len()))
    }

    async fn wait_for_receipt(&self, _hash: &str) -> Result<bool> {
        if !self.receipt_delay.is_zero() {
            tokio::time::sleep(self.receipt_delay).await;
        }
        self.receipt.lock().unwrap().clone().map_err(AppError::Wallet)
    }

    async fn sign_typed_data(&self, request: &SignatureRequest) -> Result<String> {
        if let Some(message) = self.sign_error.lock().unwrap().clone() {
            return Err(AppError::Wallet(message));
        }
        Ok(format!("0x{}{}", "5".repeat(128), hex::encode([request.message.len() as u8])))
    }
}
