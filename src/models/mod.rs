// src/models/mod.rs
pub mod box_snapshot;
pub mod callback;
pub mod operation;

use serde::Serialize;

pub use box_snapshot::{Bet, CachedBox, Settlement, SportMeta, TokenData};
pub use callback::{CallbackEnvelope, CallbackPayload, ConnectionNotice, OperationResult};
pub use operation::{
    LaunchParams, OperationKind, OperationRequest, SignatureDomain, SignatureRequest,
    TransactionRequest,
};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
