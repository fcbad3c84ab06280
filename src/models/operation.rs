use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::schema::Schema;

/// Which handler an operation payload is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transaction,
    Signature,
}

impl OperationKind {
    /// Anything other than exactly `"signature"` selects the transaction flow.
    pub fn from_type_param(raw: Option<&str>) -> Self {
        match raw {
            Some("signature") => OperationKind::Signature,
            _ => OperationKind::Transaction,
        }
    }

    pub fn schema(&self) -> Schema {
        match self {
            OperationKind::Transaction => Schema::Transaction,
            OperationKind::Signature => Schema::Signature,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Transaction => "transaction",
            OperationKind::Signature => "signature",
        }
    }
}

/// Query parameters the embedding caller puts on the launch URL.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchParams {
    pub source: Option<String>,
    pub uid: Option<String>,
    pub callback: Option<String>,
    pub kind: OperationKind,
    pub bot_name: Option<String>,
}

impl LaunchParams {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let non_empty = |key: &str| {
            query
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            source: non_empty("source"),
            uid: non_empty("uid"),
            callback: non_empty("callback"),
            kind: OperationKind::from_type_param(query.get("type").map(String::as_str)),
            bot_name: non_empty("botName"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub chain_id: u64,
    pub address: String,
    pub abi: Vec<String>,
    pub function_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    /// Wei attached to the call, decimal or 0x-hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: String,
}

/// EIP-712 structured data to be signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    pub domain: SignatureDomain,
    pub primary_type: String,
    pub types: Map<String, Value>,
    pub message: Map<String, Value>,
}

/// A validated, immutable operation fetched from the caller's `source` URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationRequest {
    Transaction(TransactionRequest),
    Signature(SignatureRequest),
}

impl OperationRequest {
    /// Validates `payload` against the schema for `kind` and parses it.
    pub fn parse(kind: OperationKind, payload: Value) -> crate::error::Result<Self> {
        kind.schema().validate(&payload)?;
        let parsed = match kind {
            OperationKind::Transaction => {
                OperationRequest::Transaction(serde_json::from_value(payload).map_err(|e| {
                    crate::error::AppError::BadRequest(format!("Malformed transaction: {}", e))
                })?)
            }
            OperationKind::Signature => {
                OperationRequest::Signature(serde_json::from_value(payload).map_err(|e| {
                    crate::error::AppError::BadRequest(format!("Malformed signature request: {}", e))
                })?)
            }
        };
        Ok(parsed)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Transaction(_) => OperationKind::Transaction,
            OperationRequest::Signature(_) => OperationKind::Signature,
        }
    }
}
