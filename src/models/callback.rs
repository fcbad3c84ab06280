use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::Schema;

/// Outcome of a single wallet interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
    Hash {
        hash: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confirmed: Option<bool>,
    },
    Error {
        error: String,
    },
}

impl OperationResult {
    pub fn hash(hash: impl Into<String>) -> Self {
        OperationResult::Hash {
            hash: hash.into(),
            confirmed: None,
        }
    }

    pub fn confirmed(hash: impl Into<String>, confirmed: bool) -> Self {
        OperationResult::Hash {
            hash: hash.into(),
            confirmed: Some(confirmed),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        OperationResult::Error {
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OperationResult::Error { .. })
    }
}

/// Tells the caller which account connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionNotice {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    pub connect: bool,
}

impl ConnectionNotice {
    pub fn connected(address: impl Into<String>) -> Self {
        Self {
            kind: "connect_wallet".to_string(),
            address: address.into(),
            connect: true,
        }
    }
}

/// Everything the gateway may post to a caller's webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackPayload {
    Connection(ConnectionNotice),
    Transaction(OperationResult),
    Signature(OperationResult),
}

impl CallbackPayload {
    pub fn schema(&self) -> Schema {
        match self {
            CallbackPayload::Connection(_) => Schema::ConnectWallet,
            CallbackPayload::Transaction(_) | CallbackPayload::Signature(_) => {
                Schema::OperationResult
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CallbackPayload::Connection(_) => "connection",
            CallbackPayload::Transaction(_) => "transaction",
            CallbackPayload::Signature(_) => "signature",
        }
    }

    /// The payload body before the correlation id is merged in.
    pub fn body(&self) -> Value {
        let body = match self {
            CallbackPayload::Connection(notice) => serde_json::to_value(notice),
            CallbackPayload::Transaction(result) | CallbackPayload::Signature(result) => {
                serde_json::to_value(result)
            }
        };
        body.unwrap_or(Value::Null)
    }

    pub fn envelope(&self, uid: &str) -> CallbackEnvelope {
        let fields = match self.body() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        CallbackEnvelope {
            fields,
            uid: uid.to_string(),
            transaction: matches!(self, CallbackPayload::Transaction(_)).then_some(true),
            signature: matches!(self, CallbackPayload::Signature(_)).then_some(true),
        }
    }
}

/// Wire body of a callback POST: payload fields, `uid` and a kind flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackEnvelope {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<bool>,
}
