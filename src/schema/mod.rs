//! Declarative shape checks for inbound operation payloads and outbound
//! callback payloads.
//!
//! Validation is pure and collects every violated field instead of stopping
//! at the first one, so callers can show the complete list to whoever built
//! the payload.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::constants::{MAX_CHAIN_ID, MIN_CHAIN_ID};
use crate::utils::is_evm_address;

/// Every payload shape the gateway knows how to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    ConnectWallet,
    Transaction,
    Signature,
    OperationResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub schema: Schema,
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.field.as_str()).collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let details = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{} payload invalid ({})", self.schema.name(), details)
    }
}

impl std::error::Error for ValidationError {}

impl Schema {
    pub fn name(&self) -> &'static str {
        match self {
            Schema::ConnectWallet => "connect_wallet",
            Schema::Transaction => "transaction",
            Schema::Signature => "signature",
            Schema::OperationResult => "operation_result",
        }
    }

    /// Checks `payload` against this schema.
    pub fn validate(&self, payload: &Value) -> Result<(), ValidationError> {
        let mut checker = Checker::default();
        match payload.as_object() {
            None => checker.fail("$", "must be an object"),
            Some(obj) => match self {
                Schema::ConnectWallet => check_connect_wallet(obj, &mut checker),
                Schema::Transaction => check_transaction(obj, &mut checker),
                Schema::Signature => check_signature(obj, &mut checker),
                Schema::OperationResult => check_operation_result(obj, &mut checker),
            },
        }
        checker.finish(*self)
    }
}

#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn fail(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    fn finish(self, schema: Schema) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                schema,
                errors: self.errors,
            })
        }
    }

    fn required<'a>(&mut self, obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
        match obj.get(field) {
            Some(value) => Some(value),
            None => {
                self.fail(field, "is required");
                None
            }
        }
    }

    fn string(&mut self, obj: &Map<String, Value>, field: &str) {
        if let Some(value) = self.required(obj, field) {
            if !value.is_string() {
                self.fail(field, "must be a string");
            }
        }
    }

    fn object(&mut self, obj: &Map<String, Value>, field: &str) {
        if let Some(value) = self.required(obj, field) {
            if !value.is_object() {
                self.fail(field, "must be an object");
            }
        }
    }

    fn boolean(&mut self, obj: &Map<String, Value>, field: &str) {
        if let Some(value) = self.required(obj, field) {
            if !value.is_boolean() {
                self.fail(field, "must be a boolean");
            }
        }
    }

    fn address(&mut self, obj: &Map<String, Value>, field: &str) {
        if let Some(value) = self.required(obj, field) {
            match value.as_str() {
                Some(s) if is_evm_address(s) => {}
                Some(_) => self.fail(field, "must match ^0x[a-fA-F0-9]{40}$"),
                None => self.fail(field, "must be a string"),
            }
        }
    }

    fn chain_id(&mut self, obj: &Map<String, Value>, field: &str) {
        if let Some(value) = self.required(obj, field) {
            match value.as_u64() {
                Some(id) if (MIN_CHAIN_ID..=MAX_CHAIN_ID).contains(&id) => {}
                Some(_) => self.fail(field, "must be between 1 and 10000000"),
                None => self.fail(field, "must be an integer"),
            }
        }
    }
}

fn check_connect_wallet(obj: &Map<String, Value>, c: &mut Checker) {
    if let Some(value) = c.required(obj, "type") {
        if value.as_str() != Some("connect_wallet") {
            c.fail("type", "must be \"connect_wallet\"");
        }
    }
    c.address(obj, "address");
    c.boolean(obj, "connect");
}

fn check_transaction(obj: &Map<String, Value>, c: &mut Checker) {
    c.chain_id(obj, "chainId");
    c.address(obj, "address");

    if let Some(value) = c.required(obj, "abi") {
        match value.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        c.fail(&format!("abi[{}]", idx), "must be a string");
                    }
                }
            }
            None => c.fail("abi", "must be an array of strings"),
        }
    }

    c.string(obj, "functionName");

    if let Some(args) = obj.get("args") {
        if !args.is_array() {
            c.fail("args", "must be an array");
        }
    }
    if let Some(value) = obj.get("value") {
        if !(value.is_string() || value.is_u64()) {
            c.fail("value", "must be a string or unsigned integer");
        }
    }
}

fn check_signature(obj: &Map<String, Value>, c: &mut Checker) {
    if let Some(domain) = c.required(obj, "domain") {
        match domain.as_object() {
            Some(domain) => {
                let mut nested = Checker::default();
                nested.string(domain, "name");
                nested.string(domain, "version");
                nested.chain_id(domain, "chainId");
                nested.address(domain, "verifyingContract");
                for err in nested.errors {
                    c.fail(&format!("domain.{}", err.field), &err.message);
                }
            }
            None => c.fail("domain", "must be an object"),
        }
    }
    c.string(obj, "primaryType");
    c.object(obj, "types");
    c.object(obj, "message");
}

fn check_operation_result(obj: &Map<String, Value>, c: &mut Checker) {
    match (obj.get("hash"), obj.get("error")) {
        (Some(_), Some(_)) => c.fail("$", "must carry exactly one of hash or error"),
        (None, None) => c.fail("$", "must carry one of hash or error"),
        (Some(hash), None) => match hash.as_str() {
            Some(s) if is_hex_string(s) => {}
            Some(_) => c.fail("hash", "must be 0x-prefixed hex"),
            None => c.fail("hash", "must be a string"),
        },
        (None, Some(error)) => match error.as_str() {
            Some(s) if !s.trim().is_empty() => {}
            Some(_) => c.fail("error", "must not be empty"),
            None => c.fail("error", "must be a string"),
        },
    }
    if let Some(confirmed) = obj.get("confirmed") {
        if !confirmed.is_boolean() {
            c.fail("confirmed", "must be a boolean");
        }
    }
}

fn is_hex_string(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_hexdigit()))
        .unwrap_or(false)
}
