use ethers::abi::{self, Function, ParamType, Token};
use ethers::types::{Address, I256, U256};
use serde_json::Value;
use std::str::FromStr;

use crate::{
    error::{AppError, Result},
    models::TransactionRequest,
};

/// A fully encoded contract call, ready for the wallet to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    pub chain_id: u64,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
    pub signature: String,
}

impl ContractCall {
    pub fn from_request(request: &TransactionRequest) -> Result<Self> {
        let to = Address::from_str(&request.address)
            .map_err(|e| AppError::BadRequest(format!("Invalid contract address: {}", e)))?;

        let sources: Vec<&str> = request.abi.iter().map(String::as_str).collect();
        let parsed = abi::parse_abi(&sources)
            .map_err(|e| AppError::BadRequest(format!("Invalid ABI: {}", e)))?;

        let candidates = parsed.functions_by_name(&request.function_name).map_err(|_| {
            AppError::BadRequest(format!(
                "Function {} not found in ABI",
                request.function_name
            ))
        })?;
        let function = select_overload(candidates, request.args.len()).ok_or_else(|| {
            AppError::BadRequest(format!(
                "No overload of {} takes {} argument(s)",
                request.function_name,
                request.args.len()
            ))
        })?;

        let tokens = function
            .inputs
            .iter()
            .zip(request.args.iter())
            .enumerate()
            .map(|(idx, (param, arg))| {
                json_to_token(&param.kind, arg).map_err(|e| {
                    AppError::BadRequest(format!("Argument {} ({}): {}", idx, param.name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let data = function
            .encode_input(&tokens)
            .map_err(|e| AppError::BadRequest(format!("Failed to encode call: {}", e)))?;

        let value = match &request.value {
            Some(raw) => parse_u256(raw)
                .map_err(|e| AppError::BadRequest(format!("Invalid value: {}", e)))?,
            None => U256::zero(),
        };

        Ok(Self {
            chain_id: request.chain_id,
            to,
            data,
            value,
            signature: call_signature(function),
        })
    }
}

fn call_signature(function: &Function) -> String {
    let inputs = function
        .inputs
        .iter()
        .map(|p| p.kind.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{}({})", function.name, inputs)
}

fn select_overload(candidates: &[Function], arg_count: usize) -> Option<&Function> {
    candidates.iter().find(|f| f.inputs.len() == arg_count)
}

/// Converts a JSON argument into an ABI token for `kind`.
pub fn json_to_token(kind: &ParamType, value: &Value) -> std::result::Result<Token, String> {
    match kind {
        ParamType::Address => {
            let raw = value.as_str().ok_or("expected address string")?;
            Address::from_str(raw)
                .map(Token::Address)
                .map_err(|e| format!("invalid address: {}", e))
        }
        ParamType::Uint(_) => parse_u256(value).map(Token::Uint),
        ParamType::Int(_) => parse_i256(value).map(|v| Token::Int(v.into_raw())),
        ParamType::Bool => match value {
            Value::Bool(b) => Ok(Token::Bool(*b)),
            Value::String(s) if s == "true" || s == "false" => Ok(Token::Bool(s == "true")),
            _ => Err("expected boolean".to_string()),
        },
        ParamType::String => value
            .as_str()
            .map(|s| Token::String(s.to_string()))
            .ok_or_else(|| "expected string".to_string()),
        ParamType::Bytes => parse_hex_bytes(value).map(Token::Bytes),
        ParamType::FixedBytes(size) => {
            let bytes = parse_hex_bytes(value)?;
            if bytes.len() != *size {
                return Err(format!("expected {} bytes, got {}", size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => {
            let items = value.as_array().ok_or("expected array")?;
            items
                .iter()
                .map(|item| json_to_token(inner, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::Array)
        }
        ParamType::FixedArray(inner, size) => {
            let items = value.as_array().ok_or("expected array")?;
            if items.len() != *size {
                return Err(format!("expected {} items, got {}", size, items.len()));
            }
            items
                .iter()
                .map(|item| json_to_token(inner, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::FixedArray)
        }
        ParamType::Tuple(kinds) => {
            let items = value.as_array().ok_or("expected tuple as array")?;
            if items.len() != kinds.len() {
                return Err(format!(
                    "expected tuple of {} items, got {}",
                    kinds.len(),
                    items.len()
                ));
            }
            kinds
                .iter()
                .zip(items.iter())
                .map(|(k, item)| json_to_token(k, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::Tuple)
        }
    }
}

/// Accepts a JSON integer, a decimal string or a 0x-hex string.
pub fn parse_u256(value: &Value) -> std::result::Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("{} is not an unsigned integer", n)),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
                None => U256::from_dec_str(s).map_err(|e| e.to_string()),
            }
        }
        _ => Err("expected unsigned integer".to_string()),
    }
}

fn parse_i256(value: &Value) -> std::result::Result<I256, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(I256::from)
            .ok_or_else(|| format!("{} is not an integer", n)),
        Value::String(s) => I256::from_dec_str(s.trim()).map_err(|e| e.to_string()),
        _ => Err("expected integer".to_string()),
    }
}

fn parse_hex_bytes(value: &Value) -> std::result::Result<Vec<u8>, String> {
    let raw = value.as_str().ok_or("expected hex string")?;
    hex::decode(raw.trim().trim_start_matches("0x")).map_err(|e| e.to_string())
}
