use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::constants::{
    BOX_CACHE_CHUNK_SIZE, BOX_CACHE_MAX_ITEMS, CALLBACK_BACKOFF_BASE_MS, CALLBACK_BACKOFF_MAX_MS,
    CALLBACK_MAX_ATTEMPTS, CALLBACK_TIMEOUT_SECS, DEAD_LETTER_CAPACITY, DEFAULT_CHAIN_ID,
    FETCH_TIMEOUT_SECS, LLM_DEFAULT_ALLOWED_ORIGINS, LLM_DEFAULT_API_URL, LLM_DEFAULT_MAX_TOKENS,
    LLM_DEFAULT_MODEL, LLM_TIMEOUT_SECS, MAX_CHAIN_ID, MIN_CHAIN_ID,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub llm_proxy_port: u16,
    pub environment: String,

    // CORS
    pub cors_allowed_origins: String,
    pub llm_allowed_origins: String,

    // Operation payload fetch
    pub fetch_timeout_secs: u64,

    // Callback delivery
    pub callback_timeout_secs: u64,
    pub callback_max_attempts: u32,
    pub callback_backoff_base_ms: u64,
    pub callback_backoff_max_ms: u64,
    pub dead_letter_capacity: usize,

    // Wallet
    pub wallet_private_key: Option<String>,
    pub chain_rpc_urls: HashMap<u64, String>,
    pub default_chain_id: u64,

    // Box cache
    pub redis_url: Option<String>,
    pub box_cache_max_items: usize,
    pub box_cache_chunk_size: usize,

    // LLM
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            llm_proxy_port: env::var("LLM_PROXY_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
            llm_allowed_origins: env::var("LLM_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| LLM_DEFAULT_ALLOWED_ORIGINS.to_string()),

            fetch_timeout_secs: parse_or("FETCH_TIMEOUT_SECS", FETCH_TIMEOUT_SECS)?,

            callback_timeout_secs: parse_or("CALLBACK_TIMEOUT_SECS", CALLBACK_TIMEOUT_SECS)?,
            callback_max_attempts: parse_or("CALLBACK_MAX_ATTEMPTS", CALLBACK_MAX_ATTEMPTS)?,
            callback_backoff_base_ms: parse_or(
                "CALLBACK_BACKOFF_BASE_MS",
                CALLBACK_BACKOFF_BASE_MS,
            )?,
            callback_backoff_max_ms: parse_or("CALLBACK_BACKOFF_MAX_MS", CALLBACK_BACKOFF_MAX_MS)?,
            dead_letter_capacity: parse_or("DEAD_LETTER_CAPACITY", DEAD_LETTER_CAPACITY)?,

            wallet_private_key: env::var("WALLET_PRIVATE_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            chain_rpc_urls: parse_chain_rpc_urls(
                &env::var("CHAIN_RPC_URLS").unwrap_or_default(),
            )?,
            default_chain_id: parse_or("DEFAULT_CHAIN_ID", DEFAULT_CHAIN_ID)?,

            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
            box_cache_max_items: parse_or("BOX_CACHE_MAX_ITEMS", BOX_CACHE_MAX_ITEMS)?,
            box_cache_chunk_size: parse_or("BOX_CACHE_CHUNK_SIZE", BOX_CACHE_CHUNK_SIZE)?,

            llm_api_url: env::var("LLM_API_URL")
                .unwrap_or_else(|_| LLM_DEFAULT_API_URL.to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok().filter(|s| !s.trim().is_empty()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| LLM_DEFAULT_MODEL.to_string()),
            llm_max_tokens: parse_or("LLM_MAX_TOKENS", LLM_DEFAULT_MAX_TOKENS)?,
            llm_timeout_secs: parse_or("LLM_TIMEOUT_SECS", LLM_TIMEOUT_SECS)?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.callback_max_attempts == 0 {
            anyhow::bail!("CALLBACK_MAX_ATTEMPTS must be at least 1");
        }
        if self.box_cache_max_items == 0 {
            anyhow::bail!("BOX_CACHE_MAX_ITEMS must be at least 1");
        }
        if self.box_cache_chunk_size == 0 {
            anyhow::bail!("BOX_CACHE_CHUNK_SIZE must be at least 1");
        }
        if self.llm_timeout_secs == 0 {
            anyhow::bail!("LLM_TIMEOUT_SECS must be at least 1");
        }
        if !(MIN_CHAIN_ID..=MAX_CHAIN_ID).contains(&self.default_chain_id) {
            anyhow::bail!(
                "DEFAULT_CHAIN_ID {} is outside [{}, {}]",
                self.default_chain_id,
                MIN_CHAIN_ID,
                MAX_CHAIN_ID
            );
        }

        if self.wallet_private_key.is_some()
            && !self.chain_rpc_urls.contains_key(&self.default_chain_id)
        {
            anyhow::bail!(
                "CHAIN_RPC_URLS has no entry for DEFAULT_CHAIN_ID {}",
                self.default_chain_id
            );
        }
        if self.wallet_private_key.is_none() {
            tracing::warn!("WALLET_PRIVATE_KEY not set; wallet operations are disabled");
        }

        if self.callback_backoff_base_ms > self.callback_backoff_max_ms {
            tracing::warn!(
                "CALLBACK_BACKOFF_BASE_MS ({}) exceeds CALLBACK_BACKOFF_MAX_MS ({})",
                self.callback_backoff_base_ms,
                self.callback_backoff_max_ms
            );
        }
        if self.llm_api_key.is_none() {
            tracing::warn!("LLM_API_KEY not set; /generate requests will likely be rejected upstream");
        }
        if !self.is_development() && self.cors_allowed_origins.trim() == "*" {
            tracing::warn!("CORS_ALLOWED_ORIGINS is permissive outside development");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            llm_proxy_port: 3001,
            environment: "development".to_string(),
            cors_allowed_origins: "*".to_string(),
            llm_allowed_origins: LLM_DEFAULT_ALLOWED_ORIGINS.to_string(),
            fetch_timeout_secs: FETCH_TIMEOUT_SECS,
            callback_timeout_secs: CALLBACK_TIMEOUT_SECS,
            callback_max_attempts: CALLBACK_MAX_ATTEMPTS,
            callback_backoff_base_ms: CALLBACK_BACKOFF_BASE_MS,
            callback_backoff_max_ms: CALLBACK_BACKOFF_MAX_MS,
            dead_letter_capacity: DEAD_LETTER_CAPACITY,
            wallet_private_key: None,
            chain_rpc_urls: HashMap::new(),
            default_chain_id: DEFAULT_CHAIN_ID,
            redis_url: None,
            box_cache_max_items: BOX_CACHE_MAX_ITEMS,
            box_cache_chunk_size: BOX_CACHE_CHUNK_SIZE,
            llm_api_url: LLM_DEFAULT_API_URL.to_string(),
            llm_api_key: None,
            llm_model: LLM_DEFAULT_MODEL.to_string(),
            llm_max_tokens: LLM_DEFAULT_MAX_TOKENS,
            llm_timeout_secs: LLM_TIMEOUT_SECS,
        }
    }
}

fn parse_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => Ok(raw.trim().parse()?),
        _ => Ok(default),
    }
}

/// Parses `8453=https://mainnet.base.org,1=https://eth.llamarpc.com`.
pub fn parse_chain_rpc_urls(raw: &str) -> anyhow::Result<HashMap<u64, String>> {
    let mut urls = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (chain, url) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid CHAIN_RPC_URLS entry: {}", entry))?;
        let chain_id: u64 = chain.trim().parse()?;
        url::Url::parse(url.trim())?;
        urls.insert(chain_id, url.trim().to_string());
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chain_rpc_urls_reads_pairs() {
        let urls =
            parse_chain_rpc_urls("8453=https://mainnet.base.org, 1=https://eth.example.org")
                .unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls.get(&8453).map(String::as_str), Some("https://mainnet.base.org"));
        assert_eq!(urls.get(&1).map(String::as_str), Some("https://eth.example.org"));
    }

    #[test]
    fn parse_chain_rpc_urls_rejects_missing_separator() {
        assert!(parse_chain_rpc_urls("8453 https://mainnet.base.org").is_err());
        assert!(parse_chain_rpc_urls("base=https://mainnet.base.org").is_err());
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_requires_rpc_for_default_chain_when_wallet_enabled() {
        let config = Config {
            wallet_private_key: Some("0x01".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_chain_rpc_urls_accepts_empty() {
        assert!(parse_chain_rpc_urls("").unwrap().is_empty());
    }

    #[test]
    fn llm_timeout_is_independent_of_fetch_timeout() {
        let config = Config {
            fetch_timeout_secs: 2,
            ..Config::default()
        };
        assert_eq!(config.llm_timeout_secs, LLM_TIMEOUT_SECS);

        let zero = Config {
            llm_timeout_secs: 0,
            ..Config::default()
        };
        assert!(zero.validate().is_err());
    }
}
