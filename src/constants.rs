/// Application constants

// API version
pub const API_VERSION: &str = "v1";

// Operation payload bounds
pub const MIN_CHAIN_ID: u64 = 1;
pub const MAX_CHAIN_ID: u64 = 10_000_000;
pub const ADDRESS_HEX_LEN: usize = 40;

// Box cache layout
pub const BOX_CACHE_KEY: &str = "witbot_boxes_cache";
pub const BOX_CACHE_METADATA_KEY: &str = "witbot_boxes_cache_metadata";
pub const BOX_CACHE_VERSION: &str = "1.0";
pub const BOX_CACHE_MAX_ITEMS: usize = 50;
pub const BOX_CACHE_CHUNK_SIZE: usize = 500_000;

// Callback delivery
pub const CALLBACK_MAX_ATTEMPTS: u32 = 4;
pub const CALLBACK_BACKOFF_BASE_MS: u64 = 500;
pub const CALLBACK_BACKOFF_MAX_MS: u64 = 8_000;
pub const CALLBACK_TIMEOUT_SECS: u64 = 10;
pub const DEAD_LETTER_CAPACITY: usize = 100;

// Sessions
pub const MAX_SESSIONS: usize = 1_000;

// Operation payload fetch
pub const FETCH_TIMEOUT_SECS: u64 = 15;

// Wallet
pub const DEFAULT_CHAIN_ID: u64 = 8453; // Base mainnet

// LLM proxy
pub const LLM_DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const LLM_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const LLM_DEFAULT_MAX_TOKENS: u32 = 256;
pub const LLM_TIMEOUT_SECS: u64 = 60;
pub const LLM_DEFAULT_ALLOWED_ORIGINS: &str =
    "http://localhost:3000,http://localhost:5173,https://app.witbot.xyz";
