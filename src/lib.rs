pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;
