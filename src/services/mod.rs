// All service modules
pub mod box_cache;
pub mod callback_dispatcher;
pub mod llm_service;
pub mod query_loader;
pub mod session_manager;
pub mod signature_handler;
pub mod transaction_handler;

// Re-export for convenience
pub use box_cache::BoxCache;
pub use callback_dispatcher::{CallbackDispatcher, DeadLetter, ErrorSink, RetryPolicy};
pub use llm_service::LlmClient;
pub use query_loader::{LoaderState, QueryLoader};
pub use session_manager::{SessionStore, SessionView};
pub use signature_handler::{SignatureHandler, SignatureState};
pub use transaction_handler::{TransactionHandler, TransactionState};
