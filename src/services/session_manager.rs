use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::{
    callback_dispatcher::{CallbackDispatcher, DispatchError, ErrorSink},
    query_loader::{LoaderError, LoaderState, QueryLoader},
    signature_handler::{SignatureHandler, SignatureState},
    transaction_handler::{TransactionHandler, TransactionState},
};
use crate::{
    constants::MAX_SESSIONS,
    error::{AppError, Result},
    models::{
        CallbackPayload, ConnectionNotice, LaunchParams, OperationKind, OperationRequest,
        OperationResult, SignatureRequest, TransactionRequest,
    },
    utils::{now_millis, random_id},
    wallet::{Subscription, WalletConnector, WalletEvent, WalletEvents},
};

struct Session {
    id: String,
    params: LaunchParams,
    loader: LoaderState,
    transaction: TransactionState,
    signature: SignatureState,
    callback_error: Option<String>,
    completed: bool,
    created_at: i64,
}

/// What a client sees of a session: exactly one handler once ready.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub phase: &'static str,
    pub operation_type: OperationKind,
    pub uid: Option<String>,
    pub bot_name: Option<String>,
    pub handler: Option<&'static str>,
    pub actions: Vec<&'static str>,
    pub operation: Option<OperationRequest>,
    pub error: Option<LoaderError>,
    pub transaction: Option<TransactionState>,
    pub signature: Option<SignatureState>,
    pub callback_error: Option<String>,
}

impl Session {
    fn view(&self) -> SessionView {
        let operation = self.loader.operation().cloned();
        let kind = operation.as_ref().map(OperationRequest::kind);
        let (handler, action) = match kind {
            Some(OperationKind::Transaction) => (Some("transaction"), "submit_transaction"),
            Some(OperationKind::Signature) => (Some("signature"), "sign_message"),
            None => (None, ""),
        };
        let actions = if handler.is_some() && !self.completed {
            vec![action]
        } else {
            vec![]
        };
        let error = match &self.loader {
            LoaderState::Error(err) => Some(err.clone()),
            _ => None,
        };

        SessionView {
            id: self.id.clone(),
            phase: if self.completed {
                "completed"
            } else {
                self.loader.phase()
            },
            operation_type: self.params.kind,
            uid: self.params.uid.clone(),
            bot_name: self.params.bot_name.clone(),
            handler,
            actions,
            operation,
            error,
            transaction: (kind == Some(OperationKind::Transaction))
                .then(|| self.transaction.clone()),
            signature: (kind == Some(OperationKind::Signature)).then(|| self.signature.clone()),
            callback_error: self.callback_error.clone(),
        }
    }
}

struct SessionEntry {
    state: Mutex<Session>,
    busy: AtomicBool,
}

impl SessionEntry {
    fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut session = self
            .state
            .lock()
            .map_err(|_| AppError::Internal("session state poisoned".to_string()))?;
        Ok(f(&mut session))
    }

    fn acquire(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::Conflict("An attempt is already in progress".to_string()))?;
        Ok(BusyGuard(&self.busy))
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Records undelivered callbacks on the session they belong to.
struct SessionSink {
    entry: Arc<SessionEntry>,
}

impl ErrorSink for SessionSink {
    fn report(&self, label: &str, error: &DispatchError) {
        let message = format!("{} callback: {}", label, error);
        if let Err(e) = self.entry.with(|s| s.callback_error = Some(message)) {
            tracing::error!("Could not record callback error: {}", e);
        }
    }
}

/// Owns every launched session and drives the operation handlers.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    loader: QueryLoader,
    dispatcher: Arc<CallbackDispatcher>,
    wallet: Option<Arc<dyn WalletConnector>>,
    _chain_listener: Subscription,
}

impl SessionStore {
    pub fn new(
        loader: QueryLoader,
        dispatcher: Arc<CallbackDispatcher>,
        wallet: Option<Arc<dyn WalletConnector>>,
        events: &WalletEvents,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let listener = events.subscribe(move |event| {
                if let (WalletEvent::ChainChanged { chain_id }, Some(store)) =
                    (event, weak.upgrade())
                {
                    store.reset_idle_transactions(*chain_id);
                }
            });
            Self {
                sessions: RwLock::new(HashMap::new()),
                loader,
                dispatcher,
                wallet,
                _chain_listener: listener,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a session from launch parameters and runs the loader.
    pub async fn launch(&self, params: LaunchParams) -> Result<SessionView> {
        let id = random_id();
        let entry = Arc::new(SessionEntry {
            state: Mutex::new(Session {
                id: id.clone(),
                params: params.clone(),
                loader: LoaderState::Loading,
                transaction: TransactionState::Idle,
                signature: SignatureState::Idle,
                callback_error: None,
                completed: false,
                created_at: now_millis(),
            }),
            busy: AtomicBool::new(false),
        });
        self.insert(id.clone(), entry.clone())?;

        let loaded = self.loader.load(&params).await;
        let view = entry.with(|s| {
            s.loader = loaded;
            s.view()
        })?;
        tracing::info!("Session {} launched in phase {}", id, view.phase);
        Ok(view)
    }

    pub fn view(&self, id: &str) -> Result<SessionView> {
        self.entry(id)?.with(|s| s.view())
    }

    /// One transaction attempt for session `id`.
    pub async fn submit_transaction(&self, id: &str) -> Result<SessionView> {
        let entry = self.entry(id)?;
        let wallet = self.wallet()?;
        let _busy = entry.acquire()?;

        let (request, params) = entry.with(|s| -> Result<(TransactionRequest, LaunchParams)> {
            ensure_open(s)?;
            match s.loader.operation() {
                Some(OperationRequest::Transaction(tx)) => Ok((tx.clone(), s.params.clone())),
                _ => Err(AppError::Conflict(
                    "Session has no transaction to submit".to_string(),
                )),
            }
        })??;

        let handler = TransactionHandler::new(wallet.clone());
        let state = handler.run(&request).await;
        entry.with(|s| {
            s.transaction = state.clone();
            if state.is_submitted() {
                s.completed = true;
                s.callback_error = None;
            }
        })?;

        let result = match &state {
            TransactionState::Submitted { hash, .. } => {
                self.watch_receipt(entry.clone(), handler, hash.clone(), params.clone());
                Some(OperationResult::hash(hash.clone()))
            }
            TransactionState::Failed { error } => Some(OperationResult::error(error.clone())),
            TransactionState::Idle | TransactionState::SwitchingNetwork { .. } => None,
        };
        if let Some(result) = result {
            self.notify(&entry, &params, CallbackPayload::Transaction(result))
                .await;
        }

        entry.with(|s| s.view())
    }

    /// One signature attempt for session `id`.
    pub async fn sign_message(&self, id: &str) -> Result<SessionView> {
        let entry = self.entry(id)?;
        let wallet = self.wallet()?;
        let _busy = entry.acquire()?;

        let (request, params) = entry.with(|s| -> Result<(SignatureRequest, LaunchParams)> {
            ensure_open(s)?;
            match s.loader.operation() {
                Some(OperationRequest::Signature(req)) => Ok((req.clone(), s.params.clone())),
                _ => Err(AppError::Conflict(
                    "Session has no message to sign".to_string(),
                )),
            }
        })??;

        let state = SignatureHandler::new(wallet).run(&request).await;
        entry.with(|s| {
            s.signature = state.clone();
            if let SignatureState::Signed { .. } = state {
                s.completed = true;
                s.callback_error = None;
            }
        })?;

        let result = match &state {
            SignatureState::Signed { signature } => Some(OperationResult::hash(signature.clone())),
            SignatureState::Failed { error } => Some(OperationResult::error(error.clone())),
            SignatureState::Idle => None,
        };
        if let Some(result) = result {
            self.notify(&entry, &params, CallbackPayload::Signature(result))
                .await;
        }

        entry.with(|s| s.view())
    }

    /// Tells the caller which account is connected.
    pub async fn announce_connection(&self, id: &str) -> Result<SessionView> {
        let entry = self.entry(id)?;
        let wallet = self.wallet()?;
        let params = entry.with(|s| s.params.clone())?;
        if params.callback.is_none() {
            return Err(AppError::BadRequest(
                "Session has no callback URL".to_string(),
            ));
        }

        let notice = ConnectionNotice::connected(wallet.account());
        self.notify(&entry, &params, CallbackPayload::Connection(notice))
            .await;
        entry.with(|s| s.view())
    }

    async fn notify(&self, entry: &Arc<SessionEntry>, params: &LaunchParams, payload: CallbackPayload) {
        deliver(&self.dispatcher, entry, params, payload).await;
    }

    fn watch_receipt(
        &self,
        entry: Arc<SessionEntry>,
        handler: TransactionHandler,
        hash: String,
        params: LaunchParams,
    ) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let confirmed = match handler.confirm(&hash).await {
                Ok(confirmed) => confirmed,
                Err(e) => {
                    tracing::warn!("Receipt for {} not observed: {}", hash, e);
                    return;
                }
            };
            let updated = entry.with(|s| match &mut s.transaction {
                TransactionState::Submitted {
                    hash: current,
                    confirmed: slot,
                } if *current == hash => {
                    *slot = Some(confirmed);
                    true
                }
                _ => false,
            });
            if matches!(updated, Ok(true)) {
                tracing::info!("Transaction {} confirmed={}", hash, confirmed);
                let payload =
                    CallbackPayload::Transaction(OperationResult::confirmed(hash, confirmed));
                deliver(&dispatcher, &entry, &params, payload).await;
            }
        });
    }

    fn reset_idle_transactions(&self, chain_id: u64) {
        let entries: Vec<Arc<SessionEntry>> = match self.sessions.read() {
            Ok(sessions) => sessions.values().cloned().collect(),
            Err(_) => return,
        };
        let mut reset = 0;
        for entry in entries {
            if entry.busy.load(Ordering::Acquire) {
                continue;
            }
            let outcome = entry.with(|s| {
                let in_progress = matches!(
                    s.transaction,
                    TransactionState::SwitchingNetwork { .. } | TransactionState::Failed { .. }
                );
                if !s.completed && in_progress {
                    s.transaction = TransactionState::Idle;
                    reset += 1;
                }
            });
            if let Err(e) = outcome {
                tracing::error!("Could not reset transaction state after chain change: {}", e);
            }
        }
        if reset > 0 {
            tracing::debug!("Chain changed to {}: reset {} transaction(s)", chain_id, reset);
        }
    }

    fn wallet(&self) -> Result<Arc<dyn WalletConnector>> {
        self.wallet.clone().ok_or(AppError::WalletUnavailable)
    }

    fn entry(&self, id: &str) -> Result<Arc<SessionEntry>> {
        self.sessions
            .read()
            .map_err(|_| AppError::Internal("session map poisoned".to_string()))?
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    fn insert(&self, id: String, entry: Arc<SessionEntry>) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| AppError::Internal("session map poisoned".to_string()))?;
        while sessions.len() >= MAX_SESSIONS {
            let oldest = sessions
                .iter()
                .filter_map(|(key, e)| e.with(|s| s.created_at).ok().map(|at| (at, key.clone())))
                .min();
            match oldest {
                Some((_, key)) => {
                    sessions.remove(&key);
                }
                None => break,
            }
        }
        sessions.insert(id, entry);
        Ok(())
    }
}

fn ensure_open(session: &Session) -> Result<()> {
    if session.completed {
        return Err(AppError::Conflict("Session already completed".to_string()));
    }
    Ok(())
}

async fn deliver(
    dispatcher: &CallbackDispatcher,
    entry: &Arc<SessionEntry>,
    params: &LaunchParams,
    payload: CallbackPayload,
) {
    let Some(url) = params.callback.as_deref() else {
        tracing::debug!("No callback URL, {} result kept local", payload.label());
        return;
    };
    let uid = params.uid.as_deref().unwrap_or_default();
    let sink = SessionSink {
        entry: entry.clone(),
    };
    let _ = dispatcher.dispatch(uid, url, &payload, &sink).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::callback_dispatcher::RetryPolicy;
    use crate::wallet::stub::{StubWallet, STUB_ACCOUNT};
    use axum::{
        extract::State,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::time::Duration;

    #[derive(Clone)]
    struct Caller {
        operation: Value,
        hook_status: StatusCode,
        received: Arc<Mutex<Vec<Value>>>,
    }

    async fn serve_caller(caller: Caller) -> String {
        let router = Router::new()
            .route(
                "/op",
                get(|State(c): State<Caller>| async move { Json(c.operation.clone()) }),
            )
            .route(
                "/hook",
                post(
                    |State(c): State<Caller>, Json(body): Json<Value>| async move {
                        c.received.lock().unwrap().push(body);
                        c.hook_status
                    },
                ),
            )
            .with_state(caller);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn transaction_op() -> Value {
        json!({
            "chainId": 8453,
            "address": format!("0x{}", "11".repeat(20)),
            "abi": ["function foo()"],
            "functionName": "foo",
            "args": [],
        })
    }

    fn signature_op() -> Value {
        json!({
            "domain": {
                "name": "Witbot",
                "version": "1",
                "chainId": 8453,
                "verifyingContract": format!("0x{}", "22".repeat(20)),
            },
            "primaryType": "Bet",
            "types": {"Bet": [{"name": "amount", "type": "uint256"}]},
            "message": {"amount": "1"},
        })
    }

    struct Harness {
        store: Arc<SessionStore>,
        wallet: Arc<StubWallet>,
        events: WalletEvents,
        received: Arc<Mutex<Vec<Value>>>,
        base: String,
    }

    async fn harness(operation: Value, hook_status: StatusCode, wallet: StubWallet) -> Harness {
        let received = Arc::new(Mutex::new(Vec::new()));
        let base = serve_caller(Caller {
            operation,
            hook_status,
            received: received.clone(),
        })
        .await;
        let events = wallet.events.clone();
        let wallet = Arc::new(wallet);
        let dispatcher = CallbackDispatcher::new(
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
            },
            Duration::from_secs(5),
            10,
        )
        .unwrap();
        let store = SessionStore::new(
            QueryLoader::new(Duration::from_secs(5)).unwrap(),
            Arc::new(dispatcher),
            Some(wallet.clone() as Arc<dyn WalletConnector>),
            &events,
        );
        Harness {
            store,
            wallet,
            events,
            received,
            base,
        }
    }

    fn launch_params(base: &str, kind: &str) -> LaunchParams {
        let query: HashMap<String, String> = [
            ("source", format!("{}/op", base)),
            ("callback", format!("{}/hook", base)),
            ("type", kind.to_string()),
            ("uid", "abc".to_string()),
            ("botName", "Witty".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        LaunchParams::from_query(&query)
    }

    async fn wait_for_callbacks(received: &Arc<Mutex<Vec<Value>>>, count: usize) -> Vec<Value> {
        for _ in 0..100 {
            {
                let bodies = received.lock().unwrap();
                if bodies.len() >= count {
                    return bodies.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        received.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn transaction_launch_offers_only_submit() {
        let h = harness(transaction_op(), StatusCode::OK, StubWallet::new(8453, WalletEvents::new())).await;
        let view = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap();

        assert_eq!(view.phase, "awaiting-transaction");
        assert_eq!(view.handler, Some("transaction"));
        assert_eq!(view.actions, vec!["submit_transaction"]);
        assert_eq!(view.transaction, Some(TransactionState::Idle));
        assert!(view.signature.is_none());
        assert_eq!(view.bot_name.as_deref(), Some("Witty"));
    }

    #[tokio::test]
    async fn signature_launch_offers_only_sign() {
        let h = harness(signature_op(), StatusCode::OK, StubWallet::new(8453, WalletEvents::new())).await;
        let view = h.store.launch(launch_params(&h.base, "signature")).await.unwrap();

        assert_eq!(view.phase, "awaiting-signature");
        assert_eq!(view.handler, Some("signature"));
        assert_eq!(view.actions, vec!["sign_message"]);
        assert!(view.transaction.is_none());
    }

    #[tokio::test]
    async fn invalid_payload_shows_error_and_no_handler() {
        let mut op = transaction_op();
        op.as_object_mut().unwrap().remove("address");
        let h = harness(op, StatusCode::OK, StubWallet::new(8453, WalletEvents::new())).await;
        let view = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap();

        assert_eq!(view.phase, "error");
        assert!(view.handler.is_none());
        assert!(view.actions.is_empty());
        assert!(matches!(view.error, Some(LoaderError::Validation(_))));
        assert_eq!(h.store.view(&view.id).unwrap().phase, "error");
    }

    #[tokio::test]
    async fn submitted_transaction_posts_hash_then_confirmation() {
        let h = harness(transaction_op(), StatusCode::OK, StubWallet::new(8453, WalletEvents::new())).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        let view = h.store.submit_transaction(&id).await.unwrap();
        assert_eq!(view.phase, "completed");
        assert!(view.actions.is_empty());
        let hash = view.transaction.as_ref().and_then(|t| t.hash()).unwrap().to_string();

        let bodies = wait_for_callbacks(&h.received, 2).await;
        assert_eq!(bodies[0], json!({"hash": hash, "uid": "abc", "transaction": true}));
        assert_eq!(
            bodies[1],
            json!({"hash": hash, "confirmed": true, "uid": "abc", "transaction": true})
        );

        let again = h.store.submit_transaction(&id).await.unwrap_err();
        assert!(matches!(again, AppError::Conflict(_)));
        assert_eq!(h.wallet.sent_count(), 1);
    }

    #[tokio::test]
    async fn reverted_receipt_posts_unconfirmed_callback() {
        let wallet = StubWallet::new(8453, WalletEvents::new());
        *wallet.receipt.lock().unwrap() = Ok(false);
        let h = harness(transaction_op(), StatusCode::OK, wallet).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        let view = h.store.submit_transaction(&id).await.unwrap();
        let hash = view.transaction.as_ref().and_then(|t| t.hash()).unwrap().to_string();

        let bodies = wait_for_callbacks(&h.received, 2).await;
        assert_eq!(
            bodies[1],
            json!({"hash": hash, "confirmed": false, "uid": "abc", "transaction": true})
        );
        assert!(matches!(
            h.store.view(&id).unwrap().transaction,
            Some(TransactionState::Submitted { confirmed: Some(false), .. })
        ));
    }

    #[tokio::test]
    async fn missing_receipt_sends_no_second_callback() {
        let wallet = StubWallet::new(8453, WalletEvents::new());
        *wallet.receipt.lock().unwrap() = Err("receipt timed out".to_string());
        let h = harness(transaction_op(), StatusCode::OK, wallet).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        h.store.submit_transaction(&id).await.unwrap();
        let bodies = wait_for_callbacks(&h.received, 2).await;
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].get("confirmed").is_none());
        assert!(matches!(
            h.store.view(&id).unwrap().transaction,
            Some(TransactionState::Submitted { confirmed: None, .. })
        ));
    }

    #[tokio::test]
    async fn network_mismatch_switches_first() {
        let h = harness(transaction_op(), StatusCode::OK, StubWallet::new(1, WalletEvents::new())).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        let view = h.store.submit_transaction(&id).await.unwrap();
        assert!(matches!(
            view.transaction,
            Some(TransactionState::SwitchingNetwork { target_chain_id: 8453, .. })
        ));
        assert_eq!(h.wallet.sent_count(), 0);
        assert!(h.received.lock().unwrap().is_empty());

        let view = h.store.submit_transaction(&id).await.unwrap();
        assert_eq!(view.phase, "completed");
    }

    #[tokio::test]
    async fn failed_attempt_is_reported_and_retryable() {
        let wallet = StubWallet::new(8453, WalletEvents::new());
        wallet.fail_sends("User rejected the request");
        let h = harness(transaction_op(), StatusCode::OK, wallet).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        let view = h.store.submit_transaction(&id).await.unwrap();
        assert_eq!(view.phase, "awaiting-transaction");
        assert!(matches!(view.transaction, Some(TransactionState::Failed { .. })));
        let bodies = wait_for_callbacks(&h.received, 1).await;
        assert_eq!(bodies[0]["uid"], "abc");
        assert_eq!(bodies[0]["transaction"], true);
        assert!(bodies[0]["error"].as_str().unwrap().contains("User rejected"));

        *h.wallet.send_error.lock().unwrap() = None;
        assert_eq!(h.store.submit_transaction(&id).await.unwrap().phase, "completed");
    }

    #[tokio::test]
    async fn chain_change_discards_idle_failed_state() {
        let wallet = StubWallet::new(8453, WalletEvents::new());
        wallet.fail_sends("execution reverted");
        let h = harness(transaction_op(), StatusCode::OK, wallet).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;
        h.store.submit_transaction(&id).await.unwrap();

        h.events.emit(WalletEvent::ChainChanged { chain_id: 10 });
        assert_eq!(
            h.store.view(&id).unwrap().transaction,
            Some(TransactionState::Idle)
        );
    }

    #[tokio::test]
    async fn concurrent_attempt_is_rejected_as_busy() {
        let wallet = StubWallet {
            send_delay: Duration::from_millis(200),
            ..StubWallet::new(8453, WalletEvents::new())
        };
        let h = harness(transaction_op(), StatusCode::OK, wallet).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        let (first, second) = tokio::join!(
            h.store.submit_transaction(&id),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                h.store.submit_transaction(&id).await
            }
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(h.wallet.sent_count(), 1);
    }

    #[tokio::test]
    async fn signed_message_posts_signature_flag() {
        let h = harness(signature_op(), StatusCode::OK, StubWallet::new(8453, WalletEvents::new())).await;
        let id = h.store.launch(launch_params(&h.base, "signature")).await.unwrap().id;

        let view = h.store.sign_message(&id).await.unwrap();
        let signature = view.signature.as_ref().and_then(|s| s.signature()).unwrap().to_string();
        let bodies = wait_for_callbacks(&h.received, 1).await;
        assert_eq!(
            bodies[0],
            json!({"hash": signature, "uid": "abc", "signature": true})
        );
        assert!(matches!(
            h.store.submit_transaction(&id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn connect_posts_connect_wallet_notice() {
        let h = harness(transaction_op(), StatusCode::OK, StubWallet::new(8453, WalletEvents::new())).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        h.store.announce_connection(&id).await.unwrap();
        let bodies = wait_for_callbacks(&h.received, 1).await;
        assert_eq!(
            bodies[0],
            json!({"type": "connect_wallet", "address": STUB_ACCOUNT, "connect": true, "uid": "abc"})
        );
    }

    #[tokio::test]
    async fn connect_without_callback_is_bad_request() {
        let h = harness(transaction_op(), StatusCode::OK, StubWallet::new(8453, WalletEvents::new())).await;
        let mut params = launch_params(&h.base, "transaction");
        params.callback = None;
        let id = h.store.launch(params).await.unwrap().id;

        assert!(matches!(
            h.store.announce_connection(&id).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(h.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_callback_is_recorded_on_session() {
        let h = harness(transaction_op(), StatusCode::BAD_REQUEST, StubWallet::new(8453, WalletEvents::new())).await;
        let id = h.store.launch(launch_params(&h.base, "transaction")).await.unwrap().id;

        let view = h.store.submit_transaction(&id).await.unwrap();
        assert!(view.callback_error.unwrap().contains("400"));
    }

    #[tokio::test]
    async fn missing_wallet_is_unavailable() {
        let events = WalletEvents::new();
        let store = SessionStore::new(
            QueryLoader::new(Duration::from_secs(1)).unwrap(),
            Arc::new(CallbackDispatcher::new(
                RetryPolicy {
                    max_attempts: 1,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(1),
                },
                Duration::from_secs(1),
                1,
            )
            .unwrap()),
            None,
            &events,
        );
        let view = store.launch(LaunchParams::from_query(&HashMap::new())).await.unwrap();
        assert!(matches!(
            store.submit_transaction(&view.id).await,
            Err(AppError::WalletUnavailable)
        ));
        assert!(matches!(store.view("nope"), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn dropping_store_unsubscribes_listener() {
        let events = WalletEvents::new();
        let store = SessionStore::new(
            QueryLoader::new(Duration::from_secs(1)).unwrap(),
            Arc::new(CallbackDispatcher::new(
                RetryPolicy {
                    max_attempts: 1,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(1),
                },
                Duration::from_secs(1),
                1,
            )
            .unwrap()),
            None,
            &events,
        );
        assert_eq!(events.listener_count(), 1);
        drop(store);
        assert_eq!(events.listener_count(), 0);
    }
}
