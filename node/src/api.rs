//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the hosted sale over HTTP. All
//! endpoints share application state through axum's `State` extractor, and
//! every sale operation goes through the lock-serialized [`SaleHost`].
//!
//! ## Endpoints
//!
//! | Method | Path                   | Auth          | Description                              |
//! |--------|------------------------|---------------|------------------------------------------|
//! | GET    | `/health`              |               | Liveness check                           |
//! | GET    | `/status`              |               | Sale summary                             |
//! | GET    | `/balances/:address`   |               | Token and value balance of an account    |
//! | GET    | `/events`              |               | Sale event log                           |
//! | POST   | `/deposit`             | admin         | Credit value to an account (devnet only) |
//! | POST   | `/purchase`            | sender key    | Buy tokens                               |
//! | POST   | `/transfer`            | `from` key    | Move tokens between holders              |
//! | POST   | `/finalize`            | admin         | Close the sale                           |
//! | GET    | `/ws`                  |               | WebSocket for live block/sale events     |
//!
//! Tokens go in an `Authorization: Bearer <token>` header; see
//! [`crate::auth`]. Amounts are `u128` and travel as decimal strings so that
//! JSON clients without big-integer numbers read them exactly.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tokensale_contracts::{
    Address, Clock, FinalizeError, LedgerError, ManualClock, PurchaseError, PurchaseReceipt,
    SaleEvent, SaleHost, SalePhase, TransferError, ValueBank,
};

use crate::auth::{ApiAuth, AuthError};
use crate::metrics::SharedMetrics;

/// The sale as hosted by this node.
pub type NodeSale = SaleHost<ManualClock, ValueBank>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cloning is cheap; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The hosted sale.
    pub sale: NodeSale,
    /// The sale owner. `/finalize` acts as this account once the admin
    /// token checks out.
    pub admin: Address,
    /// Bearer-token checks for the mutating endpoints.
    pub auth: ApiAuth,
    /// Handle on the block counter the sale reads.
    pub clock: ManualClock,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<NodeEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Copies sale totals into the metric gauges.
    fn refresh_gauges(&self) {
        let snapshot = self.sale.snapshot();
        self.metrics.tokens_sold.set(snapshot.tokens_sold as f64);
        self.metrics.value_raised.set(snapshot.value_raised as f64);
        self.metrics.block_counter.set(snapshot.counter as i64);
    }
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// The block counter advanced.
    NewBlock { counter: u64, timestamp: u64 },
    /// A purchase settled.
    TokensIssued {
        receipt_id: String,
        beneficiary: Address,
        #[serde(with = "decimal")]
        contribution: u128,
        #[serde(with = "decimal")]
        tokens: u128,
        counter: u64,
    },
    /// A holder moved tokens.
    Transferred {
        from: Address,
        to: Address,
        #[serde(with = "decimal")]
        amount: u128,
    },
    /// The sale was finalized.
    Finalized {
        #[serde(with = "decimal")]
        tokens_sold: u128,
        counter: u64,
    },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/balances/:address", get(balance_handler))
        .route("/events", get(events_handler))
        .route("/deposit", post(deposit_handler))
        .route("/purchase", post(purchase_handler))
        .route("/transfer", post(transfer_handler))
        .route("/finalize", post(finalize_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Serde helper: `u128` as a decimal string.
mod decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}

/// Body of `POST /deposit`.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub address: Address,
    #[serde(with = "decimal")]
    pub amount: u128,
}

/// Body of `POST /purchase`. Without a beneficiary the sender is credited.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub sender: Address,
    #[serde(default)]
    pub beneficiary: Option<Address>,
    #[serde(with = "decimal")]
    pub contribution: u128,
}

/// Body of `POST /transfer`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    #[serde(with = "decimal")]
    pub amount: u128,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    pub phase: SalePhase,
    /// Current block counter.
    pub counter: u64,
    pub start: u64,
    pub end: u64,
    #[serde(with = "decimal")]
    pub exchange_rate: u128,
    #[serde(with = "decimal")]
    pub cap: u128,
    #[serde(with = "decimal")]
    pub tokens_sold: u128,
    #[serde(with = "decimal")]
    pub total_supply: u128,
    #[serde(with = "decimal")]
    pub value_raised: u128,
    pub is_finalized: bool,
    pub sale_address: Address,
    pub ledger_address: Address,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /balances/:address` and `POST /transfer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: Address,
    /// Sale token balance.
    #[serde(with = "decimal")]
    pub tokens: u128,
    /// Value balance held on the host.
    #[serde(with = "decimal")]
    pub value: u128,
}

/// Response payload for `POST /deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositResponse {
    pub address: Address,
    #[serde(with = "decimal")]
    pub tokens: u128,
    #[serde(with = "decimal")]
    pub value: u128,
    /// Bearer token that lets the account spend its value.
    pub account_key: String,
}

/// Response payload for a settled purchase.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub receipt_id: String,
    pub sender: Address,
    pub beneficiary: Address,
    #[serde(with = "decimal")]
    pub contribution: u128,
    #[serde(with = "decimal")]
    pub tokens: u128,
    #[serde(with = "decimal")]
    pub reserve_tokens: u128,
    pub counter: u64,
    #[serde(with = "decimal")]
    pub tokens_sold: u128,
}

impl From<&PurchaseReceipt> for ReceiptResponse {
    fn from(r: &PurchaseReceipt) -> Self {
        Self {
            receipt_id: r.receipt_id.to_string(),
            sender: r.sender,
            beneficiary: r.beneficiary,
            contribution: r.contribution,
            tokens: r.tokens,
            reserve_tokens: r.reserve_tokens,
            counter: r.counter,
            tokens_sold: r.tokens_sold,
        }
    }
}

/// One entry of `GET /events`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventResponse {
    TokensIssued {
        beneficiary: Address,
        #[serde(with = "decimal")]
        contribution: u128,
        #[serde(with = "decimal")]
        tokens: u128,
        counter: u64,
    },
    Transferred {
        from: Address,
        to: Address,
        #[serde(with = "decimal")]
        amount: u128,
        counter: u64,
    },
    Finalized {
        #[serde(with = "decimal")]
        tokens_sold: u128,
        counter: u64,
    },
}

impl From<&SaleEvent> for EventResponse {
    fn from(event: &SaleEvent) -> Self {
        match *event {
            SaleEvent::TokensIssued {
                beneficiary,
                contribution,
                tokens,
                counter,
            } => EventResponse::TokensIssued {
                beneficiary,
                contribution,
                tokens,
                counter,
            },
            SaleEvent::Transferred {
                from,
                to,
                amount,
                counter,
            } => EventResponse::Transferred {
                from,
                to,
                amount,
                counter,
            },
            SaleEvent::Finalized {
                tokens_sold,
                counter,
            } => EventResponse::Finalized {
                tokens_sold,
                counter,
            },
        }
    }
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A rejected request: HTTP status plus message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: e.to_string(),
        }
    }
}

impl From<PurchaseError> for ApiError {
    fn from(e: PurchaseError) -> Self {
        let status = match e {
            PurchaseError::OutsideWindow { .. }
            | PurchaseError::AlreadyFinalized
            | PurchaseError::CapExceeded { .. } => StatusCode::CONFLICT,
            PurchaseError::ZeroContribution | PurchaseError::Ledger(_) => StatusCode::BAD_REQUEST,
            PurchaseError::ForwardingFailed(_) => StatusCode::PAYMENT_REQUIRED,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match e {
            LedgerError::InsufficientBalance { .. } => StatusCode::CONFLICT,
            LedgerError::Unauthorized => StatusCode::FORBIDDEN,
            LedgerError::InvalidRecipient | LedgerError::ZeroAmount | LedgerError::Overflow { .. } => {
                StatusCode::BAD_REQUEST
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<FinalizeError> for ApiError {
    fn from(e: FinalizeError) -> Self {
        let status = match e {
            FinalizeError::Unauthorized => StatusCode::FORBIDDEN,
            FinalizeError::AlreadyFinalized | FinalizeError::SaleStillActive { .. } => {
                StatusCode::CONFLICT
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: Returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: Returns the sale summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let snap = state.sale.snapshot();
    Json(StatusResponse {
        version: state.version.clone(),
        phase: snap.phase,
        counter: snap.counter,
        start: snap.start,
        end: snap.end,
        exchange_rate: snap.exchange_rate,
        cap: snap.cap,
        tokens_sold: snap.tokens_sold,
        total_supply: snap.total_supply,
        value_raised: snap.value_raised,
        is_finalized: snap.is_finalized,
        sale_address: snap.sale_address,
        ledger_address: snap.ledger_address,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Token and value balance of `address`, read under one lock.
fn balance_of(state: &AppState, address: Address) -> BalanceResponse {
    let (tokens, value) = state
        .sale
        .with_sale(|sale| (sale.balance_of(&address), sale.funds().balance_of(&address)));
    BalanceResponse {
        address,
        tokens,
        value,
    }
}

/// `GET /balances/:address`: Token and value balance of one account.
async fn balance_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|e| ApiError::bad_request(format!("{e}")))?;
    Ok(Json(balance_of(&state, address)))
}

/// `GET /events`: The sale's event log, oldest first.
async fn events_handler(State(state): State<AppState>) -> Json<Vec<EventResponse>> {
    Json(state.sale.events().iter().map(EventResponse::from).collect())
}

/// `POST /deposit`: Credits host value to an account and returns the key
/// that lets the account spend it.
///
/// Devnet only: stands in for the platform's own funding of accounts.
async fn deposit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    state.auth.require_admin(&headers)?;

    let (tokens, value) = state
        .sale
        .with_sale(|sale| {
            let value = sale.funds_mut().deposit(req.address, req.amount)?;
            Ok::<_, TransferError>((sale.balance_of(&req.address), value))
        })
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    tracing::info!(address = %req.address, amount = %req.amount, "value deposited");

    Ok(Json(DepositResponse {
        address: req.address,
        tokens,
        value,
        account_key: state.auth.account_token(&req.address),
    }))
}

/// `POST /purchase`: Buys tokens for the named beneficiary, or for the
/// sender when none is named. Requires the sender's account key.
async fn purchase_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    state.auth.require_account(&headers, &req.sender)?;

    let result = match req.beneficiary {
        Some(beneficiary) => state.sale.purchase_for(req.sender, beneficiary, req.contribution),
        None => state.sale.contribute(req.sender, req.contribution),
    };

    let receipt = match result {
        Ok(receipt) => receipt,
        Err(e) => {
            state.metrics.purchase_rejections_total.inc();
            return Err(e.into());
        }
    };

    state.metrics.purchases_total.inc();
    state.refresh_gauges();

    // No subscribers is fine.
    let _ = state.event_tx.send(NodeEvent::TokensIssued {
        receipt_id: receipt.receipt_id.to_string(),
        beneficiary: receipt.beneficiary,
        contribution: receipt.contribution,
        tokens: receipt.tokens,
        counter: receipt.counter,
    });

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// `POST /transfer`: Moves tokens from `from` to `to`. Requires `from`'s
/// account key. Returns the sender's balance afterwards.
async fn transfer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TransferRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    state.auth.require_account(&headers, &req.from)?;
    state.sale.transfer(req.from, req.to, req.amount)?;

    state.metrics.transfers_total.inc();
    let _ = state.event_tx.send(NodeEvent::Transferred {
        from: req.from,
        to: req.to,
        amount: req.amount,
    });

    Ok(Json(balance_of(&state, req.from)))
}

/// `POST /finalize`: Closes the sale on behalf of the sale owner. Requires
/// the admin token.
async fn finalize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    state.auth.require_admin(&headers)?;
    state.sale.finalize(&state.admin)?;

    state.metrics.finalizations_total.inc();
    state.refresh_gauges();

    let snap = state.sale.snapshot();
    let _ = state.event_tx.send(NodeEvent::Finalized {
        tokens_sold: snap.tokens_sold,
        counter: snap.counter,
    });

    Ok(status_handler(State(state)).await)
}

/// `GET /ws`: Upgrades to a WebSocket that streams [`NodeEvent`]s.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    // Push-only channel; client messages are ignored.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

/// Advances the block counter by one and publishes the new height.
///
/// Called by the node's tick loop; kept here so tests can drive time
/// through the same path.
pub fn tick(state: &AppState) -> u64 {
    let counter = state.clock.advance(1);
    state.metrics.block_counter.set(counter as i64);
    let _ = state.event_tx.send(NodeEvent::NewBlock {
        counter,
        timestamp: chrono::Utc::now().timestamp_millis() as u64,
    });
    tracing::debug!(counter, "block counter advanced");
    counter
}

/// Returns the counter the sale currently observes.
pub fn current_counter(state: &AppState) -> u64 {
    state.clock.now()
}
