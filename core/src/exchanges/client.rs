//! Exchange client (§4.B): the streaming receive loop, the HTTP request
//! worker, the keepalive/re-subscription timer, and the outbound
//! `send_order_add`/`send_order_cancel` API that makes both paths look like
//! the same `signal_recv` stream to the strategy.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::exchanges::common::{send_event, CurrencyCode};
use crate::exchanges::events::{
    ConnectedEvent, ExchangeEvent, OwnsChangedEvent, RemarkEvent, ResultEvent, TickerEvent,
    TradeEvent, WalletEvent,
};
use crate::exchanges::order_book::{Order, OrderBook, OrderSide, OrderStatus, OwnOrderRegistry, Wallet};
use crate::exchanges::signed_caller::{order_add_reqid, order_cancel_reqid, QueuedRequest, SignedCaller};
use crate::infrastructure::{spawn_by_timer, spawn_future};
use crate::lifecycle::app_lifetime_manager::AppLifetimeManager;
use crate::misc::time::time_manager;
use crate::settings::ExchangeSettings;
use mmb_domain::market::ExchangeAccountId;
use mmb_utils::infrastructure::SpawnFutureFlags;

/// Timer cadence for the keepalive/liveness check (§4.B).
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);
/// Frames stop arriving for this long ⇒ the receive loop forces a reconnect.
const STALE_AFTER: Duration = Duration::from_secs(60);
/// Channel subscriptions are refreshed past this age even if still alive.
const RESUBSCRIBE_AFTER: Duration = Duration::from_secs(30 * 60);
/// Exponential-capped reconnect backoff (§4.B): starts at 1s, caps at 60s.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// How often the receive loop polls the socket while watching for the
/// liveness/resubscribe flags the keepalive timer sets.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct ClientState {
    order_book: OrderBook,
    wallet: Wallet,
    registry: OwnOrderRegistry,
}

/// Per-venue client: owns the streaming connection, the outbound HTTP queue,
/// and the in-memory order book / wallet projection those two feeds drive.
pub struct ExchangeClient {
    pub exchange_account_id: ExchangeAccountId,
    settings: ExchangeSettings,
    signed_caller: SignedCaller,
    events_tx: broadcast::Sender<ExchangeEvent>,
    request_tx: mpsc::UnboundedSender<QueuedRequest>,
    request_rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedRequest>>>,
    lifetime_manager: Arc<AppLifetimeManager>,
    state: Mutex<ClientState>,
    last_received_millis: AtomicI64,
    last_subscribed_millis: AtomicI64,
    force_reconnect: AtomicBool,
    needs_resubscribe: AtomicBool,
}

impl ExchangeClient {
    pub fn new(
        settings: ExchangeSettings,
        exchange_account_id: ExchangeAccountId,
        marker_digit: Option<u8>,
        lifetime_manager: Arc<AppLifetimeManager>,
    ) -> (Arc<Self>, broadcast::Receiver<ExchangeEvent>) {
        let (events_tx, events_rx) = broadcast::channel(crate::exchanges::events::CHANNEL_MAX_EVENTS_COUNT);
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let signed_caller = SignedCaller::new(&settings, exchange_account_id);

        let client = Arc::new(Self {
            exchange_account_id,
            settings,
            signed_caller,
            events_tx,
            request_tx,
            request_rx: Mutex::new(Some(request_rx)),
            lifetime_manager,
            state: Mutex::new(ClientState {
                order_book: OrderBook::new(),
                wallet: Wallet::new(),
                registry: OwnOrderRegistry::new(marker_digit),
            }),
            last_received_millis: AtomicI64::new(now_millis()),
            last_subscribed_millis: AtomicI64::new(0),
            force_reconnect: AtomicBool::new(false),
            needs_resubscribe: AtomicBool::new(true),
        });

        (client, events_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events_tx.subscribe()
    }

    /// Current order book / wallet projection (§4.C), cloned out for the
    /// strategy to decide against without holding the client's lock.
    pub fn snapshot(&self) -> (OrderBook, Wallet) {
        let state = self.state.lock();
        (state.order_book.clone(), state.wallet.clone())
    }

    /// Spawns the four §5 tasks for this venue: receive loop, HTTP worker,
    /// keepalive timer. (Strategy dispatch is the caller's own task, driven
    /// off the `broadcast::Receiver` returned by `new`/`subscribe`.)
    pub fn start(self: &Arc<Self>) {
        let receive_client = Arc::clone(self);
        spawn_future(
            "exchange client receive loop",
            SpawnFutureFlags::STOP_BY_TOKEN,
            async move {
                receive_client.run_receive_loop().await;
                Ok(())
            },
        );

        let worker_client = Arc::clone(self);
        spawn_future(
            "exchange client http worker",
            SpawnFutureFlags::STOP_BY_TOKEN,
            async move {
                worker_client.run_http_worker().await;
                Ok(())
            },
        );

        let keepalive_client = Arc::clone(self);
        spawn_by_timer(
            move || {
                let client = Arc::clone(&keepalive_client);
                async move { client.check_liveness() }
            },
            "exchange client keepalive",
            KEEPALIVE_PERIOD,
            KEEPALIVE_PERIOD,
            SpawnFutureFlags::STOP_BY_TOKEN,
        );
    }

    fn check_liveness(&self) {
        let now = now_millis();
        let last_received = self.last_received_millis.load(Ordering::Relaxed);
        if now - last_received > STALE_AFTER.as_millis() as i64 {
            log::warn!(
                "{}: no frames received in {:?}, forcing reconnect",
                self.exchange_account_id,
                STALE_AFTER
            );
            self.force_reconnect.store(true, Ordering::Relaxed);
        }

        let last_subscribed = self.last_subscribed_millis.load(Ordering::Relaxed);
        if now - last_subscribed > RESUBSCRIBE_AFTER.as_millis() as i64 {
            self.needs_resubscribe.store(true, Ordering::Relaxed);
        }
    }

    // -- outbound API (§4.B) -------------------------------------------------

    pub fn send_order_add(&self, side: OrderSide, price: Decimal, volume: Decimal) -> String {
        let side_str = match side {
            OrderSide::Bid => "bid",
            OrderSide::Ask => "ask",
        };
        let reqid = order_add_reqid(side_str, price, volume);
        let request = QueuedRequest::new(
            "order/add",
            vec![
                ("side", side_str.to_owned()),
                ("price", price.to_string()),
                ("amount", volume.to_string()),
            ],
            reqid.clone(),
        );
        let _ = self.request_tx.send(request);
        reqid
    }

    pub fn send_order_cancel(&self, oid: &str) -> String {
        let reqid = order_cancel_reqid(oid);
        let request = QueuedRequest::new("order/cancel", vec![("oid", oid.to_owned())], reqid.clone());
        let _ = self.request_tx.send(request);
        reqid
    }

    /// Forces a fresh balance snapshot; used by the rebalancer's *Reconciling*
    /// state to confirm post-fill balances before placing a new pair (§4.E).
    pub fn request_info(&self) {
        let _ = self
            .request_tx
            .send(QueuedRequest::new("info", vec![], "info".to_owned()));
    }

    fn request_open_orders(&self) {
        let _ = self
            .request_tx
            .send(QueuedRequest::new("orders", vec![], "orders".to_owned()));
    }

    // -- HTTP worker task (§4.B) ---------------------------------------------

    async fn run_http_worker(self: Arc<Self>) {
        let mut receiver = self
            .request_rx
            .lock()
            .take()
            .expect("run_http_worker invoked more than once");

        while let Some(request) = receiver.recv().await {
            tokio::time::sleep(Duration::from_millis(self.settings.min_request_interval_ms)).await;

            match self
                .signed_caller
                .signed_call(request.endpoint, &request.params)
                .await
            {
                Ok(data) => {
                    // Run the successful call through the same translation
                    // the streaming "result" frame gets (§4.B): a signed call
                    // and its venue's async confirmation are the same event
                    // to the strategy, just arriving over different transports.
                    let event = self.translate_result(request.reqid, data);
                    self.emit(event);
                }
                Err(error) => {
                    use mmb_domain::market::ExchangeErrorType::*;
                    match error.error_type {
                        Unknown | ServiceUnavailable | RateLimit | SendError => {
                            log::warn!(
                                "{}: transient error on {}, re-enqueuing: {}",
                                self.exchange_account_id,
                                request.endpoint,
                                error
                            );
                            let _ = self.request_tx.send(request);
                        }
                        _ => {
                            self.emit(ExchangeEvent::Remark(RemarkEvent {
                                exchange_account_id: self.exchange_account_id,
                                success: false,
                                message: error.message,
                                token: None,
                                id: Some(request.reqid),
                            }));
                        }
                    }
                }
            }
        }
    }

    // -- receive loop task (§4.B) --------------------------------------------

    async fn run_receive_loop(self: Arc<Self>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match connect_async(self.settings.websocket_host.as_str()).await {
                Ok((mut ws_stream, _)) => {
                    backoff = INITIAL_BACKOFF;
                    self.subscribe_channels(&mut ws_stream).await;
                    self.request_open_orders();
                    self.request_info();

                    self.emit(ExchangeEvent::Connected(ConnectedEvent {
                        exchange_account_id: self.exchange_account_id,
                    }));

                    loop {
                        if self.force_reconnect.swap(false, Ordering::Relaxed) {
                            log::info!("{}: forced reconnect", self.exchange_account_id);
                            break;
                        }
                        if self.needs_resubscribe.swap(false, Ordering::Relaxed) {
                            self.subscribe_channels(&mut ws_stream).await;
                        }

                        match tokio::time::timeout(SOCKET_POLL_INTERVAL, ws_stream.next()).await {
                            Ok(Some(Ok(Message::Text(text)))) => {
                                self.last_received_millis.store(now_millis(), Ordering::Relaxed);
                                self.dispatch_frame(&text);
                            }
                            Ok(Some(Ok(_))) => {
                                self.last_received_millis.store(now_millis(), Ordering::Relaxed);
                            }
                            Ok(Some(Err(err))) => {
                                log::warn!("{}: websocket error: {}", self.exchange_account_id, err);
                                break;
                            }
                            Ok(None) => {
                                log::warn!("{}: websocket closed by peer", self.exchange_account_id);
                                break;
                            }
                            Err(_elapsed) => {
                                // No frame within the poll interval; loop back
                                // around to re-check the liveness flags.
                            }
                        }
                    }
                }
                Err(err) => {
                    log::warn!(
                        "{}: failed to connect websocket: {}, retrying in {:?}",
                        self.exchange_account_id,
                        err,
                        backoff
                    );
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
        }
    }

    async fn subscribe_channels(
        &self,
        ws_stream: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) {
        for channel in &self.settings.websocket_channels {
            let subscribe = serde_json::json!({ "op": "subscribe", "channel": channel });
            if let Err(err) = ws_stream.send(Message::Text(subscribe.to_string())).await {
                log::warn!(
                    "{}: failed to subscribe to {}: {}",
                    self.exchange_account_id,
                    channel,
                    err
                );
            }
        }
        self.last_subscribed_millis.store(now_millis(), Ordering::Relaxed);
    }

    /// Turns one inbound JSON frame (streaming, or an HTTP result the worker
    /// translated into the same shape) into an `ExchangeEvent` and, where the
    /// frame carries own-order/wallet state, updates the in-memory
    /// projection (§4.C) before broadcasting.
    fn dispatch_frame(&self, raw: &str) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("{}: malformed frame ignored: {}", self.exchange_account_id, err);
                return;
            }
        };

        let op = value.get("op").and_then(Value::as_str).unwrap_or_default();

        let event = match op {
            "ticker" => self.handle_ticker(&value),
            "trade" => self.handle_trade(&value),
            "remark" => Some(ExchangeEvent::Remark(RemarkEvent {
                exchange_account_id: self.exchange_account_id,
                success: value.get("success").and_then(Value::as_bool).unwrap_or(false),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                token: value.get("token").and_then(Value::as_str).map(str::to_owned),
                id: value.get("id").and_then(Value::as_str).map(str::to_owned),
            })),
            "result" => self.handle_result(&value),
            "depth" => self.handle_ticker(&value),
            other => {
                log::trace!("{}: unhandled op '{}'", self.exchange_account_id, other);
                None
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn emit(&self, event: ExchangeEvent) {
        let _ = send_event(
            &self.events_tx,
            Arc::clone(&self.lifetime_manager),
            self.exchange_account_id,
            event,
        );
    }

    fn handle_ticker(&self, value: &Value) -> Option<ExchangeEvent> {
        let bid: Decimal = value.get("bid")?.as_str()?.parse().ok()?;
        let ask: Decimal = value.get("ask")?.as_str()?.parse().ok()?;

        self.state.lock().order_book.update_ticker(bid, ask);

        Some(ExchangeEvent::Ticker(TickerEvent {
            exchange_account_id: self.exchange_account_id,
            bid,
            ask,
        }))
    }

    fn handle_trade(&self, value: &Value) -> Option<ExchangeEvent> {
        let price: Decimal = value.get("price")?.as_str()?.parse().ok()?;
        let volume: Decimal = value.get("volume")?.as_str()?.parse().ok()?;
        let side = match value.get("side")?.as_str()? {
            "bid" => OrderSide::Bid,
            "ask" => OrderSide::Ask,
            _ => return None,
        };
        let own = value.get("own").and_then(Value::as_bool).unwrap_or(false);
        let trade_id = value.get("trade_id").cloned().map(Into::into);

        Some(ExchangeEvent::Trade(TradeEvent {
            exchange_account_id: self.exchange_account_id,
            trade_id,
            date: time_manager::now(),
            price,
            volume,
            side,
            own,
        }))
    }

    fn handle_result(&self, value: &Value) -> Option<ExchangeEvent> {
        let id = value.get("id").and_then(Value::as_str)?.to_owned();
        let data = value.get("result").cloned().unwrap_or(Value::Null);
        Some(self.translate_result(id, data))
    }

    /// Shared translation for a successful call's result, whether it arrived
    /// as a streaming `{op:"result",...}` frame or as the HTTP worker's own
    /// rendering of a `signed_call` response (§4.B): both update the same
    /// wallet/order-book/registry projection and produce the same event.
    fn translate_result(&self, id: String, data: Value) -> ExchangeEvent {
        if id == "info" {
            let balances = self.apply_wallet_snapshot(&data);
            return ExchangeEvent::Wallet(WalletEvent {
                exchange_account_id: self.exchange_account_id,
                balances,
            });
        }

        if id == "orders" {
            self.apply_orders_snapshot(&data);
            return ExchangeEvent::OwnsChanged(OwnsChangedEvent {
                exchange_account_id: self.exchange_account_id,
            });
        }

        if let Some(oid) = id
            .strip_prefix("order_add:")
            .and(data.get("oid").and_then(Value::as_str))
        {
            self.state.lock().registry.register(oid.to_owned());
            return ExchangeEvent::OwnsChanged(OwnsChangedEvent {
                exchange_account_id: self.exchange_account_id,
            });
        }

        if let Some(oid) = id.strip_prefix("order_cancel:") {
            self.state.lock().registry.forget(oid);
            return ExchangeEvent::OwnsChanged(OwnsChangedEvent {
                exchange_account_id: self.exchange_account_id,
            });
        }

        ExchangeEvent::Result(ResultEvent {
            exchange_account_id: self.exchange_account_id,
            data,
            id,
        })
    }

    fn apply_wallet_snapshot(&self, data: &Value) -> Vec<(CurrencyCode, Decimal)> {
        let Some(balances) = data.as_object() else {
            return Vec::new();
        };

        let mut state = self.state.lock();
        let mut applied = Vec::with_capacity(balances.len());
        for (currency, amount) in balances {
            if let Some(amount) = amount.as_str().and_then(|s| s.parse::<Decimal>().ok()) {
                let code = CurrencyCode::from(currency.as_str());
                state.wallet.set(code, amount);
                applied.push((code, amount));
            }
        }
        applied
    }

    fn apply_orders_snapshot(&self, data: &Value) {
        let Some(orders) = data.as_array() else {
            return;
        };

        let parsed: Vec<Order> = orders
            .iter()
            .filter_map(|entry| {
                let oid = entry.get("oid")?.as_str()?.to_owned();
                let side = match entry.get("side")?.as_str()? {
                    "bid" => OrderSide::Bid,
                    "ask" => OrderSide::Ask,
                    _ => return None,
                };
                let price: Decimal = entry.get("price")?.as_str()?.parse().ok()?;
                let volume: Decimal = entry.get("volume")?.as_str()?.parse().ok()?;
                let status = match entry.get("status")?.as_str()? {
                    "open" => OrderStatus::Open,
                    "pending" => OrderStatus::Pending,
                    "submitted" => OrderStatus::Submitted,
                    "executing" => OrderStatus::Executing,
                    "post-pending" => OrderStatus::PostPending,
                    "removed" => OrderStatus::Removed,
                    _ => return None,
                };
                Some(Order::new(oid, side, price, volume, status))
            })
            .collect();

        let mut state = self.state.lock();
        let registry = state.registry.clone();
        state.order_book.owns = parsed.into_iter().filter(|order| registry.owns(order)).collect();
    }
}

fn now_millis() -> i64 {
    time_manager::now().timestamp_millis()
}
