//! Inbound client backed by a WebSocket gateway.
//!
//! The gateway is a separate process that owns the mobile chat session
//! (transport, encryption, device pairing, contact storage). We talk to it
//! with JSON text frames tagged by `type`:
//!
//! - client → gateway: `connect`, `disconnect`, `get_contact`, `get_group_info`
//! - gateway → client: `response`, `event`, `qr`, `paired`
//!
//! Requests carry an `id` that the matching `response` echoes back.
//!
//! Each WebSocket link runs a writer, a pinger and a reader. Across links, a
//! session keeps one dispatcher feeding events to the registered handler one
//! at a time, and a supervisor that re-establishes the link when the gateway
//! drops it. Keeping the handler off the reader task lets it issue directory
//! lookups while events are being processed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::events::{InboundEvent, Jid};
use crate::inbound::{
    ContactInfo, Directory, GroupInfo, InboundClient, InboundEventHandler, PairingEvent,
};
use crate::store::DeviceStore;

/// Capacity of the outgoing frame queue.
const OUTGOING_CAPACITY: usize = 100;
/// Capacity of the pairing event stream.
const PAIRING_CAPACITY: usize = 16;

/// Tunables for the gateway connection.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// How long to wait for a response to a request.
    pub request_timeout: Duration,
    /// Ping interval for WebSocket keep-alive.
    pub ping_interval: Duration,
    /// First delay before re-establishing a lost link. Doubles per failure.
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// How long `disconnect` waits for queued events to be handled.
    pub drain_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Frames sent to the gateway.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Connect {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
    },
    Disconnect,
    GetContact {
        id: u64,
        jid: String,
    },
    GetGroupInfo {
        id: u64,
        jid: String,
    },
}

/// Frames received from the gateway.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayFrame {
    Response(GatewayResponse),
    Event {
        event: InboundEvent,
    },
    Qr {
        event: String,
        #[serde(default)]
        code: Option<String>,
    },
    Paired {
        device_id: String,
    },
    #[serde(other)]
    Unknown,
}

/// Reply to a request.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    id: u64,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// Requests waiting for a response.
///
/// `open` is only true while a reader is running, so no request can start
/// waiting on a link that will never route its response.
#[derive(Default)]
struct Pending {
    open: bool,
    waiters: HashMap<u64, oneshot::Sender<GatewayResponse>>,
}

impl Pending {
    /// Stop accepting requests and fail every waiter.
    fn close(&mut self) {
        self.open = false;
        self.waiters.clear();
    }
}

/// Tasks that outlive a single link.
struct SessionTasks {
    events: mpsc::UnboundedSender<InboundEvent>,
    dispatch: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

/// State shared between the client handle and its tasks.
struct Shared {
    url: String,
    store: Arc<DeviceStore>,
    options: GatewayOptions,
    next_id: AtomicU64,
    outgoing: RwLock<Option<mpsc::Sender<WsMessage>>>,
    pending: Mutex<Pending>,
    handler: RwLock<Option<Arc<dyn InboundEventHandler>>>,
    handler_ready: Notify,
    pairing_tx: Mutex<Option<mpsc::Sender<PairingEvent>>>,
    link_tasks: Mutex<Vec<JoinHandle<()>>>,
    link_lost: Notify,
    session: Mutex<Option<SessionTasks>>,
    closing: AtomicBool,
}

/// Inbound client talking to a gateway over WebSocket.
#[derive(Clone)]
pub struct GatewayClient {
    shared: Arc<Shared>,
}

impl GatewayClient {
    pub fn new(url: impl Into<String>, store: Arc<DeviceStore>) -> Self {
        Self::with_options(url, store, GatewayOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        store: Arc<DeviceStore>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                store,
                options,
                next_id: AtomicU64::new(1),
                outgoing: RwLock::new(None),
                pending: Mutex::new(Pending::default()),
                handler: RwLock::new(None),
                handler_ready: Notify::new(),
                pairing_tx: Mutex::new(None),
                link_tasks: Mutex::new(Vec::new()),
                link_lost: Notify::new(),
                session: Mutex::new(None),
                closing: AtomicBool::new(false),
            }),
        }
    }

    /// Whether the WebSocket link is up.
    pub async fn is_connected(&self) -> bool {
        self.shared
            .outgoing
            .read()
            .await
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_frame(&self, frame: &ClientFrame) -> BridgeResult<()> {
        let json = serde_json::to_string(frame)?;
        let tx = self
            .shared
            .outgoing
            .read()
            .await
            .clone()
            .ok_or_else(|| BridgeError::Gateway("Not connected".to_string()))?;
        tx.send(WsMessage::Text(json))
            .await
            .map_err(|_| BridgeError::Gateway("Connection closed".to_string()))
    }

    /// Send a request and wait for its response.
    async fn request(&self, id: u64, frame: ClientFrame) -> BridgeResult<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            if !pending.open {
                return Err(BridgeError::Gateway("Not connected".to_string()));
            }
            pending.waiters.insert(id, tx);
        }

        if let Err(e) = self.send_frame(&frame).await {
            self.shared.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.shared.options.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(BridgeError::Gateway(
                    "Connection closed while waiting for response".to_string(),
                ));
            }
            Err(_) => {
                self.shared.pending.lock().await.waiters.remove(&id);
                return Err(BridgeError::Timeout(format!("request {}", id)));
            }
        };

        if response.ok {
            Ok(response.result)
        } else {
            Err(BridgeError::Gateway(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// Start the task that hands queued events to the handler.
    fn spawn_dispatch(&self) -> (mpsc::UnboundedSender<InboundEvent>, JoinHandle<()>) {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<InboundEvent>();
        let shared = self.shared.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let Some(handler) = wait_for_handler(&shared).await else {
                    debug!("Closed before a handler was registered, dropping queued events");
                    break;
                };
                handler.handle_event(event).await;
            }
        });

        (event_tx, task)
    }

    /// Open the WebSocket and start the link tasks.
    async fn open_link(&self, events: mpsc::UnboundedSender<InboundEvent>) -> BridgeResult<()> {
        info!("Connecting to gateway at {}...", self.shared.url);
        let (ws_stream, _) = connect_async(self.shared.url.as_str()).await?;
        let (mut write, read) = ws_stream.split();

        let (msg_tx, mut msg_rx) = mpsc::channel::<WsMessage>(OUTGOING_CAPACITY);

        let write_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = write.send(msg).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let ping_tx = msg_tx.clone();
        let ping_interval = self.shared.options.ping_interval;
        let ping_task = tokio::spawn(async move {
            let mut interval = interval(ping_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                if ping_tx.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        self.shared.pending.lock().await.open = true;

        let shared = self.shared.clone();
        let pong_tx = msg_tx.clone();
        let read_task = tokio::spawn(async move {
            read_loop(shared, read, pong_tx, events).await;
        });

        *self.shared.outgoing.write().await = Some(msg_tx);
        self.shared
            .link_tasks
            .lock()
            .await
            .extend([write_task, ping_task, read_task]);

        Ok(())
    }

    /// Announce the session to the gateway on a freshly opened link.
    async fn handshake(&self) -> BridgeResult<()> {
        let id = self.next_id();
        let device_id = self.shared.store.device_id().await;
        self.request(id, ClientFrame::Connect { id, device_id })
            .await
            .map(|_| ())
    }

    /// Open a link and complete the handshake, tearing the link down on failure.
    async fn establish(&self, events: mpsc::UnboundedSender<InboundEvent>) -> BridgeResult<()> {
        self.open_link(events).await?;
        if let Err(e) = self.handshake().await {
            self.teardown_link().await;
            return Err(e);
        }
        Ok(())
    }

    /// Stop the link tasks and drop the outgoing queue.
    async fn teardown_link(&self) {
        *self.shared.outgoing.write().await = None;
        for task in self.shared.link_tasks.lock().await.drain(..) {
            task.abort();
        }
        self.shared.pending.lock().await.close();
        self.shared.pairing_tx.lock().await.take();
    }

    /// Wait for the dispatcher to finish the events already queued.
    async fn drain(&self, mut dispatch: JoinHandle<()>) {
        let timeout = self.shared.options.drain_timeout;
        match tokio::time::timeout(timeout, &mut dispatch).await {
            Ok(Ok(())) => debug!("Inbound event queue drained"),
            Ok(Err(e)) => error!("Event dispatcher failed: {}", e),
            // Left running; it finishes or dies with the process.
            Err(_) => warn!("Event handler still busy after {:?}", timeout),
        }
    }
}

/// Current handler, waiting for one to be registered unless the client is
/// closing.
async fn wait_for_handler(shared: &Shared) -> Option<Arc<dyn InboundEventHandler>> {
    loop {
        if let Some(handler) = shared.handler.read().await.clone() {
            return Some(handler);
        }
        if shared.closing.load(Ordering::SeqCst) {
            return None;
        }
        debug!("Holding event until a handler is registered");
        shared.handler_ready.notified().await;
    }
}

/// Re-establish the link whenever the gateway drops it, until the client closes.
async fn supervise(client: GatewayClient, events: mpsc::UnboundedSender<InboundEvent>) {
    let shared = client.shared.clone();

    loop {
        shared.link_lost.notified().await;
        if shared.closing.load(Ordering::SeqCst) {
            return;
        }
        if client.is_connected().await {
            // Left over from a link that has since been replaced.
            continue;
        }
        if shared.store.device_id().await.is_none() {
            warn!("Gateway link lost before a device was paired, not reconnecting");
            return;
        }

        warn!("Gateway link lost, reconnecting...");
        client.teardown_link().await;

        let mut delay = shared.options.reconnect_delay;
        loop {
            tokio::time::sleep(delay).await;
            if shared.closing.load(Ordering::SeqCst) {
                return;
            }
            match client.establish(events.clone()).await {
                Ok(()) => {
                    info!("Reconnected to gateway");
                    break;
                }
                Err(e) => {
                    delay = (delay * 2).min(shared.options.max_reconnect_delay);
                    warn!("Reconnect failed: {}, retrying in {:?}", e, delay);
                }
            }
        }
    }
}

/// Route frames from the gateway until the link ends.
async fn read_loop<S>(
    shared: Arc<Shared>,
    mut read: S,
    msg_tx: mpsc::Sender<WsMessage>,
    event_tx: mpsc::UnboundedSender<InboundEvent>,
) where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                handle_frame(&shared, &text, &event_tx).await;
            }
            Ok(WsMessage::Ping(data)) => {
                let _ = msg_tx.send(WsMessage::Pong(data)).await;
            }
            Ok(WsMessage::Close(_)) => {
                info!("Gateway closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Gateway connection error: {}", e);
                break;
            }
        }
    }

    shared.outgoing.write().await.take();
    shared.pending.lock().await.close();
    shared.pairing_tx.lock().await.take();
    shared.link_lost.notify_one();
}

async fn handle_frame(
    shared: &Shared,
    text: &str,
    event_tx: &mpsc::UnboundedSender<InboundEvent>,
) {
    let frame: GatewayFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to parse gateway frame: {}", e);
            return;
        }
    };

    match frame {
        GatewayFrame::Response(response) => {
            let waiter = shared.pending.lock().await.waiters.remove(&response.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => debug!("Response for unknown request {}", response.id),
            }
        }
        GatewayFrame::Event { event } => {
            let _ = event_tx.send(event);
        }
        GatewayFrame::Qr { event, code } => {
            let event = PairingEvent::from_wire(&event, code);
            let finished = matches!(event, PairingEvent::Success | PairingEvent::Timeout);

            // Taking the sender on the final event closes the stream.
            let tx = {
                let mut guard = shared.pairing_tx.lock().await;
                if finished {
                    guard.take()
                } else {
                    guard.clone()
                }
            };
            match tx {
                Some(tx) => {
                    let _ = tx.send(event).await;
                }
                None => debug!("Pairing event with no listener: {:?}", event),
            }
        }
        GatewayFrame::Paired { device_id } => {
            if let Err(e) = shared.store.set_device_id(device_id).await {
                error!("Failed to persist device identity: {}", e);
            }
        }
        GatewayFrame::Unknown => {
            debug!("Ignoring gateway frame: {}", text);
        }
    }
}

#[async_trait]
impl InboundClient for GatewayClient {
    async fn has_stored_identity(&self) -> bool {
        self.shared.store.device_id().await.is_some()
    }

    async fn set_event_handler(&self, handler: Arc<dyn InboundEventHandler>) {
        *self.shared.handler.write().await = Some(handler);
        self.shared.handler_ready.notify_one();
    }

    async fn pairing_events(&self) -> BridgeResult<mpsc::Receiver<PairingEvent>> {
        let (tx, rx) = mpsc::channel(PAIRING_CAPACITY);
        *self.shared.pairing_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn connect(&self) -> BridgeResult<()> {
        let mut session = self.shared.session.lock().await;
        if session.is_some() {
            return Err(BridgeError::Connect("Already connected".to_string()));
        }
        self.shared.closing.store(false, Ordering::SeqCst);

        let (events, dispatch) = self.spawn_dispatch();
        if let Err(e) = self.establish(events.clone()).await {
            dispatch.abort();
            return Err(BridgeError::Connect(e.to_string()));
        }
        info!("Gateway session established");

        let supervisor = tokio::spawn(supervise(self.clone(), events.clone()));
        *session = Some(SessionTasks {
            events,
            dispatch,
            supervisor,
        });
        Ok(())
    }

    /// Close the session. Events already received are still handed to the
    /// handler, bounded by [`GatewayOptions::drain_timeout`].
    async fn disconnect(&self) -> BridgeResult<()> {
        let Some(session) = self.shared.session.lock().await.take() else {
            return Err(BridgeError::Gateway("Not connected".to_string()));
        };
        self.shared.closing.store(true, Ordering::SeqCst);
        session.supervisor.abort();

        let result = if self.is_connected().await {
            let result = self.send_frame(&ClientFrame::Disconnect).await;
            if let Some(tx) = self.shared.outgoing.read().await.clone() {
                let _ = tx.send(WsMessage::Close(None)).await;
            }
            // Give the writer a moment to flush the close frame.
            tokio::time::sleep(Duration::from_millis(50)).await;
            result
        } else {
            Err(BridgeError::Gateway("Link to gateway already lost".to_string()))
        };

        self.teardown_link().await;

        // Once every sender is gone the dispatcher exits after the last event.
        drop(session.events);
        self.shared.handler_ready.notify_one();
        self.drain(session.dispatch).await;

        // The handler typically holds a directory handle back to us.
        self.shared.handler.write().await.take();
        result
    }
}

#[async_trait]
impl Directory for GatewayClient {
    async fn contact(&self, jid: &Jid) -> BridgeResult<ContactInfo> {
        let id = self.next_id();
        let result = self
            .request(
                id,
                ClientFrame::GetContact {
                    id,
                    jid: jid.to_string(),
                },
            )
            .await
            .map_err(|e| BridgeError::Lookup(e.to_string()))?;
        Ok(serde_json::from_value(result)?)
    }

    async fn group_info(&self, jid: &Jid) -> BridgeResult<GroupInfo> {
        let id = self.next_id();
        let result = self
            .request(
                id,
                ClientFrame::GetGroupInfo {
                    id,
                    jid: jid.to_string(),
                },
            )
            .await
            .map_err(|e| BridgeError::Lookup(e.to_string()))?;
        Ok(serde_json::from_value(result)?)
    }
}
