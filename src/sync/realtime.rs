use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::models::{Notification, RealtimeChange};
use crate::sync::store::NotificationStore;

/// Rapid filter changes collapse into one resubscribe.
const RESUBSCRIBE_DEBOUNCE: Duration = Duration::from_millis(250);

/// Connection state surfaced to the UI collaborator. `Failed` is
/// recoverable: a later `subscribe()` restarts the channel, and the page
/// cache is never touched by channel failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub ws_url: String,
    pub api_key: String,
    pub heartbeat: Duration,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_ms: u64,
    /// Consecutive failed connects before the channel reports `Failed`.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 30_000,
            jitter_ms: 250,
            max_retries: 10,
        }
    }
}

/// Owns exactly one active subscription to the change stream, scoped to
/// the store's user. Events are normalized and fed to the store's
/// ingest endpoints; the merge rule there is the ordering authority, so
/// this component never reasons about arrival order.
pub struct RealtimeReconciler {
    store: Arc<NotificationStore>,
    config: RealtimeConfig,
    channel: Arc<Mutex<Option<JoinHandle<()>>>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    status_tx: watch::Sender<ChannelStatus>,
    status_rx: watch::Receiver<ChannelStatus>,
}

impl RealtimeReconciler {
    pub fn new(store: Arc<NotificationStore>, config: RealtimeConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Idle);
        Self {
            store,
            config,
            channel: Arc::new(Mutex::new(None)),
            debounce: Mutex::new(None),
            status_tx,
            status_rx,
        }
    }

    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Opens the subscription. Any previous channel is torn down first,
    /// before the new one is spawned; a dangling old subscription is the
    /// single largest source of duplicate-event bugs.
    pub fn subscribe(&self) {
        let mut slot = self.channel.lock().unwrap();
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(spawn_channel(
            self.store.clone(),
            self.config.clone(),
            self.status_tx.clone(),
        ));
    }

    /// Debounced resubscribe for filter changes: each call restarts the
    /// timer, and only the last change within the window reopens the
    /// channel. Teardown of the old channel stays ordered before the new
    /// join because both happen under the channel slot lock.
    pub fn resubscribe_on_filter_change(&self) {
        let mut pending = self.debounce.lock().unwrap();
        if let Some(old) = pending.take() {
            old.abort();
        }

        let store = self.store.clone();
        let config = self.config.clone();
        let status_tx = self.status_tx.clone();
        let channel = self.channel.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(RESUBSCRIBE_DEBOUNCE).await;
            let mut slot = channel.lock().unwrap();
            if let Some(old) = slot.take() {
                old.abort();
            }
            *slot = Some(spawn_channel(store, config, status_tx));
        }));
    }

    /// Tears everything down: the channel and any pending resubscribe
    /// timer. Unmounting without this leaks the subscription.
    pub fn unsubscribe(&self) {
        if let Some(pending) = self.debounce.lock().unwrap().take() {
            pending.abort();
        }
        if let Some(channel) = self.channel.lock().unwrap().take() {
            channel.abort();
        }
        self.status_tx.send_replace(ChannelStatus::Idle);
    }
}

impl Drop for RealtimeReconciler {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn spawn_channel(
    store: Arc<NotificationStore>,
    config: RealtimeConfig,
    status_tx: watch::Sender<ChannelStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        // The stream is not assumed gap-free: after any drop, the next
        // successful join heals with a reset load.
        let mut heal = false;

        loop {
            status_tx.send_replace(if attempt == 0 {
                ChannelStatus::Connecting
            } else {
                ChannelStatus::Reconnecting
            });

            if let Err(e) = run_channel(&store, &config, &status_tx, heal).await {
                warn!(error = %e, attempt, "realtime channel dropped");
            }
            heal = true;

            attempt += 1;
            if attempt > config.backoff.max_retries {
                warn!("realtime channel giving up after {} attempts", attempt);
                status_tx.send_replace(ChannelStatus::Failed);
                return;
            }
            tokio::time::sleep(backoff_delay(&config.backoff, attempt)).await;
        }
    })
}

/// One connection lifetime: connect, join the user-scoped topic, pump
/// heartbeats and events until the transport drops.
async fn run_channel(
    store: &NotificationStore,
    config: &RealtimeConfig,
    status_tx: &watch::Sender<ChannelStatus>,
    heal: bool,
) -> Result<(), EngineError> {
    let url = format!("{}?apikey={}&vsn=1.0.0", config.ws_url, config.api_key);
    let (ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| EngineError::Realtime(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    let topic = channel_topic(store.user_id());
    let join = json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {},
        "ref": "1",
    });
    sink.send(Message::Text(join.to_string()))
        .await
        .map_err(|e| EngineError::Realtime(e.to_string()))?;

    info!(%topic, "realtime channel joined");
    status_tx.send_replace(ChannelStatus::Connected);

    if heal {
        // Events missed while disconnected are unrecoverable from the
        // stream itself; a reset load re-anchors the cache.
        if let Err(e) = store.load_page(true).await {
            warn!(error = %e, "post-reconnect heal load failed");
        }
    }

    let mut heartbeat = tokio::time::interval(config.heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut heartbeat_ref: u64 = 1;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                heartbeat_ref += 1;
                let frame = json!({
                    "topic": "phoenix",
                    "event": "heartbeat",
                    "payload": {},
                    "ref": heartbeat_ref.to_string(),
                });
                sink.send(Message::Text(frame.to_string()))
                    .await
                    .map_err(|e| EngineError::Realtime(e.to_string()))?;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_frame(store, &text),
                Some(Ok(Message::Ping(payload))) => {
                    sink.send(Message::Pong(payload))
                        .await
                        .map_err(|e| EngineError::Realtime(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(EngineError::Realtime(format!(
                        "server closed the channel: {:?}",
                        frame
                    )));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(EngineError::Realtime(e.to_string())),
                None => return Err(EngineError::Realtime("stream ended".into())),
            }
        }
    }
}

fn handle_frame(store: &NotificationStore, text: &str) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "ignoring malformed realtime frame");
            return;
        }
    };

    let event = frame["event"].as_str().unwrap_or_default();
    match parse_change(event, &frame["payload"]) {
        Some(RealtimeChange::Insert(n)) => store.ingest_realtime_insert(n),
        Some(RealtimeChange::Update(n)) => store.ingest_realtime_update(n),
        Some(RealtimeChange::Delete { id }) => store.ingest_realtime_delete(id),
        None => debug!(event, "ignoring non-change frame"),
    }
}

/// Normalizes a wire event into a store ingest. `INSERT`/`UPDATE` carry
/// the affected row under `record`; `DELETE` carries the key under
/// `old_record`.
fn parse_change(event: &str, payload: &Value) -> Option<RealtimeChange> {
    match event {
        "INSERT" => {
            let row: Notification = serde_json::from_value(payload["record"].clone()).ok()?;
            Some(RealtimeChange::Insert(row))
        }
        "UPDATE" => {
            let row: Notification = serde_json::from_value(payload["record"].clone()).ok()?;
            Some(RealtimeChange::Update(row))
        }
        "DELETE" => {
            let id = payload["old_record"]["id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())?;
            Some(RealtimeChange::Delete { id })
        }
        _ => None,
    }
}

fn channel_topic(user_id: Uuid) -> String {
    format!("realtime:public:notifications:user_id=eq.{}", user_id)
}

/// Exponential backoff, capped, with random jitter so a fleet of
/// clients does not reconnect in lockstep.
fn backoff_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let base = config.base_ms as f64;
    let raw = base * 2_f64.powi(attempt.saturating_sub(1) as i32);
    let capped = raw.min(config.max_ms as f64);

    let jitter = if config.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    } else {
        0
    };

    Duration::from_millis(capped as u64 + jitter)
}
