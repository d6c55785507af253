//! Live measurement subscription manager
//!
//! Maintains a long-lived GraphQL-over-WebSocket subscription to the live
//! power measurement feed. Liveness is inferred with a debounce watchdog:
//! every inbound message re-arms a silence deadline, and a stream that stays
//! quiet past the deadline is torn down and reopened. Transport errors
//! reconnect after a randomized backoff so many homes never retry in sync;
//! a graceful server-side completion is only logged and left to the
//! watchdog. The protocol has no client-driven ping, so the watchdog is the
//! sole dead-stream detector.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use crate::clock;
use crate::config::LiveConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::tibber::client::ApiClient;
use crate::tibber::queries;
use crate::tibber::types::LiveMeasurement;

/// WebSocket subprotocol spoken by the subscription endpoint
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-transport-ws";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const SUBSCRIPTION_ID: &str = "1";

/// Stream of decoded live measurements; `None` means the server completed
/// the stream gracefully, an `Err` item is a transport or protocol error.
pub type LiveStream = BoxStream<'static, Result<LiveMeasurement>>;

/// Source of live measurement streams; the WebSocket transport in
/// production, a scripted feed in tests
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Obtain a fresh subscription endpoint. Called before every
    /// (re)connect; the endpoint is not assumed stable across sessions.
    async fn subscription_url(&self) -> Result<String>;

    /// Open a measurement stream against the given endpoint
    async fn connect(&self, url: &str) -> Result<LiveStream>;
}

/// Handle over the background subscription task
///
/// Created by [`LiveStreamManager::start`]; the stream keeps reconnecting on
/// its own until [`LiveStreamManager::destroy`] is called. After destroy no
/// handler invocation or timer fire can be observed.
pub struct LiveStreamManager {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    logger: StructuredLogger,
}

impl LiveStreamManager {
    /// Start streaming, forwarding every measurement synchronously to
    /// `handler`. Handler panics are not caught.
    pub fn start<F>(feed: Arc<dyn LiveFeed>, cfg: LiveConfig, handler: F) -> Self
    where
        F: FnMut(LiveMeasurement) + Send + 'static,
    {
        let logger = get_logger("live");
        let cancel = CancellationToken::new();

        // One-time jitter so homes sharing the base window drift apart
        let max_silence = Duration::from_secs(cfg.silence_window_secs)
            + clock::random_delay(0, cfg.silence_jitter_max_secs);
        logger.info(&format!(
            "Starting live stream (silence window {} seconds)",
            max_silence.as_secs()
        ));

        let task = tokio::spawn(run_stream(
            feed,
            cfg,
            max_silence,
            handler,
            cancel.clone(),
            logger.clone(),
        ));

        Self {
            cancel,
            task: Mutex::new(Some(task)),
            logger,
        }
    }

    /// Tear the subscription down. Reentrant-safe: repeated calls are no-ops.
    pub fn destroy(&self) {
        self.cancel.cancel();
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            self.logger.info("Live stream destroyed");
        }
    }

    /// Whether destroy has been called
    pub fn is_destroyed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for LiveStreamManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

enum StreamEnd {
    Destroyed,
    Silent,
    Completed,
    Errored,
}

async fn run_stream<F>(
    feed: Arc<dyn LiveFeed>,
    cfg: LiveConfig,
    max_silence: Duration,
    mut handler: F,
    cancel: CancellationToken,
    logger: StructuredLogger,
) where
    F: FnMut(LiveMeasurement) + Send + 'static,
{
    loop {
        if cancel.is_cancelled() {
            return;
        }

        // The subscription endpoint can change between sessions; re-fetch it
        // on every attempt
        let url = match feed.subscription_url().await {
            Ok(url) => url,
            Err(e) => {
                logger.warn(&format!("Could not resolve subscription endpoint: {}", e));
                if backoff(&cfg, &cancel, &logger).await {
                    continue;
                }
                return;
            }
        };

        let stream = match feed.connect(&url).await {
            Ok(stream) => stream,
            Err(e) => {
                logger.warn(&format!("Could not open live subscription: {}", e));
                if backoff(&cfg, &cancel, &logger).await {
                    continue;
                }
                return;
            }
        };
        logger.info("Subscribed to live measurements");

        match pump_messages(stream, max_silence, &mut handler, &cancel, &logger).await {
            StreamEnd::Destroyed => return,
            StreamEnd::Silent => {
                logger.info(&format!(
                    "No data received in {} seconds; resubscribing",
                    max_silence.as_secs()
                ));
            }
            StreamEnd::Completed => {
                // Intentional server-side close; the watchdog window decides
                // when to try again
                logger.info("Subscription ended with no error");
                if !sleep_unless_cancelled(max_silence, &cancel).await {
                    return;
                }
            }
            StreamEnd::Errored => {
                if !backoff(&cfg, &cancel, &logger).await {
                    return;
                }
            }
        }
    }
}

async fn pump_messages<F>(
    mut stream: LiveStream,
    max_silence: Duration,
    handler: &mut F,
    cancel: &CancellationToken,
    logger: &StructuredLogger,
) -> StreamEnd
where
    F: FnMut(LiveMeasurement) + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEnd::Destroyed,
            next = tokio::time::timeout(max_silence, stream.next()) => match next {
                Err(_) => return StreamEnd::Silent,
                Ok(None) => return StreamEnd::Completed,
                Ok(Some(Err(e))) => {
                    logger.warn(&format!("Subscription error occurred: {}", e));
                    return StreamEnd::Errored;
                }
                Ok(Some(Ok(measurement))) => handler(measurement),
            }
        }
    }
}

// Randomized wait before a reconnect attempt; false when destroyed meanwhile
async fn backoff(cfg: &LiveConfig, cancel: &CancellationToken, logger: &StructuredLogger) -> bool {
    let delay = clock::random_delay(cfg.backoff_min_secs, cfg.backoff_max_secs);
    logger.info(&format!("Resubscribe after {} seconds", delay.as_secs()));
    sleep_unless_cancelled(delay, cancel).await
}

async fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// WebSocket transport implementing the `graphql-transport-ws` handshake
pub struct WsLiveFeed {
    api: Arc<ApiClient>,
    user_agent: String,
}

impl WsLiveFeed {
    /// Create a transport bound to the API client's home
    pub fn new(api: Arc<ApiClient>, user_agent: impl Into<String>) -> Self {
        Self {
            api,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl LiveFeed for WsLiveFeed {
    async fn subscription_url(&self) -> Result<String> {
        let viewer = self.api.get_home_features().await?;

        if let Some(home) = viewer.home.as_ref()
            && !home.has_real_time_consumption()
        {
            return Err(HeliosError::subscription(
                "Home does not have real time consumption enabled",
            ));
        }

        viewer
            .websocket_subscription_url
            .ok_or_else(|| HeliosError::subscription("No subscription endpoint in response"))
    }

    async fn connect(&self, url: &str) -> Result<LiveStream> {
        let token = self.api.access_token()?;

        let mut request = url.into_client_request()?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(GRAPHQL_WS_PROTOCOL),
        );
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            request.headers_mut().insert("User-Agent", value);
        }

        let (mut ws, _response) = connect_async(request).await?;

        // graphql-transport-ws handshake: init with the token, wait for ack
        ws.send(Message::Text(connection_init_frame(&token)?)).await?;
        loop {
            let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, ws.next())
                .await
                .map_err(|_| HeliosError::timeout("Timed out waiting for connection ack"))?;
            match frame {
                None => {
                    return Err(HeliosError::subscription(
                        "Connection closed during handshake",
                    ));
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => match decode_frame(&text)? {
                    FrameAction::Ack => break,
                    FrameAction::Error(message) => {
                        return Err(HeliosError::subscription(message));
                    }
                    _ => {}
                },
                Some(Ok(Message::Close(_))) => {
                    return Err(HeliosError::subscription(
                        "Connection closed during handshake",
                    ));
                }
                Some(Ok(_)) => {}
            }
        }

        let query = queries::live_measurement_subscription(self.api.home_id());
        ws.send(Message::Text(subscribe_frame(SUBSCRIPTION_ID, &query)?))
            .await?;

        let stream = futures_util::stream::unfold(ws, |mut ws| async move {
            loop {
                match ws.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(e.into()), ws)),
                    Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                        Ok(FrameAction::Deliver(measurement)) => {
                            return Some((Ok(measurement), ws));
                        }
                        Ok(FrameAction::Error(message)) => {
                            return Some((Err(HeliosError::subscription(message)), ws));
                        }
                        Ok(FrameAction::Complete) => return None,
                        Ok(FrameAction::Ping) => {
                            let _ = ws.send(Message::Text(pong_frame())).await;
                        }
                        Ok(FrameAction::Ack) | Ok(FrameAction::Ignore) => {}
                        Err(e) => return Some((Err(e), ws)),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let normal = frame
                            .as_ref()
                            .map(|f| f.code == CloseCode::Normal)
                            .unwrap_or(true);
                        if normal {
                            return None;
                        }
                        return Some((
                            Err(HeliosError::subscription(format!(
                                "Connection closed: {:?}",
                                frame
                            ))),
                            ws,
                        ));
                    }
                    Some(Ok(_)) => {}
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[derive(Debug)]
enum FrameAction {
    Deliver(LiveMeasurement),
    Error(String),
    Complete,
    Ack,
    Ping,
    Ignore,
}

#[derive(Debug, Deserialize)]
struct WsFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

fn connection_init_frame(token: &str) -> Result<String> {
    Ok(serde_json::to_string(&json!({
        "type": "connection_init",
        "payload": { "token": token },
    }))?)
}

fn subscribe_frame(id: &str, query: &str) -> Result<String> {
    Ok(serde_json::to_string(&json!({
        "id": id,
        "type": "subscribe",
        "payload": { "query": query },
    }))?)
}

fn pong_frame() -> String {
    r#"{"type":"pong"}"#.to_string()
}

fn decode_frame(text: &str) -> Result<FrameAction> {
    let frame: WsFrame = serde_json::from_str(text)?;
    match frame.kind.as_str() {
        "next" => {
            let measurement = frame
                .payload
                .as_ref()
                .and_then(|p| p.get("data"))
                .and_then(|d| d.get("liveMeasurement"))
                .cloned();
            match measurement {
                Some(value) if !value.is_null() => {
                    Ok(FrameAction::Deliver(serde_json::from_value(value)?))
                }
                _ => Ok(FrameAction::Ignore),
            }
        }
        "error" => {
            let message = frame
                .payload
                .map(|p| p.to_string())
                .unwrap_or_else(|| "Subscription error".to_string());
            Ok(FrameAction::Error(message))
        }
        "complete" => Ok(FrameAction::Complete),
        "connection_ack" => Ok(FrameAction::Ack),
        "ping" => Ok(FrameAction::Ping),
        _ => Ok(FrameAction::Ignore),
    }
}
