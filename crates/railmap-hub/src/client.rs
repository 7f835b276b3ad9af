//! Background connection to the simulation hub.
//!
//! [`HubClient::start`] spawns a task that owns the WebSocket. Callers talk
//! to it through a clonable [`HubHandle`] (invocations) and receive pushes
//! and status changes on an mpsc channel of [`ChannelEvent`]s.
//!
//! ```text
//!  HubHandle::invoke ──cmd──▶ ┌───────────────────────────┐
//!                             │ negotiate → ws → handshake │
//!  ChannelEvent rx  ◀──evt─── │ read/write select loop     │
//!                             │ retry per RetryPolicy      │
//!                             └───────────────────────────┘
//! ```

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use railmap_core::{ChannelEvent, ConnectionStatus};

use crate::error::HubError;
use crate::protocol::{
    encode_invocation, encode_ping, handshake_request, parse_handshake_response, split_records,
    HubMessage, InvocationTracker,
};
use crate::retry::RetryPolicy;
use crate::wire::decode_push;

const CMD_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;
const MIN_TICK_PERIOD: Duration = Duration::from_millis(100);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hub endpoint, e.g. `https://api.smo.data-unknown.com/signalr`.
    pub url: String,
    pub retry: RetryPolicy,
    /// Interval between client pings.
    pub keep_alive: Duration,
    /// Silence after which the connection counts as lost.
    pub server_timeout: Duration,
    /// Invocations without a completion after this long are failed.
    pub invocation_timeout: Duration,
    /// Connect the WebSocket directly without the negotiate round trip.
    pub skip_negotiation: bool,
}

impl HubConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry: RetryPolicy::default(),
            keep_alive: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            invocation_timeout: Duration::from_secs(30),
            skip_negotiation: false,
        }
    }

    /// Period of the I/O loop's housekeeping tick. Never zero, since
    /// `tokio::time::interval` panics on a zero period.
    fn tick_period(&self) -> Duration {
        Duration::from_secs(1)
            .min(self.keep_alive)
            .max(MIN_TICK_PERIOD)
    }
}

enum ClientCommand {
    Invoke {
        target: String,
        arguments: Vec<Value>,
        response_tx: oneshot::Sender<Result<Value, HubError>>,
    },
    Stop,
}

/// Clonable handle for hub invocations.
///
/// Every handle routes through the same background task. Once the task has
/// exited, calls return [`HubError::Closed`].
#[derive(Clone)]
pub struct HubHandle {
    cmd_tx: mpsc::Sender<ClientCommand>,
    status: Arc<RwLock<ConnectionStatus>>,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("status", &self.status())
            .finish()
    }
}

impl HubHandle {
    /// Call a hub method and wait for its completion.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, HubError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(ClientCommand::Invoke {
                target: target.to_string(),
                arguments,
                response_tx,
            })
            .await
            .map_err(|_| HubError::Closed)?;
        response_rx.await.map_err(|_| HubError::Closed)?
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Close the connection and stop retrying.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Stop).await;
    }
}

pub struct HubClient {
    handle: HubHandle,
    event_rx: mpsc::Receiver<ChannelEvent>,
}

impl HubClient {
    /// Spawn the connection task. Must be called inside a Tokio runtime.
    ///
    /// The first connection attempt happens in the background; its outcome
    /// arrives as a [`ChannelEvent::StatusChanged`].
    pub fn start(config: HubConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let status = Arc::new(RwLock::new(ConnectionStatus::Connecting));

        info!("Starting hub client for {}", config.url);
        tokio::spawn(run_client_task(
            config,
            cmd_rx,
            event_tx,
            Arc::clone(&status),
        ));

        Self {
            handle: HubHandle { cmd_tx, status },
            event_rx,
        }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    pub fn into_parts(self) -> (HubHandle, mpsc::Receiver<ChannelEvent>) {
        (self.handle, self.event_rx)
    }
}

/// Why one connection's I/O loop ended.
#[derive(Debug, PartialEq)]
enum LoopExit {
    Reconnect(String),
    Stop(Option<String>),
}

struct StatusReporter {
    status: Arc<RwLock<ConnectionStatus>>,
    event_tx: mpsc::Sender<ChannelEvent>,
}

impl StatusReporter {
    async fn report(&self, next: ConnectionStatus) {
        {
            let mut guard = self.status.write().unwrap_or_else(|e| e.into_inner());
            if *guard == next {
                return;
            }
            *guard = next.clone();
        }
        let _ = self.event_tx.send(ChannelEvent::StatusChanged(next)).await;
    }
}

async fn run_client_task(
    config: HubConfig,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    event_tx: mpsc::Sender<ChannelEvent>,
    status: Arc<RwLock<ConnectionStatus>>,
) {
    let reporter = StatusReporter {
        status,
        event_tx: event_tx.clone(),
    };
    let http = reqwest::Client::new();
    let mut tracker = InvocationTracker::new();
    let mut attempt: u32 = 1;
    let mut ever_connected = false;

    loop {
        if ever_connected || attempt > 1 {
            reporter
                .report(ConnectionStatus::Reconnecting { attempt })
                .await;
        }

        let delay = config.retry.delay_for(attempt);
        if !delay.is_zero() {
            debug!("Hub: retrying in {:?} (attempt {})", delay, attempt);
        }
        if wait_or_stop(delay, &mut cmd_rx).await {
            reporter
                .report(ConnectionStatus::Disconnected { reason: None })
                .await;
            break;
        }

        let (ws_stream, buffered) = match connect(&config, &http).await {
            Ok(connected) => connected,
            Err(err) => {
                warn!("Hub: connection attempt {} failed: {}", attempt, err);
                attempt += 1;
                continue;
            }
        };

        info!("Hub: connected");
        ever_connected = true;
        attempt = 1;
        reporter.report(ConnectionStatus::Connected).await;

        let exit = run_io_loop(
            ws_stream,
            buffered,
            &config,
            &mut cmd_rx,
            &event_tx,
            &mut tracker,
        )
        .await;

        let failed = tracker.fail_all();
        if failed > 0 {
            debug!("Hub: failed {} pending invocation(s)", failed);
        }

        match exit {
            LoopExit::Reconnect(reason) => {
                warn!("Hub: connection lost: {}", reason);
            }
            LoopExit::Stop(reason) => {
                info!("Hub: stopped");
                reporter
                    .report(ConnectionStatus::Disconnected { reason })
                    .await;
                break;
            }
        }
    }

    debug!("Hub client task exiting");
}

/// Sleep for `delay` while failing invocations that arrive in the meantime.
/// Returns true when the client should stop.
async fn wait_or_stop(delay: Duration, cmd_rx: &mut mpsc::Receiver<ClientCommand>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            cmd = cmd_rx.recv() => match cmd {
                Some(ClientCommand::Invoke { response_tx, .. }) => {
                    let _ = response_tx.send(Err(HubError::ConnectionLost));
                }
                Some(ClientCommand::Stop) | None => return true,
            },
        }
    }
}

/// Negotiate, open the socket and complete the handshake. Returns the
/// records that arrived in the same frame as the handshake response.
async fn connect(
    config: &HubConfig,
    http: &reqwest::Client,
) -> Result<(WsStream, Vec<String>), HubError> {
    let base = Url::parse(&config.url).map_err(|e| HubError::InvalidUrl(e.to_string()))?;

    let token = if config.skip_negotiation {
        None
    } else {
        Some(negotiate(http, &base).await?)
    };
    let ws_url = websocket_url(&base, token.as_deref())?;

    debug!("Hub: opening {}", ws_url);
    let (mut ws_stream, _response) = connect_async(ws_url.as_str())
        .await
        .map_err(|e| HubError::WebSocket(e.to_string()))?;

    ws_stream
        .send(WsMessage::Text(handshake_request().into()))
        .await
        .map_err(|e| HubError::WebSocket(e.to_string()))?;

    let frame = tokio::time::timeout(config.server_timeout, next_text(&mut ws_stream))
        .await
        .map_err(|_| HubError::Handshake("no response".into()))??;

    let mut records = split_records(&frame);
    let first = records
        .next()
        .ok_or_else(|| HubError::Handshake("empty response".into()))?;
    parse_handshake_response(first)?;
    let buffered = records.map(str::to_string).collect();

    Ok((ws_stream, buffered))
}

async fn next_text(ws_stream: &mut WsStream) -> Result<String, HubError> {
    while let Some(frame) = ws_stream.next().await {
        match frame.map_err(|e| HubError::WebSocket(e.to_string()))? {
            WsMessage::Text(text) => return Ok(text.as_str().to_string()),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Err(HubError::Handshake("connection closed during handshake".into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    connection_token: Option<String>,
    connection_id: Option<String>,
    error: Option<String>,
}

fn parse_negotiate_response(body: &str) -> Result<String, HubError> {
    let response: NegotiateResponse =
        serde_json::from_str(body).map_err(|e| HubError::Negotiate(e.to_string()))?;
    if let Some(error) = response.error {
        return Err(HubError::Negotiate(error));
    }
    // Protocol version 0 servers only return a connection id.
    response
        .connection_token
        .or(response.connection_id)
        .ok_or_else(|| HubError::Negotiate("response carried no connection token".into()))
}

async fn negotiate(http: &reqwest::Client, base: &Url) -> Result<String, HubError> {
    let url = negotiate_url(base)?;
    debug!("Hub: negotiating at {}", url);
    let body = http
        .post(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| HubError::Negotiate(e.to_string()))?
        .text()
        .await
        .map_err(|e| HubError::Negotiate(e.to_string()))?;
    parse_negotiate_response(&body)
}

fn negotiate_url(base: &Url) -> Result<Url, HubError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| HubError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .push("negotiate");
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    Ok(url)
}

fn websocket_url(base: &Url, token: Option<&str>) -> Result<Url, HubError> {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(HubError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| HubError::InvalidUrl(base.to_string()))?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("id", token);
    }
    Ok(url)
}

async fn run_io_loop(
    ws_stream: WsStream,
    buffered: Vec<String>,
    config: &HubConfig,
    cmd_rx: &mut mpsc::Receiver<ClientCommand>,
    event_tx: &mpsc::Sender<ChannelEvent>,
    tracker: &mut InvocationTracker,
) -> LoopExit {
    let (mut ws_sink, mut ws_source): (WsSink, WsSource) = ws_stream.split();

    for record in &buffered {
        if let Some(exit) = handle_record(record, tracker, event_tx).await {
            return exit;
        }
    }

    let mut last_received = Instant::now();
    let mut last_sent = Instant::now();
    let mut tick = tokio::time::interval(config.tick_period());
    tick.tick().await;

    loop {
        tokio::select! {
            frame = ws_source.next() => {
                last_received = Instant::now();
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        for record in split_records(text.as_str()) {
                            if let Some(exit) = handle_record(record, tracker, event_tx).await {
                                if matches!(exit, LoopExit::Stop(_)) {
                                    send_close(&mut ws_sink).await;
                                }
                                return exit;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        return LoopExit::Reconnect("server closed the socket".into());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return LoopExit::Reconnect(err.to_string()),
                    None => return LoopExit::Reconnect("stream ended".into()),
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Invoke { target, arguments, response_tx }) => {
                        let id = tracker.register(&target, response_tx);
                        let record = match encode_invocation(&id, &target, &arguments) {
                            Ok(record) => record,
                            Err(err) => {
                                tracker.fail(&id, err);
                                continue;
                            }
                        };
                        if let Err(err) = ws_sink.send(WsMessage::Text(record.into())).await {
                            tracker.fail(&id, HubError::WebSocket(err.to_string()));
                            return LoopExit::Reconnect(err.to_string());
                        }
                        last_sent = Instant::now();
                    }
                    Some(ClientCommand::Stop) | None => {
                        send_close(&mut ws_sink).await;
                        return LoopExit::Stop(None);
                    }
                }
            }

            _ = tick.tick() => {
                if last_received.elapsed() > config.server_timeout {
                    return LoopExit::Reconnect(format!(
                        "no message from server for {:?}",
                        config.server_timeout
                    ));
                }
                if last_sent.elapsed() >= config.keep_alive {
                    if let Err(err) = ws_sink.send(WsMessage::Text(encode_ping().into())).await {
                        return LoopExit::Reconnect(err.to_string());
                    }
                    last_sent = Instant::now();
                }
                let expired = tracker.expire(config.invocation_timeout);
                if !expired.is_empty() {
                    warn!("Hub: invocation(s) timed out: {:?}", expired);
                }
            }
        }
    }
}

/// Route one inbound record. Returns an exit when the server closed the
/// connection.
async fn handle_record(
    record: &str,
    tracker: &mut InvocationTracker,
    event_tx: &mpsc::Sender<ChannelEvent>,
) -> Option<LoopExit> {
    let message = match HubMessage::parse(record) {
        Ok(message) => message,
        Err(err) => {
            warn!("Hub: dropping unreadable record: {}", err);
            return None;
        }
    };

    match message {
        HubMessage::Invocation { target, arguments } => match decode_push(&target, arguments) {
            Ok(Some(event)) => {
                debug!("Hub: {} received", event.kind());
                if event_tx.send(event).await.is_err() {
                    return Some(LoopExit::Stop(Some("event receiver dropped".into())));
                }
            }
            Ok(None) => debug!("Hub: ignoring push {}", target),
            Err(err) => warn!("Hub: dropping malformed {} push: {}", target, err),
        },
        HubMessage::Completion {
            invocation_id,
            result,
        } => {
            if !tracker.complete(&invocation_id, result) {
                debug!("Hub: completion for unknown invocation {}", invocation_id);
            }
        }
        HubMessage::Ping => {}
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            return Some(if allow_reconnect {
                LoopExit::Reconnect(error.unwrap_or_else(|| "server closed".into()))
            } else {
                LoopExit::Stop(error)
            });
        }
        HubMessage::Ignored(kind) => debug!("Hub: ignoring message type {}", kind),
    }
    None
}

async fn send_close(ws_sink: &mut WsSink) {
    let _ = ws_sink.send(WsMessage::Close(None)).await;
    let _ = ws_sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_handle() -> (HubHandle, mpsc::Receiver<ClientCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let handle = HubHandle {
            cmd_tx,
            status: Arc::new(RwLock::new(ConnectionStatus::Connecting)),
        };
        (handle, cmd_rx)
    }

    #[test]
    fn test_negotiate_url() {
        let base = Url::parse("https://api.example.com/signalr").unwrap();
        assert_eq!(
            negotiate_url(&base).unwrap().as_str(),
            "https://api.example.com/signalr/negotiate?negotiateVersion=1"
        );
    }

    #[test]
    fn test_negotiate_url_with_trailing_slash() {
        let base = Url::parse("https://api.example.com/signalr/").unwrap();
        assert_eq!(
            negotiate_url(&base).unwrap().as_str(),
            "https://api.example.com/signalr/negotiate?negotiateVersion=1"
        );
    }

    #[test]
    fn test_websocket_url_rewrites_scheme() {
        let base = Url::parse("https://api.example.com/signalr").unwrap();
        assert_eq!(
            websocket_url(&base, Some("tok en")).unwrap().as_str(),
            "wss://api.example.com/signalr?id=tok+en"
        );

        let base = Url::parse("http://localhost:5000/hub").unwrap();
        assert_eq!(
            websocket_url(&base, None).unwrap().as_str(),
            "ws://localhost:5000/hub"
        );
    }

    #[test]
    fn test_websocket_url_rejects_other_schemes() {
        let base = Url::parse("ftp://example.com/hub").unwrap();
        assert!(matches!(
            websocket_url(&base, None),
            Err(HubError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_negotiate_response() {
        let body = json!({
            "negotiateVersion": 1,
            "connectionId": "abc",
            "connectionToken": "xyz",
            "availableTransports": []
        })
        .to_string();
        assert_eq!(parse_negotiate_response(&body).unwrap(), "xyz");
    }

    #[test]
    fn test_parse_negotiate_response_version_zero() {
        let body = json!({"connectionId": "abc"}).to_string();
        assert_eq!(parse_negotiate_response(&body).unwrap(), "abc");
    }

    #[test]
    fn test_parse_negotiate_response_error() {
        let body = json!({"error": "Negotiate disabled"}).to_string();
        assert!(matches!(
            parse_negotiate_response(&body),
            Err(HubError::Negotiate(msg)) if msg == "Negotiate disabled"
        ));
    }

    #[test]
    fn test_tick_period_is_never_zero() {
        let mut config = HubConfig::new("http://localhost:1");
        assert_eq!(config.tick_period(), Duration::from_secs(1));

        config.keep_alive = Duration::from_millis(250);
        assert_eq!(config.tick_period(), Duration::from_millis(250));

        config.keep_alive = Duration::ZERO;
        assert_eq!(config.tick_period(), MIN_TICK_PERIOD);
    }

    #[tokio::test]
    async fn test_zero_keep_alive_interval_does_not_panic() {
        let mut config = HubConfig::new("http://localhost:1");
        config.keep_alive = Duration::ZERO;

        let mut tick = tokio::time::interval(config.tick_period());
        tick.tick().await;
    }

    #[tokio::test]
    async fn test_handle_returns_closed_after_task_exit() {
        let (handle, cmd_rx) = make_handle();
        drop(cmd_rx);

        let result = handle.invoke("GetServers", Vec::new()).await;

        assert!(matches!(result, Err(HubError::Closed)));
    }

    #[tokio::test]
    async fn test_invocations_fail_while_waiting_to_retry() {
        let (handle, mut cmd_rx) = make_handle();
        let caller_handle = handle.clone();
        let caller =
            tokio::spawn(async move { caller_handle.invoke("GetServers", Vec::new()).await });

        let stopped = wait_or_stop(Duration::from_millis(200), &mut cmd_rx).await;
        let result = caller.await.unwrap();
        drop(handle);

        assert!(!stopped);
        assert!(matches!(result, Err(HubError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_stop_interrupts_retry_wait() {
        let (handle, mut cmd_rx) = make_handle();
        handle.stop().await;

        assert!(wait_or_stop(Duration::from_secs(60), &mut cmd_rx).await);
    }

    #[tokio::test]
    async fn test_handle_record_routes_push_and_completion() {
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let mut tracker = InvocationTracker::new();
        let (response_tx, response_rx) = oneshot::channel();
        let id = tracker.register("GetTimetable", response_tx);

        let push = json!({
            "type": 1,
            "target": "TrainPositionsReceived",
            "arguments": [[]]
        })
        .to_string();
        let completion = json!({"type": 3, "invocationId": id, "result": null}).to_string();

        assert!(handle_record(&push, &mut tracker, &event_tx).await.is_none());
        assert!(handle_record(&completion, &mut tracker, &event_tx)
            .await
            .is_none());

        assert_eq!(
            event_rx.recv().await,
            Some(ChannelEvent::TrainPositionsReceived(Vec::new()))
        );
        assert_eq!(response_rx.await.unwrap().unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_handle_record_close_without_reconnect_stops() {
        let (event_tx, _event_rx) = mpsc::channel(4);
        let mut tracker = InvocationTracker::new();
        let close = json!({"type": 7, "error": "shutting down", "allowReconnect": false})
            .to_string();

        let exit = handle_record(&close, &mut tracker, &event_tx).await;

        assert_eq!(exit, Some(LoopExit::Stop(Some("shutting down".into()))));
    }

    #[tokio::test]
    async fn test_handle_record_close_with_reconnect() {
        let (event_tx, _event_rx) = mpsc::channel(4);
        let mut tracker = InvocationTracker::new();
        let close = json!({"type": 7, "allowReconnect": true}).to_string();

        let exit = handle_record(&close, &mut tracker, &event_tx).await;

        assert!(matches!(exit, Some(LoopExit::Reconnect(_))));
    }

    #[tokio::test]
    async fn test_status_reporter_skips_repeats() {
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let reporter = StatusReporter {
            status: Arc::new(RwLock::new(ConnectionStatus::Connecting)),
            event_tx,
        };

        reporter.report(ConnectionStatus::Connected).await;
        reporter.report(ConnectionStatus::Connected).await;
        drop(reporter);

        assert_eq!(
            event_rx.recv().await,
            Some(ChannelEvent::StatusChanged(ConnectionStatus::Connected))
        );
        assert_eq!(event_rx.recv().await, None);
    }
}
