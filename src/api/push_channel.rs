//! Live push connection to the chat hub.
//!
//! One background task owns the WebSocket for the whole session. It
//! reconnects on a capped backoff schedule, re-announces the agent on every
//! connect and forwards validated push events into the engine queue.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    runtime::Handle,
    sync::{mpsc, watch},
    time::{interval_at, sleep, sleep_until, timeout, Instant},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};

use crate::{
    api::{
        hub_protocol::{self, HubFrame, HubProtocolError},
        wire,
    },
    domain::{
        events::{EngineEvent, EventSink, SyncFault},
        status::ConnectionStatus,
    },
    infra::{config::AppConfig, secrets::redact_text, secrets::redact_url},
    usecases::contracts::PushSession,
};

const PUSH_CONNECTED: &str = "PUSH_CONNECTED";
const PUSH_CONNECT_FAILED: &str = "PUSH_CONNECT_FAILED";
const PUSH_RECONNECT_SCHEDULED: &str = "PUSH_RECONNECT_SCHEDULED";
const PUSH_PAYLOAD_INVALID: &str = "PUSH_PAYLOAD_INVALID";
const PUSH_TARGET_IGNORED: &str = "PUSH_TARGET_IGNORED";
const PUSH_PRESENCE_DROPPED: &str = "PUSH_PRESENCE_DROPPED";
const PUSH_STOPPED: &str = "PUSH_STOPPED";

const CONNECT_TO_SERVICE: &str = "ConnectToService";
const AGENT_JOINED_CHAT: &str = "AgentJoinedChat";
const AGENT_LEFT_CHAT: &str = "AgentLeftChat";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub hub_url: String,
    pub access_token: String,
    pub agent_id: String,
    pub channel: String,
    pub retry_delays: Vec<Duration>,
    pub keep_alive: Duration,
    pub server_timeout: Duration,
}

impl PushSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            hub_url: config.server.hub_url.clone(),
            access_token: config.agent.access_token.clone(),
            agent_id: config.agent.agent_id.clone(),
            channel: config.agent.channel.clone(),
            retry_delays: config
                .push
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            keep_alive: Duration::from_millis(config.push.keep_alive_ms),
            server_timeout: Duration::from_millis(config.push.server_timeout_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid hub url: {0}")]
    InvalidUrl(String),
    #[error("hub did not answer in time")]
    Timeout,
    #[error("websocket failure: {0}")]
    Socket(#[from] tungstenite::Error),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HubProtocolError),
    #[error("hub closed the socket during the handshake")]
    Closed,
}

/// Delay before reconnect attempt `attempt` (1-based). Attempts past the end
/// of the schedule reuse its last entry.
pub fn retry_delay(delays: &[Duration], attempt: u32) -> Duration {
    let index = (attempt.max(1) - 1) as usize;
    delays
        .get(index)
        .or_else(|| delays.last())
        .copied()
        .unwrap_or(Duration::ZERO)
}

/// Hub URL with the access token appended as `access_token`.
pub fn hub_endpoint(hub_url: &str, access_token: &str) -> Result<reqwest::Url, PushError> {
    let mut url =
        reqwest::Url::parse(hub_url).map_err(|error| PushError::InvalidUrl(error.to_string()))?;
    if !access_token.is_empty() {
        url.query_pairs_mut().append_pair("access_token", access_token);
    }
    Ok(url)
}

#[derive(Debug)]
enum PushCommand {
    Invoke {
        target: &'static str,
        arguments: Vec<Value>,
    },
}

/// Owner of the push task. Closing or dropping it stops the connection.
pub struct PushHandle {
    commands: mpsc::UnboundedSender<PushCommand>,
    stop: watch::Sender<bool>,
}

impl PushHandle {
    pub fn spawn(settings: PushSettings, runtime: &Handle, sink: Arc<dyn EventSink>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        runtime.spawn(run_channel(settings, sink, command_rx, stop_rx));
        Self { commands, stop }
    }

    fn invoke(&self, target: &'static str, arguments: Vec<Value>) {
        if self
            .commands
            .send(PushCommand::Invoke { target, arguments })
            .is_err()
        {
            tracing::warn!(
                code = PUSH_PRESENCE_DROPPED,
                method = target,
                "push task is gone; presence call dropped"
            );
        }
    }
}

impl PushSession for PushHandle {
    fn join_chat(&self, chat_id: &str, agent_id: &str) {
        self.invoke(AGENT_JOINED_CHAT, vec![json!(chat_id), json!(agent_id)]);
    }

    fn leave_chat(&self, agent_id: &str, chat_id: &str) {
        self.invoke(AGENT_LEFT_CHAT, vec![json!(agent_id), json!(chat_id)]);
    }

    fn close(&self) {
        let _ = self.stop.send(true);
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

enum SessionEnd {
    Stopped,
    Lost(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Dispatch {
    Continue { ping_requested: bool },
    Closed(String),
}

async fn run_channel(
    settings: PushSettings,
    sink: Arc<dyn EventSink>,
    mut commands: mpsc::UnboundedReceiver<PushCommand>,
    mut stop: watch::Receiver<bool>,
) {
    let redacted_url = redact_url(
        hub_endpoint(&settings.hub_url, &settings.access_token)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| settings.hub_url.clone())
            .as_str(),
    );
    sink.emit(EngineEvent::Connection(ConnectionStatus::Connecting));
    let mut failures: u32 = 0;

    loop {
        if failures > 0 {
            let delay = retry_delay(&settings.retry_delays, failures);
            sink.emit(EngineEvent::Connection(ConnectionStatus::Reconnecting {
                attempt: failures,
            }));
            tracing::info!(
                code = PUSH_RECONNECT_SCHEDULED,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "push reconnect scheduled"
            );
            if !wait_before_retry(delay, &mut commands, &mut stop).await {
                break;
            }
        }

        let opened = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            opened = open(&settings) => opened,
        };
        let (socket, leftover) = match opened {
            Ok(opened) => opened,
            Err(error) => {
                tracing::warn!(
                    code = PUSH_CONNECT_FAILED,
                    url = %redacted_url,
                    attempt = failures + 1,
                    error = %redact_text(&error.to_string()),
                    "push connect failed"
                );
                failures += 1;
                continue;
            }
        };

        discard_queued(&mut commands);
        failures = 0;
        sink.emit(EngineEvent::Connection(ConnectionStatus::Connected));
        tracing::info!(code = PUSH_CONNECTED, url = %redacted_url, "push channel connected");

        match run_session(socket, &leftover, &settings, sink.as_ref(), &mut commands, &mut stop)
            .await
        {
            SessionEnd::Stopped => break,
            SessionEnd::Lost(reason) => {
                tracing::warn!(
                    code = SyncFault::ConnectionLost.code(),
                    reason = %redact_text(&reason),
                    "push connection lost"
                );
                failures = 1;
            }
        }
    }

    tracing::info!(code = PUSH_STOPPED, "push channel stopped");
    sink.emit(EngineEvent::Connection(ConnectionStatus::Disconnected));
}

async fn open(settings: &PushSettings) -> Result<(WsStream, String), PushError> {
    let url = hub_endpoint(&settings.hub_url, &settings.access_token)?;
    let (mut socket, _) = timeout(settings.server_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| PushError::Timeout)??;

    socket
        .send(WsMessage::Text(hub_protocol::handshake_request().into()))
        .await?;

    match timeout(settings.server_timeout, socket.next())
        .await
        .map_err(|_| PushError::Timeout)?
    {
        Some(Ok(WsMessage::Text(text))) => {
            let rest = hub_protocol::parse_handshake_response(text.as_str())?.to_owned();
            Ok((socket, rest))
        }
        Some(Ok(WsMessage::Close(_))) | None => Err(PushError::Closed),
        Some(Ok(_)) => Err(PushError::Handshake(HubProtocolError::HandshakeIncomplete)),
        Some(Err(error)) => Err(PushError::Socket(error)),
    }
}

async fn run_session(
    socket: WsStream,
    leftover: &str,
    settings: &PushSettings,
    sink: &dyn EventSink,
    commands: &mut mpsc::UnboundedReceiver<PushCommand>,
    stop: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut writer, mut reader) = socket.split();

    let announce = hub_protocol::encode_invocation(
        CONNECT_TO_SERVICE,
        &[json!(settings.agent_id), json!(settings.channel)],
    );
    if let Err(error) = writer.send(WsMessage::Text(announce.into())).await {
        return SessionEnd::Lost(format!("presence announce failed: {error}"));
    }

    let mut ping_requested = match dispatch_records(leftover, sink) {
        Dispatch::Continue { ping_requested } => ping_requested,
        Dispatch::Closed(reason) => return SessionEnd::Lost(reason),
    };
    let mut keep_alive = interval_at(Instant::now() + settings.keep_alive, settings.keep_alive);
    let mut last_seen = Instant::now();

    loop {
        if std::mem::take(&mut ping_requested) {
            let ping = hub_protocol::encode_ping();
            if let Err(error) = writer.send(WsMessage::Text(ping.into())).await {
                return SessionEnd::Lost(format!("ping failed: {error}"));
            }
        }

        tokio::select! {
            _ = stopped(stop) => {
                // A teardown queues its leave call just before stopping.
                for (target, record) in queued_invocations(commands) {
                    if writer.send(WsMessage::Text(record.into())).await.is_err() {
                        tracing::warn!(code = PUSH_PRESENCE_DROPPED, method = target, "presence call failed");
                        break;
                    }
                    tracing::debug!(method = target, "hub method invoked before close");
                }
                let _ = writer.send(WsMessage::Close(None)).await;
                return SessionEnd::Stopped;
            }
            command = commands.recv() => match command {
                Some(PushCommand::Invoke { target, arguments }) => {
                    let record = hub_protocol::encode_invocation(target, &arguments);
                    if let Err(error) = writer.send(WsMessage::Text(record.into())).await {
                        tracing::warn!(code = PUSH_PRESENCE_DROPPED, method = target, "presence call failed");
                        return SessionEnd::Lost(format!("send failed: {error}"));
                    }
                    tracing::debug!(method = target, "hub method invoked");
                }
                None => return SessionEnd::Stopped,
            },
            _ = keep_alive.tick() => ping_requested = true,
            _ = sleep_until(last_seen + settings.server_timeout) => {
                return SessionEnd::Lost("no record within the server timeout".to_owned());
            }
            incoming = reader.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    last_seen = Instant::now();
                    match dispatch_records(text.as_str(), sink) {
                        Dispatch::Continue { ping_requested: requested } => ping_requested = requested,
                        Dispatch::Closed(reason) => return SessionEnd::Lost(reason),
                    }
                }
                Some(Ok(WsMessage::Close(_))) => {
                    return SessionEnd::Lost("server closed the socket".to_owned());
                }
                Some(Ok(_)) => last_seen = Instant::now(),
                Some(Err(error)) => return SessionEnd::Lost(error.to_string()),
                None => return SessionEnd::Lost("socket stream ended".to_owned()),
            },
        }
    }
}

/// Decodes every record in `text` and forwards push events to `sink`.
fn dispatch_records(text: &str, sink: &dyn EventSink) -> Dispatch {
    let mut ping_requested = false;

    for record in hub_protocol::split_records(text) {
        match hub_protocol::decode_frame(record) {
            Ok(HubFrame::Invocation { target, arguments }) => {
                match wire::decode_push(&target, arguments) {
                    Ok(Some(event)) => sink.emit(EngineEvent::Push(event)),
                    Ok(None) => {
                        tracing::debug!(code = PUSH_TARGET_IGNORED, method = %target, "unknown hub target")
                    }
                    Err(error) => tracing::warn!(
                        code = PUSH_PAYLOAD_INVALID,
                        method = %target,
                        error = %error,
                        "dropping invalid push payload"
                    ),
                }
            }
            Ok(HubFrame::Ping) => ping_requested = true,
            Ok(HubFrame::Completion {
                invocation_id,
                error,
            }) => tracing::debug!(?invocation_id, ?error, "hub completion"),
            Ok(HubFrame::Close {
                error,
                allow_reconnect,
            }) => {
                return Dispatch::Closed(format!(
                    "hub closed the connection (allow_reconnect={allow_reconnect}): {}",
                    error.unwrap_or_default()
                ));
            }
            Ok(HubFrame::Other(kind)) => tracing::debug!(kind, "ignoring hub record"),
            Err(error) => tracing::warn!(
                code = PUSH_PAYLOAD_INVALID,
                error = %error,
                "dropping malformed hub record"
            ),
        }
    }

    Dispatch::Continue { ping_requested }
}

/// Sleeps for `delay`, dropping presence calls meanwhile. Returns `false`
/// when the channel was stopped instead.
async fn wait_before_retry(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<PushCommand>,
    stop: &mut watch::Receiver<bool>,
) -> bool {
    let deadline = sleep(delay);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            _ = stopped(stop) => return false,
            command = commands.recv() => match command {
                Some(command) => log_dropped(&command),
                None => return false,
            },
        }
    }
}

/// Encodes every command still queued, in order.
fn queued_invocations(
    commands: &mut mpsc::UnboundedReceiver<PushCommand>,
) -> Vec<(&'static str, String)> {
    let mut records = Vec::new();
    while let Ok(PushCommand::Invoke { target, arguments }) = commands.try_recv() {
        records.push((target, hub_protocol::encode_invocation(target, &arguments)));
    }
    records
}

fn discard_queued(commands: &mut mpsc::UnboundedReceiver<PushCommand>) {
    while let Ok(command) = commands.try_recv() {
        log_dropped(&command);
    }
}

fn log_dropped(command: &PushCommand) {
    let PushCommand::Invoke { target, .. } = command;
    tracing::warn!(
        code = PUSH_PRESENCE_DROPPED,
        method = *target,
        "presence call dropped while disconnected"
    );
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::hub_protocol::RECORD_SEPARATOR, domain::events::PushEvent,
        test_support::RecordingSink,
    };

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|value| Duration::from_secs(*value)).collect()
    }

    #[test]
    fn queued_presence_calls_are_flushed_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(PushCommand::Invoke {
            target: AGENT_JOINED_CHAT,
            arguments: vec![json!("c"), json!("agent-1")],
        })
        .expect("receiver open");
        tx.send(PushCommand::Invoke {
            target: AGENT_LEFT_CHAT,
            arguments: vec![json!("agent-1"), json!("c")],
        })
        .expect("receiver open");

        let records = queued_invocations(&mut rx);

        let targets: Vec<_> = records.iter().map(|(target, _)| *target).collect();
        assert_eq!(targets, vec![AGENT_JOINED_CHAT, AGENT_LEFT_CHAT]);
        assert!(records[1].1.contains(r#""target":"AgentLeftChat""#));
        assert!(records[1].1.ends_with(RECORD_SEPARATOR));
        assert!(queued_invocations(&mut rx).is_empty());
    }

    #[test]
    fn retry_schedule_holds_at_last_delay() {
        let delays = secs(&[0, 2, 10, 30]);

        let observed: Vec<_> = (1..=6).map(|attempt| retry_delay(&delays, attempt).as_secs()).collect();

        assert_eq!(observed, vec![0, 2, 10, 30, 30, 30]);
        assert_eq!(retry_delay(&[], 3), Duration::ZERO);
    }

    #[test]
    fn settings_follow_push_config() {
        let mut config = AppConfig::default();
        config.agent.agent_id = "agent-1".to_owned();
        config.push.retry_delays_ms = vec![500, 1_000];

        let settings = PushSettings::from_config(&config);

        assert_eq!(settings.retry_delays, vec![Duration::from_millis(500), Duration::from_secs(1)]);
        assert_eq!(settings.keep_alive, Duration::from_secs(15));
        assert_eq!(settings.server_timeout, Duration::from_secs(30));
        assert_eq!(settings.channel, "web");
    }

    #[test]
    fn endpoint_carries_token_and_redacts_it() {
        let url = hub_endpoint("wss://desk.example.com/hubs/chat", "s3cr3t").expect("valid url");

        assert_eq!(url.as_str(), "wss://desk.example.com/hubs/chat?access_token=s3cr3t");
        assert!(!redact_url(url.as_str()).contains("s3cr3t"));
        assert!(matches!(hub_endpoint("not a url", ""), Err(PushError::InvalidUrl(_))));
    }

    #[test]
    fn dispatch_forwards_valid_events_and_drops_invalid_ones() {
        let sink = RecordingSink::default();
        let text = format!(
            concat!(
                r#"{{"type":1,"target":"ChatUpdated","arguments":[{{"chatId":"c","unreadCount":2}}]}}"#,
                "{sep}",
                r#"{{"type":1,"target":"NewMessage","arguments":[{{"id":"m1"}}]}}"#,
                "{sep}",
                r#"{{"type":1,"target":"Typing","arguments":[]}}"#,
                "{sep}",
                r#"{{"type":6}}"#,
                "{sep}"
            ),
            sep = RECORD_SEPARATOR
        );

        let outcome = dispatch_records(&text, &sink);

        assert_eq!(outcome, Dispatch::Continue { ping_requested: true });
        let events = sink.events();
        assert_eq!(events.len(), 1);
        let EngineEvent::Push(PushEvent::ChatMutated(mutation)) = &events[0] else {
            panic!("expected a chat mutation");
        };
        assert_eq!(mutation.chat_id, "c");
        assert_eq!(mutation.unread_count, Some(2));
    }

    #[test]
    fn close_record_ends_the_session_even_without_reconnect_permission() {
        let sink = RecordingSink::default();
        let text = format!(r#"{{"type":7,"error":"shutdown","allowReconnect":false}}{RECORD_SEPARATOR}"#);

        let outcome = dispatch_records(&text, &sink);

        assert!(matches!(outcome, Dispatch::Closed(reason) if reason.contains("shutdown")));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn stopped_handle_reports_disconnected_without_connecting() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime builds");
        let sink = Arc::new(RecordingSink::default());
        let settings = PushSettings {
            hub_url: "ws://127.0.0.1:9/hubs/chat".to_owned(),
            access_token: String::new(),
            agent_id: "agent-1".to_owned(),
            channel: "web".to_owned(),
            retry_delays: secs(&[0]),
            keep_alive: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
        };

        let handle = PushHandle::spawn(settings, runtime.handle(), sink.clone());
        handle.close();
        runtime.block_on(async {
            for _ in 0..100 {
                if sink
                    .events()
                    .contains(&EngineEvent::Connection(ConnectionStatus::Disconnected))
                {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });

        let events = sink.events();
        assert_eq!(
            events.first(),
            Some(&EngineEvent::Connection(ConnectionStatus::Connecting))
        );
        assert_eq!(
            events.last(),
            Some(&EngineEvent::Connection(ConnectionStatus::Disconnected))
        );
        assert!(!events.contains(&EngineEvent::Connection(ConnectionStatus::Connected)));
    }
}
