//! Socket.IO stage channel.
//!
//! Speaks the client side of Socket.IO v5 over the Engine.IO v4 WebSocket
//! transport: waits for the server's `open` packet, joins the configured
//! namespace, answers pings, and hands `start_agent`, `agent_message` and
//! `clear_agent` events to the controller. When the server emitted an event
//! with a callback, the ACK packet is written once the handler fires the
//! event's [`Ack`].

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use agent_stage_core::config::Config;
use agent_stage_core::protocol::{Delivery, StageEvent};
use agent_stage_core::socketio::{EnginePacket, Handshake, ROOT_NAMESPACE, SocketPacket};
use agent_stage_core::{Ack, Result, StageError};

use crate::{DeliveryReceiver, DeliverySender, EventSource, SourceHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on how long to wait for a server ping.
const MAX_PING_WAIT: Duration = Duration::from_secs(3600);

/// Engine.IO WebSocket endpoint for a Socket.IO server URL.
///
/// `http://host:5000` becomes
/// `ws://host:5000/socket.io/?EIO=4&transport=websocket`; an explicit path
/// and query are kept.
pub fn engine_url(url: &str) -> Result<String> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| StageError::Config(format!("not a URL: {url}")))?;
    let scheme = match scheme {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(StageError::Config(format!("unsupported URL scheme: {other}"))),
    };

    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };
    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    if host.is_empty() {
        return Err(StageError::Config(format!("missing host: {url}")));
    }

    let mut path = if path.is_empty() || path == "/" {
        "/socket.io/".to_string()
    } else {
        path.to_string()
    };
    if !path.ends_with('/') {
        path.push('/');
    }

    let mut endpoint = format!("{scheme}://{host}{path}?");
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        endpoint.push_str(query);
        endpoint.push('&');
    }
    endpoint.push_str("EIO=4&transport=websocket");
    Ok(endpoint)
}

/// What the connection loop does after one inbound frame.
#[derive(Debug, PartialEq)]
enum Step {
    Continue,
    /// Answer a server ping.
    Pong(String),
    /// The session is over.
    Stop,
}

/// Build the acknowledgment for an event carrying `ack_id`.
fn ack_for(ack_id: u64, ack_tx: &mpsc::UnboundedSender<u64>) -> Ack {
    let ack_tx = ack_tx.clone();
    Ack::new(move || {
        let _ = ack_tx.send(ack_id);
    })
}

/// Route one Engine.IO text frame.
fn route_text(
    conn_id: &str,
    namespace: &str,
    text: &str,
    delivery_tx: &DeliverySender,
    ack_tx: &mpsc::UnboundedSender<u64>,
) -> Step {
    match EnginePacket::decode(text) {
        Ok(EnginePacket::Ping(data)) => Step::Pong(data),
        Ok(EnginePacket::Close) => {
            info!(conn_id, "Server closed the session");
            Step::Stop
        }
        Ok(EnginePacket::Message(data)) => {
            route_packet(conn_id, namespace, &data, delivery_tx, ack_tx)
        }
        Ok(_) => Step::Continue,
        Err(e) => {
            warn!(conn_id, %e, "Dropping malformed frame");
            Step::Continue
        }
    }
}

/// Route one Socket.IO packet.
fn route_packet(
    conn_id: &str,
    namespace: &str,
    data: &str,
    delivery_tx: &DeliverySender,
    ack_tx: &mpsc::UnboundedSender<u64>,
) -> Step {
    let packet = match SocketPacket::decode(data) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(conn_id, %e, "Dropping malformed packet");
            return Step::Continue;
        }
    };
    if packet.namespace() != namespace {
        debug!(conn_id, namespace = packet.namespace(), "Ignoring packet for another namespace");
        return Step::Continue;
    }

    match packet {
        SocketPacket::Event { id, name, args, .. } => match StageEvent::decode(&name, args.first()) {
            Ok(Some(event)) => {
                debug!(conn_id, event = event.name(), agent_id = %event.agent_id(), ack = ?id, "Stage event received");
                let delivery = Delivery {
                    event,
                    ack: id.map(|id| ack_for(id, ack_tx)),
                };
                if delivery_tx.send(delivery).is_err() {
                    debug!(conn_id, "Delivery receiver dropped");
                    return Step::Stop;
                }
                Step::Continue
            }
            Ok(None) => {
                debug!(conn_id, event = %name, "Ignoring unhandled event");
                if let Some(id) = id {
                    let _ = ack_tx.send(id);
                }
                Step::Continue
            }
            Err(e) => {
                warn!(conn_id, %e, "Dropping malformed event");
                Step::Continue
            }
        },
        SocketPacket::Disconnect { .. } => {
            info!(conn_id, "Server disconnected the namespace");
            Step::Stop
        }
        other => {
            debug!(conn_id, ?other, "Ignoring packet");
            Step::Continue
        }
    }
}

async fn next_text(ws: &mut WsStream) -> Result<String> {
    while let Some(msg) = ws.next().await {
        match msg.map_err(|e| StageError::Channel(format!("read failed: {e}")))? {
            Message::Text(text) => return Ok(text.as_str().to_string()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(StageError::Channel("connection closed while connecting".into()))
}

async fn send_text(ws: &mut WsStream, text: String) -> Result<()> {
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| StageError::Channel(format!("send failed: {e}")))
}

/// Client for a Socket.IO stage event server.
pub struct SocketChannel {
    url: String,
    namespace: String,
    connect_timeout: Duration,
}

impl SocketChannel {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            namespace: ROOT_NAMESPACE.to_string(),
            connect_timeout,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.channel_url(),
            Duration::from_millis(config.connect_timeout_ms()),
        )
        .with_namespace(config.channel_namespace())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Open the WebSocket and join the namespace.
    async fn connect(&self, endpoint: &str) -> Result<(WsStream, Handshake)> {
        let (mut ws, _) = connect_async(endpoint)
            .await
            .map_err(|e| StageError::Channel(format!("connect to {endpoint} failed: {e}")))?;

        let handshake = match EnginePacket::decode(&next_text(&mut ws).await?)? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(StageError::Protocol(format!(
                    "expected an open packet, got {other:?}"
                )));
            }
        };

        let join = SocketPacket::Connect {
            namespace: self.namespace.clone(),
            data: None,
        };
        send_text(&mut ws, join.to_engine()).await?;

        loop {
            match EnginePacket::decode(&next_text(&mut ws).await?)? {
                EnginePacket::Ping(data) => send_text(&mut ws, EnginePacket::Pong(data).encode()).await?,
                EnginePacket::Close => {
                    return Err(StageError::Channel("server closed the session while connecting".into()));
                }
                EnginePacket::Message(data) => match SocketPacket::decode(&data)? {
                    SocketPacket::Connect { namespace, .. } if namespace == self.namespace => {
                        return Ok((ws, handshake));
                    }
                    SocketPacket::ConnectError { namespace, data } if namespace == self.namespace => {
                        let reason = data
                            .map(|d| {
                                d.get("message")
                                    .and_then(|m| m.as_str())
                                    .map(str::to_string)
                                    .unwrap_or_else(|| d.to_string())
                            })
                            .unwrap_or_default();
                        return Err(StageError::Channel(format!(
                            "namespace {namespace} refused: {reason}"
                        )));
                    }
                    other => debug!(?other, "Ignoring packet before namespace connect"),
                },
                _ => {}
            }
        }
    }
}

#[async_trait]
impl EventSource for SocketChannel {
    fn id(&self) -> &str {
        "socket"
    }

    async fn start(&self) -> anyhow::Result<(DeliveryReceiver, SourceHandle)> {
        let endpoint = engine_url(&self.url)?;
        let (ws, handshake) = tokio::time::timeout(self.connect_timeout, self.connect(&endpoint))
            .await
            .map_err(|_| StageError::Channel(format!("connect to {endpoint} timed out")))??;

        let conn_id = Uuid::new_v4().to_string();
        info!(
            conn_id = %conn_id,
            sid = %handshake.sid,
            namespace = %self.namespace,
            url = %self.url,
            "Connected to stage channel"
        );

        let namespace = self.namespace.clone();
        let liveness = Duration::from_millis(
            handshake.ping_interval.saturating_add(handshake.ping_timeout),
        )
        .min(MAX_PING_WAIT);

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel::<Delivery>();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<u64>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut deadline = Instant::now() + liveness;
            loop {
                let outbound = tokio::select! {
                    _ = &mut shutdown_rx => {
                        let leave = SocketPacket::Disconnect { namespace: namespace.clone() };
                        let _ = ws_tx.send(Message::Text(leave.to_engine().into())).await;
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    Some(id) = ack_rx.recv() => {
                        debug!(conn_id = %conn_id, ack = id, "Sending ack");
                        SocketPacket::Ack { namespace: namespace.clone(), id, args: Vec::new() }.to_engine()
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!(conn_id = %conn_id, "No ping from server within {liveness:?}, closing");
                        break;
                    }
                    msg = ws_rx.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            match route_text(&conn_id, &namespace, text.as_str(), &delivery_tx, &ack_tx) {
                                Step::Continue => continue,
                                Step::Pong(data) => {
                                    deadline = Instant::now() + liveness;
                                    EnginePacket::Pong(data).encode()
                                }
                                Step::Stop => break,
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            warn!(conn_id = %conn_id, %e, "Stage channel read error");
                            break;
                        }
                        Some(Ok(_)) => continue,
                    },
                };

                if ws_tx.send(Message::Text(outbound.into())).await.is_err() {
                    warn!(conn_id = %conn_id, "Failed to write to stage channel, closing");
                    break;
                }
            }
            info!(conn_id = %conn_id, "Stage channel closed");
        });

        Ok((delivery_rx, SourceHandle::new(shutdown_tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_stage_core::types::AgentId;

    fn channels() -> (
        DeliverySender,
        DeliveryReceiver,
        mpsc::UnboundedSender<u64>,
        mpsc::UnboundedReceiver<u64>,
    ) {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        (delivery_tx, delivery_rx, ack_tx, ack_rx)
    }

    #[test]
    fn test_engine_url() {
        assert_eq!(
            engine_url("http://127.0.0.1:5000").unwrap(),
            "ws://127.0.0.1:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            engine_url("https://stage.example/").unwrap(),
            "wss://stage.example/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            engine_url("ws://host:80/custom/io?token=abc").unwrap(),
            "ws://host:80/custom/io/?token=abc&EIO=4&transport=websocket"
        );
        assert!(engine_url("ftp://host").is_err());
        assert!(engine_url("127.0.0.1:5000").is_err());
        assert!(engine_url("http:///socket.io/").is_err());
    }

    #[test]
    fn test_route_flask_socketio_event() {
        let (delivery_tx, mut delivery_rx, ack_tx, mut ack_rx) = channels();
        let step = route_text("t", "/", r#"42["start_agent",{"agent_id":1}]"#, &delivery_tx, &ack_tx);
        assert_eq!(step, Step::Continue);

        let delivery = delivery_rx.try_recv().unwrap();
        assert_eq!(
            delivery.event,
            StageEvent::StartAgent {
                agent_id: AgentId::from(1u32)
            }
        );
        assert!(delivery.ack.is_none());
        assert!(ack_rx.try_recv().is_err());
    }

    #[test]
    fn test_route_defers_ack_to_handler() {
        let (delivery_tx, mut delivery_rx, ack_tx, mut ack_rx) = channels();
        let text = r#"428["clear_agent",{"agent_id":"a"}]"#;
        assert_eq!(route_text("t", "/", text, &delivery_tx, &ack_tx), Step::Continue);
        assert!(ack_rx.try_recv().is_err());

        let delivery = delivery_rx.try_recv().unwrap();
        delivery.ack.expect("ack requested").fire();
        assert_eq!(ack_rx.try_recv().unwrap(), 8);
    }

    #[test]
    fn test_route_acks_unhandled_events_immediately() {
        let (delivery_tx, mut delivery_rx, ack_tx, mut ack_rx) = channels();
        assert_eq!(route_text("t", "/", r#"424["status",{}]"#, &delivery_tx, &ack_tx), Step::Continue);
        assert_eq!(ack_rx.try_recv().unwrap(), 4);
        assert!(delivery_rx.try_recv().is_err());
    }

    #[test]
    fn test_route_namespaces() {
        let (delivery_tx, mut delivery_rx, ack_tx, _ack_rx) = channels();
        let root = r#"42["start_agent",{"agent_id":1}]"#;
        let stage = r#"42/stage,["start_agent",{"agent_id":2}]"#;

        route_text("t", "/stage", root, &delivery_tx, &ack_tx);
        route_text("t", "/stage", stage, &delivery_tx, &ack_tx);

        let delivery = delivery_rx.try_recv().unwrap();
        assert_eq!(delivery.event.agent_id().as_str(), "2");
        assert!(delivery_rx.try_recv().is_err());
    }

    #[test]
    fn test_route_malformed_keeps_going() {
        let (delivery_tx, mut delivery_rx, ack_tx, mut ack_rx) = channels();
        for text in ["", "x", "4{", r#"42{"agent_id":1}"#, r#"429["agent_message",{"agent_id":1}]"#] {
            assert_eq!(route_text("t", "/", text, &delivery_tx, &ack_tx), Step::Continue, "{text}");
        }
        assert!(delivery_rx.try_recv().is_err());
        // A malformed stage event is not acknowledged.
        assert!(ack_rx.try_recv().is_err());
    }

    #[test]
    fn test_route_session_control() {
        let (delivery_tx, _delivery_rx, ack_tx, _ack_rx) = channels();
        assert_eq!(route_text("t", "/", "2", &delivery_tx, &ack_tx), Step::Pong(String::new()));
        assert_eq!(route_text("t", "/", "1", &delivery_tx, &ack_tx), Step::Stop);
        assert_eq!(route_text("t", "/", "41", &delivery_tx, &ack_tx), Step::Stop);
        assert_eq!(route_text("t", "/", "41/other,", &delivery_tx, &ack_tx), Step::Continue);
        assert_eq!(route_text("t", "/", "6", &delivery_tx, &ack_tx), Step::Continue);
    }

    #[test]
    fn test_route_stops_when_receiver_dropped() {
        let (delivery_tx, delivery_rx, ack_tx, _ack_rx) = channels();
        drop(delivery_rx);
        let text = r#"42["start_agent",{"agent_id":1}]"#;
        assert_eq!(route_text("t", "/", text, &delivery_tx, &ack_tx), Step::Stop);
    }

    #[test]
    fn test_from_config() {
        let channel = SocketChannel::from_config(&Config::default());
        assert_eq!(channel.url(), "http://127.0.0.1:5000");
        assert_eq!(channel.namespace(), "/");
        assert_eq!(channel.id(), "socket");
    }
}
