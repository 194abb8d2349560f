//! WebSocket realtime session

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    ChannelError, ChannelEvent, ConnectionState, Connector, EventStream, OutboundEvent, RealtimeSession, parse_inbound,
};
use crate::config::Config;
use crate::trip::TripId;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Opens one WebSocket session per trip
pub struct WsConnector {
    config: Config,
    token: String,
}

impl WsConnector {
    pub fn new(config: &Config, token: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            token: token.into(),
        }
    }

    /// Connector reading the token from the configured environment variable
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        Ok(Self::new(config, config.server.token()?))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, trip_id: TripId) -> Result<(Box<dyn RealtimeSession>, EventStream), ChannelError> {
        debug!(%trip_id, "open: called");
        let url = self
            .config
            .ws_url(trip_id, &self.token)
            .map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        let connect_timeout = Duration::from_millis(self.config.realtime.connect_timeout_ms);
        let (session, events) = WsSession::connect(url, connect_timeout).await?;
        Ok((Box::new(session), events))
    }
}

/// A connected WebSocket session
pub struct WsSession {
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    recv_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WsSession {
    /// Connect and start the background receive loop
    pub async fn connect(url: Url, connect_timeout: Duration) -> Result<(Self, EventStream), ChannelError> {
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ChannelError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                url.scheme()
            )));
        }

        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        debug!(host = ?url.host_str(), path = url.path(), "connect: connecting");

        let (stream, _response) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ChannelError::Timeout(connect_timeout))?
            .map_err(|error| ChannelError::WebSocket(error.to_string()))?;

        let (writer, mut reader) = stream.split();
        *state.write().await = ConnectionState::Open;
        info!(path = url.path(), "connect: channel open");

        let (tx, rx) = mpsc::unbounded_channel();
        let task_state = state.clone();
        let task = tokio::spawn(async move {
            let reason = loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => match parse_inbound(&text) {
                        Ok(Some(event)) => {
                            if tx.send(ChannelEvent::Inbound(event)).is_err() {
                                break "receiver dropped".to_string();
                            }
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!(%error, "recv: dropping malformed frame");
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        debug!(bytes = payload.len(), "recv: ping");
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|frame| frame.reason.to_string())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Err(error)) => {
                        warn!(%error, "recv: websocket read error");
                        break error.to_string();
                    }
                    None => break "stream ended".to_string(),
                }
            };

            *task_state.write().await = ConnectionState::Closed;
            debug!(%reason, "recv: loop finished");
            let _ = tx.send(ChannelEvent::Closed { reason });
        });

        let session = Self {
            state,
            writer: Arc::new(Mutex::new(Some(writer))),
            recv_task: std::sync::Mutex::new(Some(task)),
        };
        Ok((session, rx))
    }

    fn abort_recv_task(&self) {
        if let Ok(mut guard) = self.recv_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl RealtimeSession for WsSession {
    async fn send(&self, event: &OutboundEvent) -> Result<(), ChannelError> {
        if self.state().await != ConnectionState::Open {
            return Err(ChannelError::NotConnected);
        }
        let text = serde_json::to_string(event)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ChannelError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ChannelError::WebSocket(error.to_string()))
    }

    async fn close(&self) -> Result<(), ChannelError> {
        debug!("close: called");
        *self.state.write().await = ConnectionState::Closed;
        self.abort_recv_task();
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer
                .send(Message::Close(None))
                .await
                .map_err(|error| ChannelError::WebSocket(error.to_string()))?;
        }
        Ok(())
    }

    async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.abort_recv_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_websocket_scheme() {
        let url = Url::parse("http://localhost:8000/v1/trips/1/ws").unwrap();
        let result = WsSession::connect(url, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ChannelError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_connect_refused_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{}/v1/trips/1/ws", addr)).unwrap();
        let result = WsSession::connect(url, Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
