//! Feed connection - one logical WebSocket session to the trade feed
//!
//! The connection owns the write half and a spawned reader task for the
//! read half. The reader parses frames and posts tagged [`FeedEvent`]s
//! into the runtime's channel; it never reconnects on its own.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::feed::messages::{parse_inbound, Inbound};
use crate::feed::{ConnId, FeedEvent, FeedEventKind};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub struct FeedConnection {
    id: ConnId,
    sink: WsSink,
    reader: JoinHandle<()>,
}

impl FeedConnection {
    /// Open one streaming session and start its reader task.
    pub async fn open(
        endpoint: &str,
        id: ConnId,
        tx: mpsc::Sender<FeedEvent>,
    ) -> Result<Self, FeedError> {
        let (ws_stream, _) = connect_async(endpoint).await.map_err(FeedError::Connect)?;
        let (sink, stream) = ws_stream.split();
        let reader = tokio::spawn(read_loop(id, stream, tx));
        Ok(Self { id, sink, reader })
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Send one outbound command frame.
    pub async fn send_text(&mut self, payload: String) -> Result<(), FeedError> {
        self.sink
            .send(Message::Text(payload))
            .await
            .map_err(FeedError::Send)
    }

    /// Answer a transport ping.
    pub async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), FeedError> {
        self.sink
            .send(Message::Pong(payload))
            .await
            .map_err(FeedError::Send)
    }

    /// Terminate the session immediately. No graceful drain; any frames
    /// still in flight are abandoned. Idempotent.
    pub fn close(&mut self) {
        self.reader.abort();
    }
}

impl Drop for FeedConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_loop(id: ConnId, mut stream: WsStream, tx: mpsc::Sender<FeedEvent>) {
    let forward = |kind: FeedEventKind| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(FeedEvent { conn: id, kind }).await;
        }
    };

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match parse_inbound(&text) {
                Ok(Inbound::Trade(trade)) => forward(FeedEventKind::Trade(trade)).await,
                Ok(Inbound::ProbeReply {
                    active_subscriptions,
                }) => {
                    forward(FeedEventKind::ProbeReply {
                        active_subscriptions,
                    })
                    .await
                }
                Ok(Inbound::Ignored) => {}
                Err(e) => {
                    warn!(conn = id, error = %e, "Dropping malformed feed message");
                }
            },
            Some(Ok(Message::Ping(data))) => forward(FeedEventKind::Ping(data)).await,
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| f.reason.into_owned())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by server".to_string());
                forward(FeedEventKind::Closed { reason }).await;
                break;
            }
            Some(Ok(other)) => {
                debug!(conn = id, "Skipping unexpected frame: {:?}", other);
            }
            Some(Err(e)) => {
                forward(FeedEventKind::Closed {
                    reason: e.to_string(),
                })
                .await;
                break;
            }
            None => {
                forward(FeedEventKind::Closed {
                    reason: "stream ended".to_string(),
                })
                .await;
                break;
            }
        }
    }
}
