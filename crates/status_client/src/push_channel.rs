use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::{error::StatusDecodeError, protocol::StatusMessage};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::StatusSink;

const MESSAGE_CHANNEL_CAPACITY: usize = 1024;
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

type StatusSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum PushChannelError {
    #[error("invalid status channel url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported status channel scheme {scheme} in {url}")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("failed to connect status channel {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Normalizes a status endpoint to a websocket url; `http(s)` maps to `ws(s)`.
pub fn status_channel_url(raw: &str) -> Result<Url, PushChannelError> {
    let raw = raw.trim();
    let mut url = Url::parse(raw).map_err(|err| PushChannelError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(PushChannelError::UnsupportedScheme {
                url: raw.to_string(),
                scheme: other.to_string(),
            })
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| PushChannelError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("cannot switch scheme to {scheme}"),
        })?;
    Ok(url)
}

struct ActiveConnection {
    url: Url,
    writer: SplitSink<StatusSocket, Message>,
    reader_task: JoinHandle<()>,
}

/// Holds at most one status channel connection and republishes its frames.
///
/// There is no reconnect: once the server goes away, nothing is delivered
/// until the next [`PushChannelClient::connect`].
pub struct PushChannelClient {
    active: Mutex<Option<ActiveConnection>>,
    messages: broadcast::Sender<StatusMessage>,
    generation: Arc<AtomicU64>,
}

impl Default for PushChannelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PushChannelClient {
    pub fn new() -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            active: Mutex::new(None),
            messages,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Opens a connection to `url`, closing the previous one first.
    pub async fn connect(&self, url: &str) -> Result<(), PushChannelError> {
        let url = status_channel_url(url)?;
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.shutdown(previous).await;
        }

        let (socket, _) =
            connect_async(url.as_str())
                .await
                .map_err(|source| PushChannelError::Connect {
                    url: url.to_string(),
                    source,
                })?;
        info!("push: status channel connected url={url}");

        let (writer, reader) = socket.split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let reader_task = spawn_reader(
            reader,
            url.clone(),
            generation,
            Arc::clone(&self.generation),
            self.messages.clone(),
        );
        *active = Some(ActiveConnection {
            url,
            writer,
            reader_task,
        });
        Ok(())
    }

    /// Tears the current connection down; frames still in flight are discarded.
    pub async fn close(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            self.shutdown(previous).await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.reader_task.is_finished())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusMessage> {
        self.messages.subscribe()
    }

    /// Feeds every received message, in order, to `sink`.
    pub fn bind(&self, sink: Arc<dyn StatusSink>) -> JoinHandle<()> {
        let mut stream = BroadcastStream::new(self.messages.subscribe());
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) => sink.deliver(message).await,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("push: status consumer lagged skipped={skipped}");
                    }
                }
            }
        })
    }

    async fn shutdown(&self, mut previous: ActiveConnection) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        previous.reader_task.abort();
        if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, previous.writer.close())
            .await
            .is_err()
        {
            debug!("push: close handshake timed out url={}", previous.url);
        }
        info!("push: status channel closed url={}", previous.url);
    }
}

fn spawn_reader(
    mut reader: futures::stream::SplitStream<StatusSocket>,
    url: Url,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    messages: broadcast::Sender<StatusMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = reader.next().await {
            if current_generation.load(Ordering::SeqCst) != generation {
                break;
            }
            let decoded = match frame {
                Ok(Message::Text(text)) => StatusMessage::from_text(&text),
                Ok(Message::Binary(bytes)) => StatusMessage::from_bytes(&bytes),
                Ok(Message::Close(_)) => {
                    info!("push: server closed status channel url={url}");
                    break;
                }
                Ok(_) => continue,
                Err(err) => {
                    error!("push: status channel receive failed url={url}: {err}");
                    break;
                }
            };
            forward(&messages, decoded);
        }
        debug!("push: reader stopped url={url} generation={generation}");
    })
}

fn forward(
    messages: &broadcast::Sender<StatusMessage>,
    decoded: Result<StatusMessage, StatusDecodeError>,
) {
    match decoded {
        Ok(message) => {
            if messages.send(message).is_err() {
                debug!("push: no consumer bound, status message discarded");
            }
        }
        Err(err) => warn!("push: skipping undecodable frame: {err}"),
    }
}

#[cfg(test)]
#[path = "tests/push_channel_tests.rs"]
mod tests;
