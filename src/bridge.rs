//! Browser extension integration via Native Messaging.
//!
//! The daemon is launched by the browser as a native messaging host. Frames on
//! both directions are a 4-byte native-endian length followed by UTF-8 JSON.
//!
//! Outgoing frames are requests `{"id", "method", "params"}`. Incoming frames
//! are either responses correlated by `id`, or tab lifecycle notifications that
//! are forwarded to the tracker as [`TabEvent`]s.

use crate::host::{BrowserHost, HistoryQuery};
use crate::types::{
    BookmarkNode, Cookie, GeoPosition, HistoryItem, HostError, IdleState, TabEvent, TabId, TabInfo,
    TopSite,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

/// Largest frame accepted from the browser
pub const MAX_INCOMING_FRAME: usize = 64 * 1024 * 1024;

/// Largest frame the browser accepts from a native host
pub const MAX_OUTGOING_FRAME: usize = 1024 * 1024;

/// Read one frame. `Ok(None)` means the browser closed the pipe.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];

    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_ne_bytes(len_bytes) as usize;
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_INCOMING_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes", len),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;

    Ok(Some(buffer))
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_OUTGOING_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Message too large: {} bytes", payload.len()),
        ));
    }

    let len = (payload.len() as u32).to_ne_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Request to the extension
#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

/// Message from the extension
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Incoming {
    Response {
        id: u64,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<Value>,
    },
    TabUpdated {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        status: Option<String>,
    },
    TabActivated {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
    },
    TabRemoved {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
}

type Pending = HashMap<u64, oneshot::Sender<Result<Value, HostError>>>;

/// [`BrowserHost`] backed by the native messaging pipe
pub struct NativeBridge {
    /// Serialized requests for the writer task
    outgoing: mpsc::Sender<Vec<u8>>,
    /// Calls waiting for their response
    pending: Arc<Mutex<Pending>>,
    /// Set once the browser side has gone away
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl NativeBridge {
    /// Start the reader and writer tasks.
    ///
    /// Returns the bridge and the stream of tab events. The stream closes when
    /// the browser closes the pipe. Tab events are queued without bound: the
    /// reader never waits on the tracker before handling the next response.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        call_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TabEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(Pending::new()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(writer, outgoing_rx));
        tokio::spawn(read_loop(
            reader,
            event_tx,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        let bridge = Arc::new(Self {
            outgoing: outgoing_tx,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            call_timeout,
        });

        (bridge, event_rx)
    }

    /// Issue a request and decode its result
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_vec(&Request { id, method, params })?;
        if frame.len() > MAX_OUTGOING_FRAME {
            return Err(HostError::Protocol(format!(
                "{} request of {} bytes exceeds frame limit",
                method,
                frame.len()
            )));
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        if self.closed.load(Ordering::SeqCst) || self.outgoing.send(frame).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(HostError::Disconnected);
        }
        trace!("-> {} #{}", method, id);

        let value = match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(HostError::Disconnected),
            Err(_) => {
                lock(&self.pending).remove(&id);
                return Err(HostError::Timeout(self.call_timeout));
            }
        };

        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait::async_trait]
impl BrowserHost for NativeBridge {
    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError> {
        let tabs: Option<Vec<TabInfo>> = self
            .call(
                "tabs.query",
                json!({"active": true, "lastFocusedWindow": true}),
            )
            .await?;
        Ok(tabs.and_then(|tabs| tabs.into_iter().next()))
    }

    async fn page_content(&self, tab_id: TabId) -> Result<String, HostError> {
        let reply: Value = self
            .call(
                "tabs.sendMessage",
                json!({"tabId": tab_id, "message": {"action": "getPageContent"}}),
            )
            .await?;

        // A page without the content responder answers with nothing
        Ok(reply
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn cookies(&self, url: &str) -> Result<Vec<Cookie>, HostError> {
        let cookies: Option<Vec<Cookie>> = self.call("cookies.getAll", json!({"url": url})).await?;
        Ok(cookies.unwrap_or_default())
    }

    async fn search_bookmarks(&self, url: &str) -> Result<Vec<BookmarkNode>, HostError> {
        let nodes: Option<Vec<BookmarkNode>> =
            self.call("bookmarks.search", json!({"query": url})).await?;
        Ok(nodes.unwrap_or_default())
    }

    async fn current_position(&self) -> Result<Option<GeoPosition>, HostError> {
        self.call("geolocation.getCurrentPosition", json!({})).await
    }

    async fn top_sites(&self) -> Result<Vec<TopSite>, HostError> {
        let sites: Option<Vec<TopSite>> = self.call("topSites.get", json!({})).await?;
        Ok(sites.unwrap_or_default())
    }

    async fn idle_state(&self, detection_interval_secs: u64) -> Result<IdleState, HostError> {
        self.call(
            "idle.queryState",
            json!({"detectionIntervalInSeconds": detection_interval_secs}),
        )
        .await
    }

    async fn search_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryItem>, HostError> {
        let items: Option<Vec<HistoryItem>> = self
            .call("history.search", serde_json::to_value(query)?)
            .await?;
        Ok(items.unwrap_or_default())
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outgoing.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            error!("Failed to write to browser, stopping writer: {}", e);
            break;
        }
    }
    debug!("Native messaging writer stopped");
}

async fn read_loop<R>(
    mut reader: R,
    events: mpsc::UnboundedSender<TabEvent>,
    pending: Arc<Mutex<Pending>>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    debug!("Starting native messaging reader");

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Browser closed the native messaging pipe");
                break;
            }
            Err(e) => {
                error!("Error reading from browser: {}", e);
                break;
            }
        };

        let message: Incoming = match serde_json::from_slice(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed message from browser: {}", e);
                continue;
            }
        };

        match message {
            Incoming::Response { id, result, error } => {
                let waiter = lock(&pending).remove(&id);
                let Some(waiter) = waiter else {
                    warn!("Dropping response #{} with no pending call", id);
                    continue;
                };
                let outcome = match error {
                    Some(error) => Err(HostError::Remote(remote_message(error))),
                    None => Ok(result),
                };
                let _ = waiter.send(outcome);
            }
            other => {
                if let Some(event) = to_tab_event(other) {
                    if events.send(event).is_err() {
                        trace!("Tab event receiver dropped");
                    }
                }
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    for (_, waiter) in lock(&pending).drain() {
        let _ = waiter.send(Err(HostError::Disconnected));
    }
}

fn remote_message(error: Value) -> String {
    match error {
        Value::String(message) => message,
        other => other.to_string(),
    }
}

fn to_tab_event(message: Incoming) -> Option<TabEvent> {
    match message {
        Incoming::TabUpdated {
            tab_id,
            url,
            title,
            status,
        } => {
            if status.as_deref() != Some("complete") {
                trace!("Tab {} update with status {:?} ignored", tab_id, status);
                return None;
            }
            Some(TabEvent::NavigationCompleted(TabInfo::new(tab_id, url, title)))
        }
        Incoming::TabActivated { tab_id, url, title } => {
            Some(TabEvent::Activated(TabInfo::new(tab_id, url, title)))
        }
        Incoming::TabRemoved { tab_id } => Some(TabEvent::Closed(tab_id)),
        Incoming::Response { .. } => None,
    }
}
