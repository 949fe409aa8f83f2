//! One WebSocket session pair, from upgrade to teardown.
//!
//! ```text
//!            ┌──────── client writer task ◀── mpsc ◀──┐
//! client ◀──┤                                         │ upstream pump
//!            └──▶ client pump ──▶ mpsc ──▶ upstream writer task ──▶ upstream
//! ```
//!
//! The coordinator task owns both read halves. While `Pending` it reads the
//! client and applies the pre-link policy; once `Linked` it drives the two
//! pumps and the supervisor concurrently. Every exit path goes through
//! [`Lifecycle::terminate`], and the coordinator joins (or aborts) both
//! writers before releasing the session slot.

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade},
    response::Response,
};
use futures_util::{Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::USER_AGENT, HeaderValue},
        Message as UpstreamMessage,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::Instrument;
use url::Url;

use crate::config::{PrelinkPolicy, WebSocketConfig};
use crate::error::RelayError;
use crate::net::{SessionGuard, SessionId};
use crate::websocket::frame::{CloseReason, Frame, Incoming, WireMessage};
use crate::websocket::lifecycle::{terminated, Lifecycle, Side, Termination};
use crate::websocket::writer::{spawn_writer, CLOSE_TIMEOUT};

/// Notice sent to the client when its message cannot reach the upstream.
pub const TARGET_NOT_OPEN: &str = "Target WebSocket not open";

/// Notice sent to the client when the pre-link queue overflows.
pub const PRELINK_OVERFLOW: &str = "Upstream WebSocket not ready, message dropped";

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything a session needs, resolved before the upgrade completes.
pub struct SessionContext {
    pub session: SessionGuard,
    pub upstream_url: Url,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub settings: WebSocketConfig,
    pub shutdown: watch::Receiver<bool>,
}

/// Complete the client upgrade and run the session in the background.
pub fn accept(upgrade: WebSocketUpgrade, ctx: SessionContext) -> Response {
    let session = ctx.session.id();
    upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(session = %session, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| run_session(socket, ctx))
}

/// Open the outbound WebSocket, bounded by `timeout` end to end.
pub async fn connect_upstream(
    url: &Url,
    user_agent: &str,
    timeout: Duration,
) -> Result<UpstreamSocket, RelayError> {
    let mut request = url.as_str().into_client_request()?;
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        request.headers_mut().insert(USER_AGENT, value);
    }

    match tokio::time::timeout(timeout, connect_async(request)).await {
        Ok(result) => {
            let (socket, _response) = result?;
            Ok(socket)
        }
        Err(_) => Err(RelayError::ConnectTimeout(timeout)),
    }
}

/// Relay one upgraded client socket until both sides are closed.
pub async fn run_session(client: WebSocket, ctx: SessionContext) {
    let span = tracing::info_span!("ws_session", session = %ctx.session.id());
    relay(client, ctx).instrument(span).await
}

async fn relay(client: WebSocket, ctx: SessionContext) {
    let SessionContext {
        session,
        upstream_url,
        user_agent,
        connect_timeout,
        idle_timeout,
        settings,
        mut shutdown,
    } = ctx;
    let id = session.id();
    let lifecycle = Arc::new(Lifecycle::new());
    let activity = Activity::new();

    tracing::info!(session = %id, url = %upstream_url, "WebSocket connection");

    let (client_sink, mut client_stream) = client.split();
    let (client_tx, client_writer) = spawn_writer::<_, ClientMessage>(
        Side::Client,
        id,
        client_sink,
        settings.send_buffer_capacity,
        lifecycle.clone(),
    );
    let mut writers = vec![client_writer];

    let connect = connect_upstream(&upstream_url, &user_agent, connect_timeout);
    let linked = await_upstream(
        id,
        connect,
        &mut client_stream,
        &client_tx,
        &settings,
        &mut shutdown,
        &lifecycle,
    )
    .await;

    if let Some((mut upstream, queued)) = linked {
        if lifecycle.link() {
            tracing::info!(session = %id, queued = queued.len(), "WebSocket upstream linked");

            let (upstream_sink, upstream_stream) = upstream.split();
            let (upstream_tx, upstream_writer) = spawn_writer::<_, UpstreamMessage>(
                Side::Upstream,
                id,
                upstream_sink,
                settings.send_buffer_capacity,
                lifecycle.clone(),
            );
            writers.push(upstream_writer);

            flush_queued(id, queued, &upstream_tx, &client_tx).await;

            tokio::join!(
                pump(
                    Side::Client,
                    id,
                    client_stream,
                    upstream_tx,
                    Some(client_tx.clone()),
                    &lifecycle,
                    &activity,
                ),
                pump(
                    Side::Upstream,
                    id,
                    upstream_stream,
                    client_tx.clone(),
                    None,
                    &lifecycle,
                    &activity,
                ),
                supervise(id, &lifecycle, &activity, idle_timeout, shutdown),
            );
        } else {
            // Terminated while the handshake was completing.
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, upstream.close(None)).await;
        }
    }

    drop(client_tx);
    for writer in writers {
        join_writer(id, writer).await;
    }

    lifecycle.finish();
    tracing::info!(
        session = %id,
        termination = ?lifecycle.termination(),
        "WebSocket session closed"
    );
    drop(session);
}

/// `Pending` phase: race the outbound handshake against client traffic,
/// shutdown and termination.
async fn await_upstream<C>(
    id: SessionId,
    connect: C,
    client_stream: &mut futures_util::stream::SplitStream<WebSocket>,
    client_tx: &mpsc::Sender<Frame>,
    settings: &WebSocketConfig,
    shutdown: &mut watch::Receiver<bool>,
    lifecycle: &Lifecycle,
) -> Option<(UpstreamSocket, VecDeque<Frame>)>
where
    C: std::future::Future<Output = Result<UpstreamSocket, RelayError>>,
{
    let mut queued = VecDeque::new();
    let mut closing = lifecycle.subscribe();
    tokio::pin!(connect);

    loop {
        tokio::select! {
            result = &mut connect => {
                return match result {
                    Ok(socket) => Some((socket, queued)),
                    Err(e) => {
                        tracing::error!(session = %id, error = %e, "Upstream WebSocket connect failed");
                        lifecycle.terminate(Termination::Failed {
                            by: Side::Upstream,
                            error: e.to_string(),
                        });
                        None
                    }
                };
            }
            message = client_stream.next() => match message {
                Some(Ok(message)) => match message.into_incoming() {
                    Incoming::Data(frame) => hold(id, frame, &mut queued, settings, client_tx),
                    Incoming::Control => {}
                    Incoming::Close(reason) => {
                        log_close(id, Side::Client, reason.as_ref());
                        lifecycle.terminate(Termination::Closed { by: Side::Client, frame: reason });
                        return None;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(session = %id, side = %Side::Client, error = %e, "WebSocket error");
                    lifecycle.terminate(Termination::Failed { by: Side::Client, error: e.to_string() });
                    return None;
                }
                None => {
                    lifecycle.terminate(Termination::Closed { by: Side::Client, frame: None });
                    return None;
                }
            },
            _ = shutdown_requested(shutdown) => {
                lifecycle.terminate(Termination::Shutdown);
                return None;
            }
            _ = terminated(&mut closing) => return None,
        }
    }
}

/// Apply the pre-link policy to a client message.
fn hold(
    id: SessionId,
    frame: Frame,
    queued: &mut VecDeque<Frame>,
    settings: &WebSocketConfig,
    client_tx: &mpsc::Sender<Frame>,
) {
    match settings.prelink_policy {
        PrelinkPolicy::Queue if queued.len() < settings.prelink_queue_capacity => {
            tracing::debug!(
                session = %id,
                kind = frame.kind(),
                len = frame.len(),
                queued = queued.len() + 1,
                "Message queued until upstream opens"
            );
            queued.push_back(frame);
        }
        PrelinkPolicy::Queue => {
            tracing::warn!(
                session = %id,
                capacity = settings.prelink_queue_capacity,
                "Pre-link queue full, message dropped"
            );
            notify_client(id, client_tx, PRELINK_OVERFLOW);
        }
        PrelinkPolicy::Drop => {
            tracing::warn!(
                session = %id,
                kind = frame.kind(),
                len = frame.len(),
                "Message arrived before upstream opened, dropped"
            );
        }
    }
}

/// Hand the pre-link queue to the upstream writer in arrival order.
///
/// Returns how many frames were delivered.
async fn flush_queued(
    id: SessionId,
    queued: VecDeque<Frame>,
    upstream_tx: &mpsc::Sender<Frame>,
    client_tx: &mpsc::Sender<Frame>,
) -> usize {
    let mut delivered = 0;
    for frame in queued {
        if upstream_tx.send(frame).await.is_err() {
            report_not_open(id, Side::Client, Some(client_tx));
            break;
        }
        delivered += 1;
    }
    delivered
}

/// Read one side and forward its data frames to the other side's writer.
async fn pump<St, M, E>(
    from: Side,
    id: SessionId,
    mut stream: St,
    to: mpsc::Sender<Frame>,
    origin: Option<mpsc::Sender<Frame>>,
    lifecycle: &Lifecycle,
    activity: &Activity,
) where
    St: Stream<Item = Result<M, E>> + Unpin,
    M: WireMessage,
    E: Display,
{
    let mut closing = lifecycle.subscribe();

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = terminated(&mut closing) => break,
        };

        match message {
            Some(Ok(message)) => match message.into_incoming() {
                Incoming::Data(frame) => {
                    activity.touch();
                    tracing::debug!(
                        session = %id,
                        direction = from.direction(),
                        kind = frame.kind(),
                        len = frame.len(),
                        "WebSocket message"
                    );
                    if let Frame::Text(text) = &frame {
                        tracing::trace!(session = %id, direction = from.direction(), payload = %text);
                    }

                    let delivered = tokio::select! {
                        result = to.send(frame) => result.is_ok(),
                        _ = terminated(&mut closing) => break,
                    };
                    if !delivered {
                        report_not_open(id, from, origin.as_ref());
                    }
                }
                Incoming::Control => activity.touch(),
                Incoming::Close(reason) => {
                    log_close(id, from, reason.as_ref());
                    lifecycle.terminate(Termination::Closed { by: from, frame: reason });
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(session = %id, side = %from, error = %e, "WebSocket error");
                lifecycle.terminate(Termination::Failed {
                    by: from,
                    error: e.to_string(),
                });
                break;
            }
            None => {
                tracing::debug!(session = %id, side = %from, "WebSocket stream ended");
                lifecycle.terminate(Termination::Closed { by: from, frame: None });
                break;
            }
        }
    }
}

/// Watches for shutdown and idleness until the session terminates.
async fn supervise(
    id: SessionId,
    lifecycle: &Lifecycle,
    activity: &Activity,
    idle_timeout: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut closing = lifecycle.subscribe();

    loop {
        let idle_check = async {
            match idle_timeout {
                Some(idle) => tokio::time::sleep(activity.remaining(idle)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = terminated(&mut closing) => break,
            _ = shutdown_requested(&mut shutdown) => {
                tracing::info!(session = %id, "Closing WebSocket session for shutdown");
                lifecycle.terminate(Termination::Shutdown);
                break;
            }
            _ = idle_check => {
                if let Some(idle) = idle_timeout {
                    if activity.idle_for() >= idle {
                        tracing::warn!(session = %id, idle_secs = idle.as_secs(), "WebSocket session idle, closing");
                        lifecycle.terminate(Termination::TimedOut);
                        break;
                    }
                }
            }
        }
    }
}

/// Resolves once shutdown is signalled; never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn report_not_open(id: SessionId, from: Side, origin: Option<&mpsc::Sender<Frame>>) {
    tracing::warn!(
        session = %id,
        direction = from.direction(),
        "{TARGET_NOT_OPEN}, message dropped"
    );
    if let Some(origin) = origin {
        notify_client(id, origin, TARGET_NOT_OPEN);
    }
}

/// Best-effort JSON error frame to the client; never waits on a full buffer.
fn notify_client(id: SessionId, client_tx: &mpsc::Sender<Frame>, notice: &str) {
    if let Err(e) = client_tx.try_send(Frame::error_notice(notice)) {
        tracing::debug!(session = %id, notice, error = %e, "Client notice not delivered");
    }
}

fn log_close(id: SessionId, side: Side, reason: Option<&CloseReason>) {
    match reason {
        Some(reason) => tracing::info!(
            session = %id,
            side = %side,
            code = reason.code,
            reason = %reason.reason,
            "WebSocket closed"
        ),
        None => tracing::info!(session = %id, side = %side, "WebSocket closed without status"),
    }
}

async fn join_writer(id: SessionId, mut writer: JoinHandle<()>) {
    // Writers bound their own close sequence; this only catches a send that
    // never completes because the peer stopped reading.
    let grace = CLOSE_TIMEOUT + Duration::from_secs(1);
    if tokio::time::timeout(grace, &mut writer).await.is_err() {
        tracing::warn!(session = %id, "WebSocket writer stuck, aborting");
        writer.abort();
    }
}

/// Last time either side produced traffic.
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    fn remaining(&self, idle: Duration) -> Duration {
        idle.saturating_sub(self.idle_for())
    }
}
