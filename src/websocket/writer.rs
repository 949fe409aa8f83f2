//! Socket writer tasks.
//!
//! Each socket of a pair is written by exactly one task fed through a bounded
//! channel. The task forwards frames until the session terminates, then
//! delivers whatever was already queued, emits its [`CloseDirective`] and
//! closes the sink.
//!
//! [`CloseDirective`]: crate::websocket::lifecycle::CloseDirective

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::net::SessionId;
use crate::websocket::frame::{Frame, WireMessage};
use crate::websocket::lifecycle::{terminated, Lifecycle, Side, Termination};

/// Upper bound for the close sequence of one writer.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn the writer for `side` and return its frame channel.
pub fn spawn_writer<S, M>(
    side: Side,
    session: SessionId,
    sink: S,
    capacity: usize,
    lifecycle: Arc<Lifecycle>,
) -> (mpsc::Sender<Frame>, JoinHandle<()>)
where
    S: Sink<M> + Unpin + Send + 'static,
    S::Error: Display,
    M: WireMessage,
{
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(run_writer(side, session, sink, rx, lifecycle));
    (tx, handle)
}

async fn run_writer<S, M>(
    side: Side,
    session: SessionId,
    mut sink: S,
    mut frames: mpsc::Receiver<Frame>,
    lifecycle: Arc<Lifecycle>,
) where
    S: Sink<M> + Unpin,
    S::Error: Display,
    M: WireMessage,
{
    let mut closing = lifecycle.subscribe();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(M::from_frame(frame)).await {
                        tracing::warn!(session = %session, side = %side, error = %e, "WebSocket write failed");
                        lifecycle.terminate(Termination::Failed { by: side, error: e.to_string() });
                        break;
                    }
                }
                None => break,
            },
            _ = terminated(&mut closing) => break,
        }
    }

    let close = async {
        // Frames queued before the termination was published still go out.
        while let Ok(frame) = frames.try_recv() {
            if sink.send(M::from_frame(frame)).await.is_err() {
                break;
            }
        }

        if let Some(termination) = lifecycle.termination() {
            let directive = termination.directive(side);
            if let Some(notice) = directive.notice {
                let _ = sink.send(M::from_frame(Frame::error_notice(notice))).await;
            }
            if let Some(frame) = &directive.frame {
                tracing::debug!(
                    session = %session,
                    side = %side,
                    code = frame.code,
                    reason = %frame.reason,
                    "Sending close frame"
                );
            }
            let _ = sink.send(M::close(directive.frame)).await;
        }
        let _ = sink.close().await;
    };

    if tokio::time::timeout(CLOSE_TIMEOUT, close).await.is_err() {
        tracing::warn!(session = %session, side = %side, "Close sequence timed out");
    }
}
