//! Wire-neutral message model shared by both halves of a session.
//!
//! The client side speaks axum's `ws::Message`, the upstream side speaks
//! tungstenite's `Message`. Both are converted into [`Incoming`] on read and
//! built from [`Frame`] on write, so payloads cross the relay untouched.

use axum::extract::ws::{self, Message as ClientMessage};
use bytes::Bytes;
use tokio_tungstenite::tungstenite::{
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message as UpstreamMessage,
};

use crate::error::ErrorBody;

/// Close code for failures on the other half of the pair.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Close code for a relay-initiated shutdown or idle timeout.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Code and reason of a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A data message. Text stays text and binary stays binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// JSON error frame sent to the client.
    pub fn error_notice(message: impl Into<String>) -> Self {
        Frame::Text(ErrorBody::new(message).to_json())
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
        }
    }
}

/// What a read from either socket turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Data(Frame),
    /// Ping/pong, answered by the hop that received it.
    Control,
    Close(Option<CloseReason>),
}

/// A socket message type the relay can read from and write to.
pub trait WireMessage: Send + Sized + 'static {
    fn from_frame(frame: Frame) -> Self;
    fn close(reason: Option<CloseReason>) -> Self;
    fn into_incoming(self) -> Incoming;
}

impl WireMessage for ClientMessage {
    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ClientMessage::Text(text.into()),
            Frame::Binary(bytes) => ClientMessage::Binary(bytes),
        }
    }

    fn close(reason: Option<CloseReason>) -> Self {
        ClientMessage::Close(reason.map(|r| ws::CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        }))
    }

    fn into_incoming(self) -> Incoming {
        match self {
            ClientMessage::Text(text) => Incoming::Data(Frame::Text(text.as_str().to_owned())),
            ClientMessage::Binary(bytes) => Incoming::Data(Frame::Binary(bytes)),
            ClientMessage::Ping(_) | ClientMessage::Pong(_) => Incoming::Control,
            ClientMessage::Close(frame) => Incoming::Close(
                frame.map(|f| CloseReason::new(f.code, f.reason.as_str())),
            ),
        }
    }
}

impl WireMessage for UpstreamMessage {
    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => UpstreamMessage::Text(text.into()),
            Frame::Binary(bytes) => UpstreamMessage::Binary(bytes),
        }
    }

    fn close(reason: Option<CloseReason>) -> Self {
        UpstreamMessage::Close(reason.map(|r| CloseFrame {
            code: CloseCode::from(r.code),
            reason: r.reason.into(),
        }))
    }

    fn into_incoming(self) -> Incoming {
        match self {
            UpstreamMessage::Text(text) => Incoming::Data(Frame::Text(text.as_str().to_owned())),
            UpstreamMessage::Binary(bytes) => Incoming::Data(Frame::Binary(bytes)),
            UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => {
                Incoming::Control
            }
            UpstreamMessage::Close(frame) => Incoming::Close(
                frame.map(|f| CloseReason::new(u16::from(f.code), f.reason.as_str())),
            ),
        }
    }
}
