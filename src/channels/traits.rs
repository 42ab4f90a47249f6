use crate::error::DeliveryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// A message event delivered by a messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    /// Canonical address of the author.
    pub from: String,
    /// Canonical address of the chat the message was written into.
    pub to: String,
    pub body: String,
    /// Written from the paired account itself (phone or another linked device).
    pub from_self: bool,
    /// Echo of a message this bot sent. Never answered.
    pub is_automated: bool,
    /// Receipt time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// An outbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub content: String,
    pub recipient: String,
}

impl SendMessage {
    pub fn new(content: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            recipient: recipient.into(),
        }
    }
}

/// Pairing/connection state owned by a transport and read by the status panel.
#[derive(Debug, Default)]
pub struct ConnectionState {
    ready: AtomicBool,
    /// `data:image/...` URL of the pending pairing QR code.
    qr: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub ready: bool,
    pub qr: Option<String>,
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Session is live; a pending QR code is no longer useful.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
        *self.qr.lock() = None;
    }

    pub fn mark_disconnected(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// A fresh QR code means the session is waiting to be (re)paired.
    pub fn set_qr(&self, qr: String) {
        self.ready.store(false, Ordering::Release);
        *self.qr.lock() = Some(qr);
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            ready: self.is_ready(),
            qr: self.qr.lock().clone(),
        }
    }
}

/// Core channel trait, implemented per messaging platform
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Connection state shared with the status panel
    fn connection(&self) -> &ConnectionState;

    /// Send a message through this channel.
    /// Fails with [`DeliveryError::NotConnected`] while the session is down.
    async fn send(&self, message: &SendMessage) -> Result<(), DeliveryError>;

    /// Start (or resume) pairing, e.g. request a fresh QR code.
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Check if channel is healthy
    async fn health_check(&self) -> bool {
        true
    }

    /// Whether `id` belongs to a message this channel delivered.
    /// Asked at dispatch time, after every earlier send has returned.
    fn is_own_echo(&self, _id: &str) -> bool {
        false
    }
}
