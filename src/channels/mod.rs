pub mod traits;
pub mod whatsapp;

pub use traits::Channel;
pub use whatsapp::WhatsAppChannel;

use std::sync::Arc;
use std::time::Duration;

/// How often the connection monitor polls the transport.
pub const CONNECTION_POLL_SECS: u64 = 30;

const DEFAULT_CHANNEL_INITIAL_BACKOFF_SECS: u64 = 2;
const DEFAULT_CHANNEL_MAX_BACKOFF_SECS: u64 = 60;

/// Ask the transport for a session (QR code or resumed login), retrying with
/// exponential backoff until it answers once.
pub async fn connect_with_backoff(
    ch: &dyn Channel,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
) {
    let mut backoff = initial_backoff_secs.max(1);
    let max_backoff = max_backoff_secs.max(backoff);

    loop {
        match ch.connect().await {
            Ok(()) => return,
            Err(e) => {
                tracing::error!(
                    "Channel {} connect failed: {e:#}; retrying in {backoff}s",
                    ch.name()
                );
            }
        }
        tokio::time::sleep(Duration::from_secs(backoff)).await;
        // Double backoff AFTER sleeping so first error uses initial_backoff
        backoff = backoff.saturating_mul(2).min(max_backoff);
    }
}

/// One monitor tick: refresh the ready flag and request a fresh QR code when
/// the session dropped without one.
pub async fn poll_connection(ch: &dyn Channel) {
    let was_ready = ch.connection().is_ready();
    let healthy = ch.health_check().await;

    if healthy {
        if !was_ready {
            tracing::info!("Channel {} connected", ch.name());
        }
        ch.connection().mark_ready();
        return;
    }

    if was_ready {
        tracing::warn!("Channel {} lost its session", ch.name());
    }
    ch.connection().mark_disconnected();
    if ch.connection().snapshot().qr.is_none() {
        if let Err(e) = ch.connect().await {
            tracing::warn!("Channel {} reconnect failed: {e:#}", ch.name());
        }
    }
}

/// Spawn the connection bootstrap plus the periodic health monitor.
pub fn spawn_connection_monitor(
    ch: Arc<dyn Channel>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        connect_with_backoff(
            ch.as_ref(),
            DEFAULT_CHANNEL_INITIAL_BACKOFF_SECS,
            DEFAULT_CHANNEL_MAX_BACKOFF_SECS,
        )
        .await;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            poll_connection(ch.as_ref()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::traits::{ConnectionState, SendMessage};
    use crate::error::DeliveryError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedChannel {
        connection: ConnectionState,
        healthy: AtomicBool,
        connect_calls: AtomicUsize,
        connect_failures: AtomicUsize,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn connection(&self) -> &ConnectionState {
            &self.connection
        }

        async fn send(&self, _message: &SendMessage) -> Result<(), DeliveryError> {
            Ok(())
        }

        async fn connect(&self) -> anyhow::Result<()> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .connect_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("bridge unreachable");
            }
            self.connection.set_qr("data:image/png;base64,QR".into());
            Ok(())
        }

        async fn health_check(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn poll_marks_ready_when_healthy() {
        let ch = ScriptedChannel::default();
        ch.healthy.store(true, Ordering::SeqCst);
        poll_connection(&ch).await;
        assert!(ch.connection.is_ready());
        assert_eq!(ch.connect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn poll_requests_qr_after_session_loss() {
        let ch = ScriptedChannel::default();
        ch.connection.mark_ready();
        poll_connection(&ch).await;
        assert!(!ch.connection.is_ready());
        assert_eq!(ch.connect_calls.load(Ordering::SeqCst), 1);
        assert!(ch.connection.snapshot().qr.is_some());

        // A pending QR code is not replaced on the next tick.
        poll_connection(&ch).await;
        assert_eq!(ch.connect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_retries_after_failure() {
        let ch = ScriptedChannel::default();
        ch.connect_failures.store(1, Ordering::SeqCst);
        connect_with_backoff(&ch, 1, 4).await;
        assert_eq!(ch.connect_calls.load(Ordering::SeqCst), 2);
        assert!(ch.connection.snapshot().qr.is_some());
    }
}
