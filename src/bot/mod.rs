//! The message-response pipeline.
//!
//! [`BotSession`] owns every piece of mutable bot state. Each field sits
//! behind its own short-lived lock (or is atomic) and no lock is held across
//! an `.await`.

pub mod log;
pub mod rate_limit;
pub mod replies;

pub use log::{Direction, LogEntry, MessageLog};
pub use rate_limit::{Decision, RateLimiter};
pub use replies::{select_reply, ReplyDecision};

use crate::channels::traits::{Channel, InboundMessage, SendMessage};
use crate::identity::Identities;
use crate::providers::{ReplyClient, ReplyRequest, ReplyTone};
use crate::util::{now_ms, truncate_with_ellipsis};
use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const SPAM_WARNING: &str = "lan çok hızlı mesaj yazma botun ömrü azalıyo 😂";
pub const APOLOGY_REPLY: &str = "Bir hata oldu, birazdan tekrar yaz 🙏";

/// Capacity of the webhook → dispatcher queue.
pub const INBOUND_QUEUE_CAPACITY: usize = 100;

/// Runtime-togglable behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Lover,
    SelfEcho,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lover" => Ok(Self::Lover),
            "self-echo" | "self_echo" | "selfecho" => Ok(Self::SelfEcho),
            other => anyhow::bail!("unknown mode: {other}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModeFlags {
    lover: AtomicBool,
    self_echo: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeSnapshot {
    pub lover: bool,
    pub self_echo: bool,
}

impl ModeFlags {
    pub fn get(&self, mode: Mode) -> bool {
        self.flag(mode).load(Ordering::Acquire)
    }

    pub fn set(&self, mode: Mode, on: bool) {
        self.flag(mode).store(on, Ordering::Release);
    }

    /// Flip a mode and return its new value.
    pub fn toggle(&self, mode: Mode) -> bool {
        !self.flag(mode).fetch_xor(true, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        ModeSnapshot {
            lover: self.get(Mode::Lover),
            self_echo: self.get(Mode::SelfEcho),
        }
    }

    fn flag(&self, mode: Mode) -> &AtomicBool {
        match mode {
            Mode::Lover => &self.lover,
            Mode::SelfEcho => &self.self_echo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Echo of a message the bot sent itself.
    Automated,
    NotCounterparty,
    OwnMessage,
    NoContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Throttled,
    Warned,
    Replied(String),
}

/// Pick the reply for an admitted message: canned when trivial, otherwise
/// one AI call.
pub async fn compose_reply(replies: &ReplyClient, text: &str, tone: ReplyTone) -> String {
    match select_reply(text, tone) {
        ReplyDecision::Canned(reply) => reply.to_string(),
        ReplyDecision::Defer => replies.generate(&ReplyRequest::new(text, tone)).await,
    }
}

pub struct BotSession {
    channel: Arc<dyn Channel>,
    replies: ReplyClient,
    identities: Mutex<Identities>,
    limiter: Mutex<RateLimiter>,
    log: Mutex<MessageLog>,
    modes: ModeFlags,
}

impl BotSession {
    pub fn new(channel: Arc<dyn Channel>, replies: ReplyClient, identities: Identities) -> Self {
        Self {
            channel,
            replies,
            identities: Mutex::new(identities),
            limiter: Mutex::new(RateLimiter::default()),
            log: Mutex::new(MessageLog::default()),
            modes: ModeFlags::default(),
        }
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn modes(&self) -> &ModeFlags {
        &self.modes
    }

    pub fn identities(&self) -> Identities {
        self.identities.lock().clone()
    }

    pub fn log_snapshot(&self) -> Vec<LogEntry> {
        self.log.lock().snapshot()
    }

    /// Run one inbound event through the pipeline.
    ///
    /// Delivery failures are returned; the caller decides whether to apologize.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<Outcome> {
        // Sends complete before the next event is dispatched, so an echo that
        // raced ahead of its send response is recognized here.
        if msg.is_automated || (msg.from_self && self.channel.is_own_echo(&msg.id)) {
            tracing::debug!(id = %msg.id, "ignoring echo of our own reply");
            return Ok(Outcome::Ignored(IgnoreReason::Automated));
        }

        tracing::info!(
            from = %msg.from,
            from_self = msg.from_self,
            body = %truncate_with_ellipsis(&msg.body, 80),
            "message received"
        );
        self.log
            .lock()
            .record(Direction::In, &msg.from, &msg.to, &msg.body);

        let target = {
            let mut identities = self.identities.lock();
            identities.observe(msg);
            match self.route(&identities, msg) {
                Ok(target) => target,
                Err(reason) => {
                    tracing::debug!(from = %msg.from, ?reason, "message not routed");
                    return Ok(Outcome::Ignored(reason));
                }
            }
        };

        let text = msg.body.trim();
        if text.is_empty() || text.starts_with("http") {
            return Ok(Outcome::Ignored(IgnoreReason::NoContent));
        }

        let now = if msg.timestamp_ms == 0 {
            now_ms()
        } else {
            msg.timestamp_ms
        };
        let decision = self.limiter.lock().admit(now);
        match decision {
            Decision::DropSilently => {
                tracing::debug!(from = %msg.from, "rate limited");
                return Ok(Outcome::Throttled);
            }
            Decision::DropWithWarning => {
                tracing::info!(to = %target, "rate limited; sending warning");
                self.reply(&target, SPAM_WARNING).await?;
                return Ok(Outcome::Warned);
            }
            Decision::Accept => {}
        }

        let tone = ReplyTone::from_lover_mode(self.modes.get(Mode::Lover));
        let reply = compose_reply(&self.replies, text, tone).await;
        self.reply(&target, &reply).await?;
        Ok(Outcome::Replied(reply))
    }

    /// Decide who gets the reply, or why nobody does.
    fn route(
        &self,
        identities: &Identities,
        msg: &InboundMessage,
    ) -> Result<String, IgnoreReason> {
        if msg.from_self {
            let echo_allowed =
                self.modes.get(Mode::SelfEcho) && identities.is_counterparty(&msg.to);
            return if echo_allowed {
                Ok(msg.to.clone())
            } else {
                Err(IgnoreReason::OwnMessage)
            };
        }

        if identities.counterparty().address().is_some() && !identities.is_counterparty(&msg.from)
        {
            return Err(IgnoreReason::NotCounterparty);
        }
        Ok(msg.from.clone())
    }

    /// Send `text` to `to` and record it in the log.
    pub async fn reply(&self, to: &str, text: &str) -> Result<()> {
        self.channel.send(&SendMessage::new(text, to)).await?;
        let from = self
            .identities
            .lock()
            .me()
            .address()
            .unwrap_or("me")
            .to_string();
        self.log.lock().record(Direction::Out, &from, to, text);
        tracing::info!(to, reply = %truncate_with_ellipsis(text, 80), "reply sent");
        Ok(())
    }

    /// Handle one event; failures are logged and answered with an apology.
    pub async fn process(&self, msg: InboundMessage) -> Option<Outcome> {
        match self.handle_message(&msg).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(from = %msg.from, "failed to handle message: {e:#}");
                let target = if msg.from_self { &msg.to } else { &msg.from };
                if let Err(e) = self.reply(target, APOLOGY_REPLY).await {
                    tracing::warn!(to = %target, "apology not delivered: {e:#}");
                }
                None
            }
        }
    }

    /// Send a scheduled greeting to the counterparty.
    ///
    /// Returns `false` when it was skipped (no counterparty yet, or the
    /// session is not connected).
    pub async fn send_greeting(&self, text: &str) -> Result<bool> {
        let counterparty = self
            .identities
            .lock()
            .counterparty()
            .address()
            .map(ToString::to_string);
        let Some(target) = counterparty else {
            tracing::debug!("greeting skipped: counterparty unknown");
            return Ok(false);
        };
        if !self.channel.connection().is_ready() {
            tracing::debug!("greeting skipped: not connected");
            return Ok(false);
        }
        self.reply(&target, text).await?;
        Ok(true)
    }
}

/// Drain the inbound queue one message at a time, in arrival order.
pub async fn run_message_dispatch_loop(
    mut rx: mpsc::Receiver<InboundMessage>,
    session: Arc<BotSession>,
) {
    while let Some(msg) = rx.recv().await {
        if let Some(outcome) = session.process(msg).await {
            tracing::debug!(?outcome, "message handled");
        }
    }
    tracing::info!("inbound queue closed; dispatcher stopping");
}
