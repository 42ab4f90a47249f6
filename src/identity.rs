//! Who is "me" and who is the one chat partner the bot talks to.
//!
//! Each identity slot is a small state machine. A configured address is
//! authoritative forever; an unset slot may learn its address once from
//! observed traffic.

use crate::channels::traits::InboundMessage;
use serde::Serialize;

/// Canonical domain suffix appended to bare phone numbers.
pub const ADDRESS_DOMAIN: &str = "@s.whatsapp.net";

/// Normalize a phone-number-like string into a canonical chat address.
///
/// Anything already carrying a domain (`…@…`) is passed through trimmed.
/// Otherwise every non-digit is dropped and the canonical domain appended.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains('@') {
        return Some(trimmed.to_string());
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("{digits}{ADDRESS_DOMAIN}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "address", rename_all = "lowercase")]
pub enum SlotState {
    Unset,
    Configured(String),
    Inferred(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySlot {
    state: SlotState,
}

impl IdentitySlot {
    /// Build from a raw configured value; unusable values leave the slot unset.
    pub fn from_config(raw: Option<&str>) -> Self {
        let state = raw
            .and_then(normalize_address)
            .map_or(SlotState::Unset, SlotState::Configured);
        Self { state }
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn address(&self) -> Option<&str> {
        match &self.state {
            SlotState::Unset => None,
            SlotState::Configured(addr) | SlotState::Inferred(addr) => Some(addr),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, SlotState::Configured(_))
    }

    /// `Unset -> Inferred(addr)`. Any other state is left alone.
    /// Returns the authoritative address after the call.
    pub fn learn(&mut self, addr: &str) -> Option<&str> {
        if self.state == SlotState::Unset {
            if let Some(addr) = normalize_address(addr) {
                self.state = SlotState::Inferred(addr);
            }
        }
        self.address()
    }

    /// Forget an inferred address. Configured addresses survive.
    pub fn reset(&mut self) {
        if let SlotState::Inferred(_) = self.state {
            self.state = SlotState::Unset;
        }
    }

    pub fn matches(&self, addr: &str) -> bool {
        match (self.address(), normalize_address(addr)) {
            (Some(own), Some(other)) => own == other,
            _ => false,
        }
    }
}

/// The two identity slots tracked per session.
#[derive(Debug, Clone)]
pub struct Identities {
    me: IdentitySlot,
    counterparty: IdentitySlot,
}

impl Identities {
    pub fn from_config(self_raw: Option<&str>, counterparty_raw: Option<&str>) -> Self {
        Self {
            me: IdentitySlot::from_config(self_raw),
            counterparty: IdentitySlot::from_config(counterparty_raw),
        }
    }

    pub fn me(&self) -> &IdentitySlot {
        &self.me
    }

    pub fn counterparty(&self) -> &IdentitySlot {
        &self.counterparty
    }

    /// Apply the inference rules to one observed event.
    ///
    /// A self-flagged event teaches `me` its sender. Any other event teaches
    /// `counterparty` its sender, unless that sender is `me`.
    pub fn observe(&mut self, msg: &InboundMessage) {
        if msg.from_self {
            if self.me.address().is_none() {
                if let Some(learned) = self.me.learn(&msg.from) {
                    tracing::info!(address = learned, "self identity inferred");
                }
            }
            return;
        }

        if self.counterparty.address().is_some() || self.me.matches(&msg.from) {
            return;
        }
        if let Some(learned) = self.counterparty.learn(&msg.from) {
            tracing::info!(address = learned, "counterparty identity inferred");
        }
    }

    pub fn is_counterparty(&self, addr: &str) -> bool {
        self.counterparty.matches(addr)
    }

    /// Forget inferred identities (configured ones are kept).
    pub fn reset_inferred(&mut self) {
        self.me.reset();
        self.counterparty.reset();
    }
}
