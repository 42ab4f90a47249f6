//! Global reply throttle: one accepted message per cooldown, at most one
//! warning per warning window.

/// Minimum gap between two accepted messages.
pub const DEFAULT_COOLDOWN_MS: u64 = 8_000;
/// Minimum gap between two spam warnings.
pub const DEFAULT_WARN_WINDOW_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    DropSilently,
    DropWithWarning,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    cooldown_ms: u64,
    warn_window_ms: u64,
    last_accepted_at: Option<u64>,
    last_warned_at: Option<u64>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MS, DEFAULT_WARN_WINDOW_MS)
    }
}

impl RateLimiter {
    pub fn new(cooldown_ms: u64, warn_window_ms: u64) -> Self {
        Self {
            cooldown_ms,
            warn_window_ms,
            last_accepted_at: None,
            last_warned_at: None,
        }
    }

    /// Decide for an event observed at `now_ms`.
    ///
    /// A clock that steps backwards reads as "no time elapsed", so neither
    /// stored timestamp ever decreases.
    pub fn admit(&mut self, now_ms: u64) -> Decision {
        let in_cooldown = self
            .last_accepted_at
            .is_some_and(|last| now_ms.saturating_sub(last) < self.cooldown_ms);

        if !in_cooldown {
            self.last_accepted_at = Some(now_ms.max(self.last_accepted_at.unwrap_or(0)));
            return Decision::Accept;
        }

        let may_warn = self
            .last_warned_at
            .map_or(true, |last| now_ms.saturating_sub(last) > self.warn_window_ms);
        if may_warn {
            self.last_warned_at = Some(now_ms.max(self.last_warned_at.unwrap_or(0)));
            Decision::DropWithWarning
        } else {
            Decision::DropSilently
        }
    }

    pub fn last_accepted_at(&self) -> Option<u64> {
        self.last_accepted_at
    }

    pub fn last_warned_at(&self) -> Option<u64> {
        self.last_warned_at
    }
}
