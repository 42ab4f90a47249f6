use crate::bot::BotSession;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Built-in greetings: six-field cron expression (with seconds) and text.
pub const DEFAULT_GREETINGS: &[(&str, &str)] = &[
    ("0 0 8 * * *", "Günaydın 🌅"),
    ("0 0 12 * * *", "İyi öğlenler ☀️"),
    ("0 0 0 * * *", "İyi geceler 🌙"),
];

#[derive(Debug, Clone)]
pub struct Greeting {
    pub schedule: Schedule,
    pub text: String,
}

impl Greeting {
    pub fn parse(expr: &str, text: &str) -> Result<Self> {
        let schedule =
            Schedule::from_str(expr).with_context(|| format!("invalid cron expression {expr:?}"))?;
        Ok(Self {
            schedule,
            text: text.to_string(),
        })
    }
}

pub fn default_greetings() -> Result<Vec<Greeting>> {
    DEFAULT_GREETINGS
        .iter()
        .map(|(expr, text)| Greeting::parse(expr, text))
        .collect()
}

/// `HH:MM` for a daily `sec min hour * * *` expression; the raw expression
/// for anything else.
pub fn clock_label(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.as_slice() {
        [_, min, hour, "*", "*", "*"] => match (min.parse::<u32>(), hour.parse::<u32>()) {
            (Ok(m), Ok(h)) => format!("{h:02}:{m:02}"),
            _ => expr.to_string(),
        },
        _ => expr.to_string(),
    }
}

/// `(clock, text)` rows for the status panel.
pub fn default_listing() -> Vec<(String, String)> {
    DEFAULT_GREETINGS
        .iter()
        .map(|(expr, text)| (clock_label(expr), (*text).to_string()))
        .collect()
}

/// The earliest greeting strictly after `now`.
pub fn next_greeting<'a, Tz: TimeZone>(
    greetings: &'a [Greeting],
    now: &DateTime<Tz>,
) -> Option<(DateTime<Tz>, &'a Greeting)> {
    greetings
        .iter()
        .filter_map(|g| g.schedule.after(now).next().map(|at| (at, g)))
        .min_by(|(a, _), (b, _)| a.cmp(b))
}

/// Sleep until each greeting is due and send it, forever.
pub async fn run_greeting_scheduler(session: Arc<BotSession>, greetings: Vec<Greeting>) {
    if greetings.is_empty() {
        return;
    }
    loop {
        let now = Local::now();
        let Some((at, greeting)) = next_greeting(&greetings, &now) else {
            tracing::warn!("no upcoming greeting; scheduler stopping");
            return;
        };
        let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(at = %at, text = %greeting.text, "next greeting scheduled");
        tokio::time::sleep(wait).await;

        match session.send_greeting(&greeting.text).await {
            Ok(true) => tracing::info!(text = %greeting.text, "greeting sent"),
            Ok(false) => {}
            Err(e) => tracing::warn!(text = %greeting.text, "greeting failed: {e:#}"),
        }
    }
}
