use crate::providers::ReplyTone;

pub const ACK_REPLY: &str = "Tamamdır 😊";
pub const LAUGH_REPLY: &str = "Güldürdüysem ne mutlu 😄";
pub const SHORT_REPLY: &str = "👍";

const ACK_WORDS: &[&str] = &["ok", "okey", "tamam", "k", "kk"];
const LAUGH_EMOJI: &[&str] = &["😂", "🤣", "😆", "😹", "😂😂", "😂😂😂", "🤣🤣"];

/// Messages this short (in characters) get a thumbs-up instead of an AI call.
const SHORT_MAX_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDecision {
    Canned(&'static str),
    Defer,
}

/// Pick a fixed reply for trivial input, or defer to the AI client.
///
/// Tone does not influence canned replies.
pub fn select_reply(text: &str, _tone: ReplyTone) -> ReplyDecision {
    let normalized = text.trim().to_lowercase();

    if ACK_WORDS.contains(&normalized.as_str()) {
        return ReplyDecision::Canned(ACK_REPLY);
    }
    if LAUGH_EMOJI.contains(&normalized.as_str()) {
        return ReplyDecision::Canned(LAUGH_REPLY);
    }
    if normalized.chars().count() <= SHORT_MAX_CHARS {
        return ReplyDecision::Canned(SHORT_REPLY);
    }
    ReplyDecision::Defer
}
