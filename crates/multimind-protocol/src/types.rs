//! Well-known message type names.

/// Message types the broker and the built-in skills emit or react to.
pub struct MessageTypes;

impl MessageTypes {
    // ── Utterances & speech ─────────────────────────────────────────────
    pub const UTTERANCE: &str = "recognizer_loop:utterance";
    pub const SPEAK: &str = "speak";

    // ── Skill runtime ───────────────────────────────────────────────────
    pub const SKILLS_FALLBACK: &str = "mycroft.skills.fallback";
    pub const SKILLS_LOADED: &str = "mycroft.skills.loaded";
    pub const SKILLS_LOAD_FAILED: &str = "mycroft.skills.loading_failure";
    pub const SKILLS_READY: &str = "mycroft.skills.ready";

    // ── Broker ──────────────────────────────────────────────────────────
    pub const CLIENT_CONNECTED: &str = "multimind.client.connected";
    pub const ILLEGAL_MESSAGE: &str = "multimind.illegal_message";
}
