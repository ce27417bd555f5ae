//! Skills shipped with the broker. Both are part of the default skill set.

use multimind_protocol::{BusMessage, MessageTypes};
use serde_json::json;

use crate::{Skill, SkillError};

/// Answers any utterance mentioning "hello".
#[derive(Debug, Default)]
pub struct HelloWorldSkill;

impl HelloWorldSkill {
    pub const ID: &'static str = "skill-ovos-hello-world.openvoiceos";

    pub fn new() -> Self {
        Self
    }
}

impl Skill for HelloWorldSkill {
    fn skill_id(&self) -> &str {
        Self::ID
    }

    fn subscriptions(&self) -> &[&'static str] {
        &[MessageTypes::UTTERANCE]
    }

    async fn handle(&self, message: &BusMessage) -> Result<Vec<BusMessage>, SkillError> {
        let greeted = utterances(message)
            .iter()
            .any(|u| u.to_lowercase().contains("hello"));
        if !greeted {
            return Ok(Vec::new());
        }
        Ok(vec![message.reply(
            MessageTypes::SPEAK,
            json!({
                "utterance": "Hello world",
                "expect_response": false,
                "meta": { "skill": Self::ID },
            }),
        )])
    }
}

/// Last-resort answer for utterances no other skill claimed.
#[derive(Debug, Default)]
pub struct FallbackUnknownSkill;

impl FallbackUnknownSkill {
    pub const ID: &'static str = "skill-ovos-fallback-unknown.openvoiceos";

    pub fn new() -> Self {
        Self
    }
}

impl Skill for FallbackUnknownSkill {
    fn skill_id(&self) -> &str {
        Self::ID
    }

    fn subscriptions(&self) -> &[&'static str] {
        &[MessageTypes::SKILLS_FALLBACK]
    }

    async fn handle(&self, message: &BusMessage) -> Result<Vec<BusMessage>, SkillError> {
        Ok(vec![message.reply(
            MessageTypes::SPEAK,
            json!({
                "utterance": "I don't know how to answer that",
                "expect_response": false,
                "meta": { "skill": Self::ID },
            }),
        )])
    }
}

/// Utterance texts from either `{"utterances": [...]}` or `{"utterance": "..."}`.
pub fn utterances(message: &BusMessage) -> Vec<String> {
    if let Some(list) = message.data.get("utterances").and_then(|v| v.as_array()) {
        return list
            .iter()
            .filter_map(|u| u.as_str().map(str::to_string))
            .collect();
    }
    message
        .data_str("utterance")
        .map(|u| vec![u.to_string()])
        .unwrap_or_default()
}
