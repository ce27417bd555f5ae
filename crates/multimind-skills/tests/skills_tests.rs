//! Skill runtime tests: capability registry persistence, the worker bus,
//! the catalog and the built-in skills.

#[cfg(test)]
mod tests {
    use multimind_protocol::{BusMessage, MessageTypes, SessionContext};
    use multimind_skills::builtin::{FallbackUnknownSkill, HelloWorldSkill, utterances};
    use multimind_skills::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> CapabilityRegistry {
        CapabilityRegistry::open(dir.path().join("multimind.json")).unwrap()
    }

    fn defaults() -> Vec<String> {
        DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // CapabilityRegistry
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        assert!(reg.keys().is_empty());
        assert_eq!(reg.defaults(), defaults().as_slice());
    }

    #[test]
    fn empty_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("multimind.json"), "  \n").unwrap();
        assert!(registry(&dir).keys().is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("multimind.json"), "{not json").unwrap();
        let err = CapabilityRegistry::open(dir.path().join("multimind.json")).unwrap_err();
        assert!(matches!(err, RegistryError::Serialization { .. }));
    }

    #[test]
    fn get_seeds_defaults_once_and_persists() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        assert!(!reg.contains("abc123"));

        assert_eq!(reg.get("abc123").unwrap(), defaults());
        assert!(reg.contains("abc123"));
        assert_eq!(reg.get("abc123").unwrap(), defaults());
        assert_eq!(reg.keys(), vec!["abc123".to_string()]);

        let reopened = registry(&dir);
        assert_eq!(reopened.list("abc123").unwrap(), defaults());
    }

    #[test]
    fn custom_defaults_are_deduplicated() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir).with_defaults(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(reg.get("k").unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn add_requires_existing_entry() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let err = reg.add("k", "skill-x").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownKey(ref key) if key == "k"));
        assert!(!reg.contains("k"));
        assert!(!dir.path().join("multimind.json").exists());
    }

    #[test]
    fn add_appends_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.get("k").unwrap();

        let skills = reg.add("k", "skill-x").unwrap();
        assert_eq!(skills.last().map(String::as_str), Some("skill-x"));
        assert_eq!(skills.len(), defaults().len() + 1);

        let again = reg.add("k", "skill-x").unwrap();
        assert_eq!(again, skills);
    }

    #[test]
    fn grant_seeds_then_appends() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let skills = reg.grant("k", "skill-x").unwrap();
        let mut expected = defaults();
        expected.push("skill-x".into());
        assert_eq!(skills, expected);
        assert_eq!(registry(&dir).list("k").unwrap(), expected);
    }

    #[test]
    fn grant_of_default_skill_still_persists_seed() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let skills = reg.grant("k", DEFAULT_SKILLS[0]).unwrap();
        assert_eq!(skills, defaults());
        assert!(registry(&dir).contains("k"));
    }

    #[test]
    fn remove_errors_leave_state_untouched() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let err = reg.remove("nobody", "skill-x").unwrap_err();
        assert!(matches!(err, RegistryError::KeyNotFound(_)));
        assert!(err.is_not_found());
        assert!(!reg.contains("nobody"));

        reg.get("k").unwrap();
        let err = reg.remove("k", "skill-x").unwrap_err();
        assert!(matches!(err, RegistryError::CapabilityNotFound { ref skill, .. } if skill == "skill-x"));
        assert_eq!(reg.list("k").unwrap(), defaults());
    }

    #[test]
    fn remove_persists() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.get("k").unwrap();

        let skills = reg.remove("k", DEFAULT_SKILLS[0]).unwrap();
        assert_eq!(skills, vec![DEFAULT_SKILLS[1].to_string()]);
        assert_eq!(registry(&dir).list("k").unwrap(), skills);
    }

    #[test]
    fn remove_last_skill_keeps_empty_entry() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir).with_defaults(vec!["only".into()]);
        reg.get("k").unwrap();

        assert!(reg.remove("k", "only").unwrap().is_empty());
        assert!(reg.contains("k"));
        assert!(reg.get("k").unwrap().is_empty());
    }

    #[test]
    fn list_never_seeds() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let err = reg.list("k").unwrap_err();
        assert!(matches!(err, RegistryError::KeyNotFound(_)));
        assert!(!reg.contains("k"));
    }

    #[test]
    fn failed_flush_keeps_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let reg = CapabilityRegistry::open(dir.path().join("sub").join("multimind.json")).unwrap();
        // A regular file where the parent directory should go
        std::fs::write(dir.path().join("sub"), "").unwrap();

        let err = reg.get("k").unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
        assert!(!reg.contains("k"));
        assert!(matches!(reg.grant("k", "x"), Err(RegistryError::Io { .. })));
        assert!(reg.keys().is_empty());
    }

    #[test]
    fn no_temp_file_left_after_flush() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.grant("k", "skill-x").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["multimind.json".to_string()]);
    }

    // ─────────────────────────────────────────────────────────────────────
    // MessageBus
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn bus_broadcasts_in_order() {
        let bus = MessageBus::new(16);
        assert_eq!(bus.publish(BusMessage::new("lost", json!({}))), 0);

        let mut a = bus.subscribe().unwrap();
        let mut b = bus.subscribe().unwrap();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.publish(BusMessage::new("one", json!({}))), 2);
        assert_eq!(bus.publish(BusMessage::new("two", json!({}))), 2);

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().msg_type, "one");
            assert_eq!(rx.recv().await.unwrap().msg_type, "two");
        }
    }

    #[tokio::test]
    async fn closed_bus_drains_then_ends() {
        let bus = MessageBus::new(16);
        let mut rx = bus.subscribe().unwrap();
        bus.publish(BusMessage::new("last", json!({})));
        bus.close();

        assert!(bus.is_closed());
        assert!(bus.subscribe().is_none());
        assert_eq!(bus.publish(BusMessage::new("late", json!({}))), 0);

        assert_eq!(rx.recv().await.unwrap().msg_type, "last");
        assert!(rx.recv().await.is_err());
    }

    // ─────────────────────────────────────────────────────────────────────
    // SkillCatalog
    // ─────────────────────────────────────────────────────────────────────

    struct Echo;

    impl Skill for Echo {
        fn skill_id(&self) -> &str {
            "echo"
        }

        fn subscriptions(&self) -> &[&'static str] {
            &["ping"]
        }

        async fn handle(&self, message: &BusMessage) -> Result<Vec<BusMessage>, SkillError> {
            Ok(vec![message.reply("pong", message.data.clone())])
        }
    }

    #[test]
    fn builtin_catalog_covers_defaults() {
        let catalog = SkillCatalog::with_builtin();
        for id in DEFAULT_SKILLS {
            assert!(catalog.contains(id), "missing {id}");
        }
        assert!(catalog.instantiate("skill-not-installed").is_none());
    }

    #[tokio::test]
    async fn catalog_builds_fresh_instances() {
        let mut catalog = SkillCatalog::new();
        catalog.register("echo", || Echo);
        assert_eq!(catalog.ids(), vec!["echo".to_string()]);

        let a = catalog.instantiate("echo").unwrap();
        let b = catalog.instantiate("echo").unwrap();
        assert!(!std::sync::Arc::ptr_eq(&a, &b));

        assert_eq!(a.skill_id_dyn(), "echo");
        assert_eq!(a.subscriptions_dyn(), &["ping"]);
        a.load_dyn().await.unwrap();
        let replies = a
            .handle_dyn(&BusMessage::new("ping", json!({"n": 1})))
            .await
            .unwrap();
        assert_eq!(replies[0].msg_type, "pong");
        assert_eq!(replies[0].data["n"], 1);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Built-in skills
    // ─────────────────────────────────────────────────────────────────────

    fn utterance(text: &str) -> BusMessage {
        BusMessage::new(MessageTypes::UTTERANCE, json!({ "utterances": [text] })).with_context(
            SessionContext {
                source: Some("client-1".into()),
                destination: Some("skills".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn utterances_accepts_both_shapes() {
        assert_eq!(utterances(&utterance("a")), vec!["a".to_string()]);
        let single = BusMessage::new(MessageTypes::UTTERANCE, json!({ "utterance": "b" }));
        assert_eq!(utterances(&single), vec!["b".to_string()]);
        assert!(utterances(&BusMessage::new("x", json!({}))).is_empty());
    }

    #[tokio::test]
    async fn hello_world_answers_greetings() {
        let skill = HelloWorldSkill::new();
        let replies = skill.handle(&utterance("Hello there")).await.unwrap();
        assert_eq!(replies.len(), 1);

        let reply = &replies[0];
        assert_eq!(reply.msg_type, MessageTypes::SPEAK);
        assert_eq!(reply.data_str("utterance"), Some("Hello world"));
        assert_eq!(reply.context.source.as_deref(), Some("skills"));
        assert_eq!(reply.context.destination.as_deref(), Some("client-1"));
    }

    #[tokio::test]
    async fn hello_world_ignores_other_utterances() {
        let skill = HelloWorldSkill::new();
        assert!(skill.handle(&utterance("what time is it")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fallback_always_answers() {
        let skill = FallbackUnknownSkill::new();
        let request = utterance("what time is it").forward(MessageTypes::SKILLS_FALLBACK);
        let replies = skill.handle(&request).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].data_str("utterance"),
            Some("I don't know how to answer that")
        );
    }
}
