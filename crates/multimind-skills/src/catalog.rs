//! Installed skills, keyed by skill id.
//!
//! The catalog answers "can this skill be loaded at all"; the capability
//! registry answers "may this access key load it". A worker instantiates
//! the intersection.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::builtin::{FallbackUnknownSkill, HelloWorldSkill};
use crate::{Skill, SkillDyn};

type SkillFactory = Arc<dyn Fn() -> Arc<dyn SkillDyn> + Send + Sync>;

/// Registry of skill factories. Every worker gets fresh skill instances.
#[derive(Clone, Default)]
pub struct SkillCatalog {
    factories: BTreeMap<String, SkillFactory>,
}

impl SkillCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the skills shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(HelloWorldSkill::ID, HelloWorldSkill::new);
        catalog.register(FallbackUnknownSkill::ID, FallbackUnknownSkill::new);
        catalog
    }

    /// Install a skill. Re-registering an id replaces the earlier factory.
    pub fn register<S, F>(&mut self, skill_id: impl Into<String>, factory: F)
    where
        S: Skill + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let factory: SkillFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn SkillDyn>);
        self.factories.insert(skill_id.into(), factory);
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.factories.contains_key(skill_id)
    }

    /// Installed skill ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Build a fresh instance, or `None` when the skill is not installed.
    pub fn instantiate(&self, skill_id: &str) -> Option<Arc<dyn SkillDyn>> {
        self.factories.get(skill_id).map(|factory| factory())
    }
}

impl std::fmt::Debug for SkillCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
