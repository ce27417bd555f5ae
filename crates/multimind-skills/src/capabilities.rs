//! Per-access-key skill allow-list, persisted as a JSON document.
//!
//! The file maps each access key to the ordered list of skill ids its worker
//! may load. Every mutation is written to a temporary file, synced and
//! renamed over the original before the in-memory copy is replaced, so a
//! failed flush leaves both the file and memory at the previous state.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::RegistryError;

/// Skills every access key starts with.
pub const DEFAULT_SKILLS: &[&str] = &[
    "skill-ovos-hello-world.openvoiceos",
    "skill-ovos-fallback-unknown.openvoiceos",
];

type Entries = BTreeMap<String, Vec<String>>;

pub struct CapabilityRegistry {
    path: PathBuf,
    defaults: Vec<String>,
    entries: Mutex<Entries>,
}

impl CapabilityRegistry {
    /// Open (or lazily create) the registry stored at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Entries::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                RegistryError::Serialization {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(source) => return Err(RegistryError::Io { path, source }),
        };
        debug!("Loaded skill registry from {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            defaults: DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect(),
            entries: Mutex::new(entries),
        })
    }

    /// `<data dir>/hivemind/multimind.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("hivemind")
            .join("multimind.json")
    }

    /// Replace the seed set handed to unseen keys.
    pub fn with_defaults(mut self, defaults: Vec<String>) -> Self {
        self.defaults = dedup(defaults);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Skills for `access_key`, seeding and persisting the defaults when the
    /// key has no entry yet.
    pub fn get(&self, access_key: &str) -> Result<Vec<String>, RegistryError> {
        let mut entries = self.entries.lock();
        if let Some(skills) = entries.get(access_key) {
            return Ok(skills.clone());
        }

        debug!(access_key, "Assigning default skills");
        let seeded = self.defaults.clone();
        self.commit(&mut entries, access_key, seeded.clone())?;
        Ok(seeded)
    }

    /// Whether `access_key` already has an entry.
    pub fn contains(&self, access_key: &str) -> bool {
        self.entries.lock().contains_key(access_key)
    }

    /// Allow `skill` for a key that already has an entry.
    pub fn add(&self, access_key: &str, skill: &str) -> Result<Vec<String>, RegistryError> {
        let mut entries = self.entries.lock();
        let current = entries
            .get(access_key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownKey(access_key.to_string()))?;
        self.append(&mut entries, access_key, current, skill)
    }

    /// Allow `skill`, seeding the defaults first if the key has no entry.
    pub fn grant(&self, access_key: &str, skill: &str) -> Result<Vec<String>, RegistryError> {
        let mut entries = self.entries.lock();
        let current = entries
            .get(access_key)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone());
        self.append(&mut entries, access_key, current, skill)
    }

    /// Disallow `skill`.
    pub fn remove(&self, access_key: &str, skill: &str) -> Result<Vec<String>, RegistryError> {
        let mut entries = self.entries.lock();
        let current = entries
            .get(access_key)
            .ok_or_else(|| RegistryError::KeyNotFound(access_key.to_string()))?;
        if !current.iter().any(|s| s == skill) {
            return Err(RegistryError::CapabilityNotFound {
                access_key: access_key.to_string(),
                skill: skill.to_string(),
            });
        }

        let updated: Vec<String> = current.iter().filter(|s| *s != skill).cloned().collect();
        self.commit(&mut entries, access_key, updated.clone())?;
        info!(access_key, skill, "Skill removed");
        Ok(updated)
    }

    /// Skills for a key that must already have an entry. Never seeds.
    pub fn list(&self, access_key: &str) -> Result<Vec<String>, RegistryError> {
        self.entries
            .lock()
            .get(access_key)
            .cloned()
            .ok_or_else(|| RegistryError::KeyNotFound(access_key.to_string()))
    }

    /// Every access key with an entry, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    // ── Internal ──────────────────────────────────────────────────────────

    fn append(
        &self,
        entries: &mut Entries,
        access_key: &str,
        mut current: Vec<String>,
        skill: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let known = entries.contains_key(access_key);
        if known && current.iter().any(|s| s == skill) {
            return Ok(current);
        }
        if !current.iter().any(|s| s == skill) {
            current.push(skill.to_string());
        }
        self.commit(entries, access_key, current.clone())?;
        info!(access_key, skill, "Skill allowed");
        Ok(current)
    }

    /// Flush a candidate state, then adopt it. The lock is held by the caller.
    fn commit(
        &self,
        entries: &mut Entries,
        access_key: &str,
        skills: Vec<String>,
    ) -> Result<(), RegistryError> {
        let mut candidate = entries.clone();
        candidate.insert(access_key.to_string(), skills);
        self.flush(&candidate)?;
        *entries = candidate;
        Ok(())
    }

    fn flush(&self, entries: &Entries) -> Result<(), RegistryError> {
        let io_err = |source| RegistryError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(entries).map_err(|source| {
            RegistryError::Serialization {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(json.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("path", &self.path)
            .field("keys", &self.entries.lock().len())
            .finish()
    }
}

fn dedup(skills: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills {
        if !out.contains(&skill) {
            out.push(skill);
        }
    }
    out
}
