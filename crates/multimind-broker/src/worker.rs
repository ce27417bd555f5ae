//! Worker ("brain"): one skill runtime per access key.
//!
//! A worker owns a private message bus and the skills its access key may
//! load. Its lifecycle is a one-way state machine:
//!
//! `Created → Starting → Alive → Ready → Stopping → Stopped`
//!
//! Any non-terminal state may move to `Stopping`; `Stopped` is terminal.

use std::sync::Arc;

use multimind_protocol::{BusMessage, MessageTypes};
use multimind_skills::{MessageBus, SkillCatalog, SkillDyn};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared handle to a pooled worker.
pub type WorkerHandle = Arc<Worker>;

type LoadedSkills = Arc<RwLock<Vec<Arc<dyn SkillDyn>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    Created,
    Starting,
    Alive,
    Ready,
    Stopping,
    Stopped,
}

impl WorkerState {
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Starting, Alive)
                | (Alive, Ready)
                | (Created | Starting | Alive | Ready, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == WorkerState::Stopped
    }
}

pub struct Worker {
    access_key: String,
    capabilities: Vec<String>,
    bus: MessageBus,
    catalog: Arc<SkillCatalog>,
    state: watch::Sender<WorkerState>,
    skills: LoadedSkills,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl Worker {
    pub fn new(
        access_key: impl Into<String>,
        capabilities: Vec<String>,
        catalog: Arc<SkillCatalog>,
        bus_capacity: usize,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);
        Self {
            access_key: access_key.into(),
            capabilities,
            bus: MessageBus::new(bus_capacity),
            catalog,
            state,
            skills: Arc::new(RwLock::new(Vec::new())),
            dispatcher: Mutex::new(None),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Skill ids this worker was allowed at creation.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Skill ids that actually loaded, in load order.
    pub fn loaded_skills(&self) -> Vec<String> {
        self.skills
            .read()
            .iter()
            .map(|s| s.skill_id_dyn().to_string())
            .collect()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    /// Wait until the worker has reached (or moved past) `target`.
    pub async fn wait_for(&self, target: WorkerState) -> WorkerState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| *s >= target).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Wire the dispatcher, then load every allowed skill that is installed.
    ///
    /// Returns once the worker is `Ready`. Skills that are not installed or
    /// fail to load are skipped; they never keep the worker from `Ready`.
    pub async fn start(&self) {
        if !self.transition(WorkerState::Starting) {
            warn!(access_key = %self.access_key, state = ?self.state(), "Worker start ignored");
            return;
        }
        info!(access_key = %self.access_key, skills = ?self.capabilities, "Starting worker");

        let Some(rx) = self.bus.subscribe() else {
            warn!(access_key = %self.access_key, "Worker bus closed before start");
            return;
        };
        let handle = tokio::spawn(dispatch(
            self.access_key.clone(),
            self.bus.clone(),
            rx,
            self.skills.clone(),
        ));
        *self.dispatcher.lock() = Some(handle);

        if !self.transition(WorkerState::Alive) {
            return;
        }

        for skill_id in &self.capabilities {
            self.load_skill(skill_id).await;
        }

        if self.transition(WorkerState::Ready) {
            let loaded = self.loaded_skills();
            info!(access_key = %self.access_key, "Skills all loaded ({}/{})",
                loaded.len(), self.capabilities.len());
            self.bus.publish(BusMessage::new(
                MessageTypes::SKILLS_READY,
                json!({ "skills": loaded }),
            ));
        }
    }

    /// Shut down skills and close the bus. Safe to call repeatedly; a second
    /// caller waits for the first to finish.
    pub async fn stop(&self) {
        if !self.transition(WorkerState::Stopping) {
            self.wait_for(WorkerState::Stopped).await;
            return;
        }
        info!(access_key = %self.access_key, "Stopping worker");

        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }

        let skills = std::mem::take(&mut *self.skills.write());
        for skill in skills {
            skill.shutdown_dyn().await;
        }

        self.bus.close();
        self.transition(WorkerState::Stopped);
        debug!(access_key = %self.access_key, "Worker stopped");
    }

    // ── Internal ──────────────────────────────────────────────────────────

    async fn load_skill(&self, skill_id: &str) {
        let Some(skill) = self.catalog.instantiate(skill_id) else {
            warn!(access_key = %self.access_key, skill = skill_id, "Skill not installed, skipping");
            self.bus.publish(BusMessage::new(
                MessageTypes::SKILLS_LOAD_FAILED,
                json!({ "id": skill_id, "reason": "not installed" }),
            ));
            return;
        };

        match skill.load_dyn().await {
            Ok(()) => {
                debug!(access_key = %self.access_key, skill = skill_id, "Skill loaded");
                self.skills.write().push(skill);
                self.bus.publish(BusMessage::new(
                    MessageTypes::SKILLS_LOADED,
                    json!({ "id": skill_id }),
                ));
            }
            Err(e) => {
                warn!(access_key = %self.access_key, skill = skill_id, "{e}");
                self.bus.publish(BusMessage::new(
                    MessageTypes::SKILLS_LOAD_FAILED,
                    json!({ "id": skill_id, "reason": e.to_string() }),
                ));
            }
        }
    }

    fn transition(&self, next: WorkerState) -> bool {
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("access_key", &self.access_key)
            .field("state", &self.state())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Deliver each bus message to the skills subscribed to its type and publish
/// their replies. Utterances nobody answered are re-published as fallback
/// requests.
async fn dispatch(
    access_key: String,
    bus: MessageBus,
    mut rx: broadcast::Receiver<BusMessage>,
    skills: LoadedSkills,
) {
    loop {
        let message = match rx.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(access_key = %access_key, "Dispatcher lagged, {skipped} messages dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let targets: Vec<Arc<dyn SkillDyn>> = skills
            .read()
            .iter()
            .filter(|s| s.subscriptions_dyn().iter().any(|t| *t == message.msg_type))
            .cloned()
            .collect();

        let mut answered = false;
        for skill in targets {
            match skill.handle_dyn(&message).await {
                Ok(replies) => {
                    answered |= !replies.is_empty();
                    for reply in replies {
                        bus.publish(reply);
                    }
                }
                Err(e) => warn!(access_key = %access_key, "{e}"),
            }
        }

        if !answered && message.msg_type == MessageTypes::UTTERANCE {
            debug!(access_key = %access_key, "No skill matched utterance, falling back");
            bus.publish(message.forward(MessageTypes::SKILLS_FALLBACK));
        }
    }
}
