//! WorkerPool: one shared worker per access key, with ref-counting.
//!
//! Multiple connections presenting the same access key share a worker. The
//! worker is created when the first connection acquires the key and stopped
//! when the last one releases it.
//!
//! The registry lock is only held to claim or update a slot. Booting happens
//! outside it: the first acquirer initializes the slot's `OnceCell`, and any
//! concurrent acquirer of the same key waits on that cell instead of building
//! a second worker. A key whose previous worker is still stopping waits for
//! that worker to reach `Stopped` before a new one is built.
//!
//! Once `shutdown_all` has run the pool is closing: a worker that finishes
//! booting after that point is stopped before `acquire` returns it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use multimind_skills::SkillCatalog;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::worker::{Worker, WorkerHandle, WorkerState};

/// Registry slot: the (possibly still booting) worker and its refcount.
struct PoolEntry {
    worker: Arc<OnceCell<WorkerHandle>>,
    refcount: usize,
}

#[derive(Default)]
struct PoolState {
    live: HashMap<String, PoolEntry>,
    /// Workers released to zero whose `stop()` has not finished yet
    retiring: HashMap<String, WorkerHandle>,
    /// Set by `shutdown_all`; never cleared
    closing: bool,
}

pub struct WorkerPool {
    state: Arc<Mutex<PoolState>>,
    catalog: Arc<SkillCatalog>,
    bus_capacity: usize,
    created: AtomicU64,
}

impl WorkerPool {
    pub fn new(catalog: Arc<SkillCatalog>, bus_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState::default())),
            catalog,
            bus_capacity,
            created: AtomicU64::new(0),
        }
    }

    /// Take a reference on the worker for `access_key`, creating and starting
    /// it if this is the first reference.
    ///
    /// `capabilities` only matters when a worker is created; a live worker
    /// keeps the skill set it was built with.
    pub async fn acquire(&self, access_key: &str, capabilities: &[String]) -> WorkerHandle {
        let (cell, previous) = {
            let mut state = self.state.lock();
            let previous = state.retiring.get(access_key).cloned();
            let entry = state
                .live
                .entry(access_key.to_string())
                .or_insert_with(|| PoolEntry {
                    worker: Arc::new(OnceCell::new()),
                    refcount: 0,
                });
            entry.refcount += 1;
            debug!(access_key, refcount = entry.refcount, "Worker reference acquired");
            (entry.worker.clone(), previous)
        };

        let worker = cell
            .get_or_init(|| async {
                if let Some(previous) = previous {
                    debug!(access_key, "Waiting for previous worker to stop");
                    previous.wait_for(WorkerState::Stopped).await;
                }
                info!(access_key, "Creating new worker");
                let worker = Arc::new(Worker::new(
                    access_key,
                    capabilities.to_vec(),
                    self.catalog.clone(),
                    self.bus_capacity,
                ));
                self.created.fetch_add(1, Ordering::Relaxed);
                worker.start().await;
                worker
            })
            .await
            .clone();

        let closing = self.state.lock().closing;
        if closing {
            debug!(access_key, "Pool is closing, stopping freshly acquired worker");
            worker.stop().await;
        }
        worker
    }

    /// Drop a reference. The last release removes the entry and stops the
    /// worker in the background; the caller never waits for teardown.
    pub fn release(&self, access_key: &str) {
        let retired = {
            let mut state = self.state.lock();
            let closing = state.closing;
            let Some(entry) = state.live.get_mut(access_key) else {
                if closing {
                    debug!(access_key, "Release after shutdown, worker already stopped");
                } else {
                    warn!(access_key, "Refcount anomaly: release without a live worker, ignoring");
                }
                return;
            };
            if entry.refcount == 0 {
                warn!(access_key, "Refcount anomaly: release below zero, ignoring");
                return;
            }

            entry.refcount -= 1;
            if entry.refcount > 0 {
                debug!(access_key, refcount = entry.refcount, "Worker reference released");
                return;
            }

            let worker = state
                .live
                .remove(access_key)
                .and_then(|entry| entry.worker.get().cloned());
            if let Some(worker) = &worker {
                state.retiring.insert(access_key.to_string(), worker.clone());
            }
            worker
        };

        let Some(worker) = retired else {
            return;
        };

        info!(access_key, "Stopping worker for access key (no connections left)");
        let state = self.state.clone();
        let access_key = access_key.to_string();
        tokio::spawn(async move {
            worker.stop().await;
            let mut state = state.lock();
            if state
                .retiring
                .get(&access_key)
                .is_some_and(|w| Arc::ptr_eq(w, &worker))
            {
                state.retiring.remove(&access_key);
            }
        });
    }

    /// Non-mutating lookup of a live, fully started worker.
    pub fn get(&self, access_key: &str) -> Option<WorkerHandle> {
        self.state
            .lock()
            .live
            .get(access_key)
            .and_then(|entry| entry.worker.get().cloned())
    }

    /// Current reference count for `access_key` (0 when absent).
    pub fn refcount(&self, access_key: &str) -> usize {
        self.state
            .lock()
            .live
            .get(access_key)
            .map_or(0, |entry| entry.refcount)
    }

    /// Number of keys with a live entry.
    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with a live entry, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().live.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether `shutdown_all` has been called.
    pub fn is_closing(&self) -> bool {
        self.state.lock().closing
    }

    /// Workers constructed since the pool was created.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Stop every worker, live or retiring, and wait for them (server shutdown).
    ///
    /// Workers still booting are not in the drained set; their `acquire`
    /// observes the closing flag and stops them itself.
    pub async fn shutdown_all(&self) {
        let workers: Vec<WorkerHandle> = {
            let mut state = self.state.lock();
            state.closing = true;
            let live = state
                .live
                .drain()
                .filter_map(|(_, entry)| entry.worker.get().cloned());
            let mut workers: Vec<WorkerHandle> = live.collect();
            workers.extend(state.retiring.drain().map(|(_, w)| w));
            workers
        };

        for worker in workers {
            info!(access_key = worker.access_key(), "Shutting down worker");
            worker.stop().await;
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("keys", &self.keys())
            .field("created", &self.created_count())
            .finish()
    }
}
