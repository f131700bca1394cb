//! Shared cycle state.
//!
//! The bundle is mutated by six concurrent branches. Every mutation presents
//! the token of the cycle it belongs to; mutations for a superseded cycle are
//! dropped, which makes abandoned in-flight branches harmless. Merges apply
//! to a clone that replaces the bundle wholesale, so two branches resolving
//! in the same tick cannot lose each other's updates.

use crate::types::{LoadingStates, StudyBundle};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Identifies one generation cycle. Merges presenting a stale token are
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleToken(Uuid);

impl CycleToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct ActiveCycle {
    token: Option<CycleToken>,
    bundle: StudyBundle,
    loading: LoadingStates,
    /// Supervisor task of the current cycle, aborted when a new cycle begins.
    supervisor: Option<JoinHandle<()>>,
}

pub(crate) struct SharedState {
    inner: Mutex<ActiveCycle>,
    bundle_tx: watch::Sender<StudyBundle>,
    loading_tx: watch::Sender<LoadingStates>,
    status_tx: watch::Sender<String>,
}

impl SharedState {
    pub fn new() -> Self {
        let (bundle_tx, _) = watch::channel(StudyBundle::default());
        let (loading_tx, _) = watch::channel(LoadingStates::idle());
        let (status_tx, _) = watch::channel(String::new());
        Self {
            inner: Mutex::new(ActiveCycle {
                token: None,
                bundle: StudyBundle::default(),
                loading: LoadingStates::idle(),
                supervisor: None,
            }),
            bundle_tx,
            loading_tx,
            status_tx,
        }
    }

    pub fn watch_bundle(&self) -> watch::Receiver<StudyBundle> {
        self.bundle_tx.subscribe()
    }

    pub fn watch_loading(&self) -> watch::Receiver<LoadingStates> {
        self.loading_tx.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    /// Current bundle snapshot.
    pub fn bundle(&self) -> StudyBundle {
        self.inner.lock().unwrap().bundle.clone()
    }

    pub fn loading(&self) -> LoadingStates {
        self.inner.lock().unwrap().loading
    }

    /// Start a new cycle: mint a token, reset the bundle, raise the verse
    /// flag, and abort the previous cycle's supervisor (its stragglers are
    /// token-rejected anyway; this just stops them burning network calls).
    pub fn begin_cycle(&self, status: &str) -> CycleToken {
        let token = CycleToken::new();
        let old_supervisor;
        {
            let mut cycle = self.inner.lock().unwrap();
            old_supervisor = cycle.supervisor.take();
            cycle.token = Some(token);
            cycle.bundle = StudyBundle::default();
            cycle.loading = LoadingStates {
                verse: true,
                ..LoadingStates::idle()
            };
            self.bundle_tx.send_replace(cycle.bundle.clone());
            self.loading_tx.send_replace(cycle.loading);
            self.status_tx.send_replace(status.to_string());
        }
        if let Some(handle) = old_supervisor {
            handle.abort();
        }
        token
    }

    /// Register the supervisor driving `token`'s branches. If the cycle has
    /// already been superseded the handle is aborted instead.
    pub fn attach_supervisor(&self, token: CycleToken, handle: JoinHandle<()>) {
        let stale = {
            let mut cycle = self.inner.lock().unwrap();
            if cycle.token == Some(token) {
                cycle.supervisor = Some(handle);
                None
            } else {
                Some(handle)
            }
        };
        if let Some(handle) = stale {
            handle.abort();
        }
    }

    pub fn is_current(&self, token: CycleToken) -> bool {
        self.inner.lock().unwrap().token == Some(token)
    }

    /// Apply a merge for `token`. The mutation runs on a clone that then
    /// replaces the bundle whole. Returns false (dropping the merge) if the
    /// cycle is no longer current.
    pub fn merge(&self, token: CycleToken, apply: impl FnOnce(&mut StudyBundle)) -> bool {
        let mut cycle = self.inner.lock().unwrap();
        if cycle.token != Some(token) {
            return false;
        }
        let mut next = cycle.bundle.clone();
        apply(&mut next);
        cycle.bundle = next;
        // Publish under the lock; the watch always holds the newest snapshot
        // and retains it for receivers that subscribe later.
        self.bundle_tx.send_replace(cycle.bundle.clone());
        true
    }

    /// Update loading flags for `token`; dropped if superseded.
    pub fn set_loading(&self, token: CycleToken, apply: impl FnOnce(&mut LoadingStates)) -> bool {
        let mut cycle = self.inner.lock().unwrap();
        if cycle.token != Some(token) {
            return false;
        }
        apply(&mut cycle.loading);
        self.loading_tx.send_replace(cycle.loading);
        true
    }

    /// Publish a user-facing status line for `token`.
    pub fn set_status(&self, token: CycleToken, status: &str) -> bool {
        let cycle = self.inner.lock().unwrap();
        if cycle.token != Some(token) {
            return false;
        }
        self.status_tx.send_replace(status.to_string());
        true
    }

    /// Replace the whole bundle (cache-hit adoption) and drop every flag.
    pub fn adopt_bundle(&self, token: CycleToken, bundle: StudyBundle) -> bool {
        let mut cycle = self.inner.lock().unwrap();
        if cycle.token != Some(token) {
            return false;
        }
        cycle.bundle = bundle;
        cycle.loading = LoadingStates::idle();
        self.bundle_tx.send_replace(cycle.bundle.clone());
        self.loading_tx.send_replace(LoadingStates::idle());
        self.status_tx.send_replace(String::new());
        true
    }

    /// Bundle snapshot, but only while `token` is still the active cycle.
    /// The cache write after the branch join goes through this so a
    /// superseded cycle can never persist.
    pub fn snapshot_if_current(&self, token: CycleToken) -> Option<StudyBundle> {
        let cycle = self.inner.lock().unwrap();
        if cycle.token == Some(token) {
            Some(cycle.bundle.clone())
        } else {
            None
        }
    }
}
