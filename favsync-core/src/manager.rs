use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, DEFAULT_MUTATION_TIMEOUT_SECS};
use crate::error::FavoritesError;
use crate::listeners::{ListenerRegistry, Subscription};
use crate::remote::{FavoritesApi, HttpFavoritesApi};
use crate::storage::{FileSnapshotStore, SnapshotStore};
use crate::toggle::{PendingToggles, ToggleOutcome, Transition};

struct State {
    favorites: HashSet<String>,
    toggles: PendingToggles,
    // bumped by force_reinitialize; work started under an older value is stale
    generation: u64,
    initialized: bool,
    init: Arc<OnceCell<()>>,
    last_synced_at: Option<DateTime<Utc>>,
}

struct Shared {
    api: Arc<dyn FavoritesApi>,
    store: Arc<dyn SnapshotStore>,
    listeners: ListenerRegistry<bool>,
    state: Mutex<State>,
    // one snapshot write at a time, always of the newest set
    writer: AsyncMutex<()>,
    mutation_timeout: Duration,
}

/// Diagnostic view of the manager, printed by `favsync inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugSnapshot {
    pub initialized: bool,
    pub generation: u64,
    pub favorites: Vec<String>,
    pub pending: Vec<String>,
    pub listeners: BTreeMap<String, usize>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Single source of truth for "is product X a favorite".
///
/// Holds the in-memory set, reconciles it with the remote API and the local
/// snapshot, and notifies per-product subscribers. Clones share state; build
/// one per process (or per signed-in session) and hand it around.
#[derive(Clone)]
pub struct FavoritesManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FavoritesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesManager")
            .field("state", &self.debug_snapshot())
            .finish()
    }
}

impl FavoritesManager {
    pub fn new(api: Arc<dyn FavoritesApi>, store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_mutation_timeout(api, store, Duration::from_secs(DEFAULT_MUTATION_TIMEOUT_SECS))
    }

    /// `timeout` bounds each add/remove call; an expired call counts as a failure.
    pub fn with_mutation_timeout(
        api: Arc<dyn FavoritesApi>,
        store: Arc<dyn SnapshotStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                store,
                listeners: ListenerRegistry::new(),
                state: Mutex::new(State {
                    favorites: HashSet::new(),
                    toggles: PendingToggles::default(),
                    generation: 0,
                    initialized: false,
                    init: Arc::new(OnceCell::new()),
                    last_synced_at: None,
                }),
                writer: AsyncMutex::new(()),
                mutation_timeout: timeout,
            }),
        }
    }

    /// HTTP API plus a snapshot file under the configured storage dir.
    pub fn from_config(config: &SyncConfig) -> Result<Self, FavoritesError> {
        let api = HttpFavoritesApi::from_config(config)?;
        let store = FileSnapshotStore::new(config.resolved_storage_dir(), &config.storage_key);
        Ok(Self::with_mutation_timeout(
            Arc::new(api),
            Arc::new(store),
            config.mutation_timeout(),
        ))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the snapshot, then the server list. Concurrent callers share one
    /// run; later calls return immediately. Never fails: errors are logged and
    /// whatever was loaded becomes the working set.
    pub async fn initialize(&self) {
        let (generation, cell) = {
            let state = self.state();
            (state.generation, Arc::clone(&state.init))
        };
        cell.get_or_init(|| self.run_initialize(generation)).await;
    }

    async fn run_initialize(&self, generation: u64) {
        let local = match self.shared.store.load().await {
            Ok(Some(ids)) => ids,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read favorites snapshot, starting empty");
                Vec::new()
            }
        };
        debug!(count = local.len(), "hydrated favorites from snapshot");
        self.replace_all(generation, local);

        match self.shared.api.list().await {
            Ok(ids) => {
                info!(count = ids.len(), "loaded favorites from server");
                if self.replace_all(generation, ids).is_some() {
                    self.state().last_synced_at = Some(Utc::now());
                    self.persist().await;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch favorites, keeping local snapshot");
            }
        }

        let mut state = self.state();
        if state.generation == generation {
            state.initialized = true;
        }
    }

    /// Swaps the whole set and notifies ids whose membership changed.
    /// Returns the new snapshot, or `None` if `generation` is stale.
    fn replace_all(&self, generation: u64, ids: Vec<String>) -> Option<Vec<String>> {
        let next: HashSet<String> = ids.into_iter().collect();
        let (changed, snapshot) = {
            let mut state = self.state();
            if state.generation != generation {
                debug!(generation, current = state.generation, "discarding stale favorites load");
                return None;
            }
            let mut changed: Vec<(String, bool)> = state
                .favorites
                .symmetric_difference(&next)
                .map(|id| (id.clone(), next.contains(id)))
                .collect();
            changed.sort();
            state.favorites = next;
            (changed, sorted(&state.favorites))
        };
        for (id, value) in &changed {
            self.shared.listeners.notify(id, value);
        }
        Some(snapshot)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.state().favorites.contains(id)
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Sorted copy of the current set.
    pub fn favorites(&self) -> Vec<String> {
        sorted(&self.state().favorites)
    }

    /// Registers `listener` for one product. It receives the new membership
    /// each time that product's state changes. The registry is independent of
    /// the favorites set and survives reinitialization.
    pub fn subscribe<F>(&self, id: &str, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .subscribe(id, move |_, value: &bool| listener(*value))
    }

    /// Optimistically flips `id`, then confirms with the server.
    ///
    /// A second call while one is in flight for the same id returns
    /// [`ToggleOutcome::AlreadyPending`] without touching the network. If the
    /// server call fails or times out the flip is reverted, subscribers are
    /// told, and the error is returned. The snapshot is written either way.
    pub async fn toggle_favorite(&self, id: &str) -> Result<ToggleOutcome, FavoritesError> {
        let (generation, optimistic) = {
            let mut state = self.state();
            let current = state.favorites.contains(id);
            let Some(next) = state.toggles.begin(id, current) else {
                debug!(id, "toggle already in flight, ignoring");
                return Ok(ToggleOutcome::AlreadyPending);
            };
            set_membership(&mut state.favorites, id, next);
            (state.generation, next)
        };
        let mut guard = PendingGuard {
            manager: self,
            id,
            generation,
            armed: true,
        };
        self.shared.listeners.notify(id, &optimistic);

        let result = self.send_mutation(id, optimistic).await;
        if let Err(e) = &result {
            warn!(id, error = %e, "favorite update failed, reverting");
        }
        guard.armed = false;

        match self.settle(id, generation, result.is_ok()) {
            Some(_) => self.persist().await,
            None => info!(id, generation, "favorites were reinitialized during toggle, dropping its local effects"),
        }

        result.map(|()| ToggleOutcome::Applied(optimistic))
    }

    async fn send_mutation(&self, id: &str, add: bool) -> Result<(), FavoritesError> {
        let call = async {
            if add {
                self.shared.api.add(id).await
            } else {
                self.shared.api.remove(id).await
            }
        };
        let timeout = self.shared.mutation_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FavoritesError::Timeout(timeout)),
        }
    }

    /// `Pending -> Committed | RevertedTo`. `None` when the toggle belongs to
    /// an older generation.
    ///
    /// A server load may have replaced the set while the call was in flight,
    /// so a commit is announced whenever it changes the current membership.
    /// A revert is always announced.
    fn settle(&self, id: &str, generation: u64, succeeded: bool) -> Option<Transition> {
        let (transition, before) = {
            let mut state = self.state();
            if state.generation != generation {
                return None;
            }
            let transition = state.toggles.finish(id, succeeded)?;
            let before = state.favorites.contains(id);
            set_membership(&mut state.favorites, id, transition.value());
            (transition, before)
        };
        match transition {
            Transition::RevertedTo(value) => {
                self.shared.listeners.notify(id, &value);
            }
            Transition::Committed(value) if value != before => {
                self.shared.listeners.notify(id, &value);
            }
            Transition::Committed(_) => {}
        }
        Some(transition)
    }

    /// Clears the set and in-flight bookkeeping, then initializes again.
    /// Use after the signed-in identity changes. Subscribers stay registered
    /// and hear about every id whose membership changes.
    pub async fn force_reinitialize(&self) {
        let cleared = {
            let mut state = self.state();
            state.generation += 1;
            state.initialized = false;
            state.toggles.clear();
            state.init = Arc::new(OnceCell::new());
            state.last_synced_at = None;
            let mut cleared: Vec<String> = state.favorites.drain().collect();
            cleared.sort();
            cleared
        };
        info!(cleared = cleared.len(), "reinitializing favorites");
        for id in &cleared {
            self.shared.listeners.notify(id, &false);
        }
        self.initialize().await;
    }

    /// Signs the API in as a different user (or out, with `None`) and reloads
    /// that user's favorites.
    pub async fn switch_identity(&self, token: Option<String>) {
        info!(signed_in = token.is_some(), "switching favorites identity");
        self.shared.api.set_token(token);
        self.force_reinitialize().await;
    }

    /// Re-fetches the server list into the current set. Unlike
    /// [`initialize`](Self::initialize) the fetch error is returned.
    pub async fn refresh(&self) -> Result<Vec<String>, FavoritesError> {
        let generation = self.state().generation;
        let ids = self.shared.api.list().await?;
        match self.replace_all(generation, ids) {
            Some(snapshot) => {
                self.state().last_synced_at = Some(Utc::now());
                self.persist().await;
                Ok(snapshot)
            }
            None => Ok(self.favorites()),
        }
    }

    pub fn debug_snapshot(&self) -> DebugSnapshot {
        let listeners = self.shared.listeners.counts();
        let state = self.state();
        DebugSnapshot {
            initialized: state.initialized,
            generation: state.generation,
            favorites: sorted(&state.favorites),
            pending: state.toggles.ids(),
            listeners,
            last_synced_at: state.last_synced_at,
        }
    }

    /// Writes the set as it is once the writer lock is held, so overlapping
    /// callers can never land an older snapshot after a newer one.
    async fn persist(&self) {
        let _writer = self.shared.writer.lock().await;
        let snapshot = self.favorites();
        if let Err(e) = self.shared.store.save(&snapshot).await {
            warn!(error = %e, "failed to persist favorites snapshot");
        }
    }
}

/// Releases the pending flag if a toggle future is dropped mid-flight, treating
/// the abandoned call as failed.
struct PendingGuard<'a> {
    manager: &'a FavoritesManager,
    id: &'a str,
    generation: u64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(id = self.id, "toggle abandoned before completion, reverting");
            self.manager.settle(self.id, self.generation, false);
        }
    }
}

fn set_membership(set: &mut HashSet<String>, id: &str, member: bool) {
    if member {
        set.insert(id.to_string());
    } else {
        set.remove(id);
    }
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut ids: Vec<String> = set.iter().cloned().collect();
    ids.sort();
    ids
}
