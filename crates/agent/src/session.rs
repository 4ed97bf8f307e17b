//! In-memory session store.
//!
//! Each session owns an append-only list of [`Turn`]s behind its own
//! mutex, so sessions never contend with each other. At most one cycle
//! runs per session: [`SessionStore::acquire`] hands out a
//! [`SessionLease`] or fails with [`SessionError::Busy`].
//!
//! `reset` clears the history and bumps a generation counter. A lease
//! remembers the generation it started under and silently drops appends
//! once that generation is stale, so a cycle that races a reset cannot
//! write into the fresh history.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use mediaclaw_core::{HistorySnapshot, SessionError, SessionId, Turn};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_SESSIONS: usize = 1000;

#[derive(Debug)]
struct SessionState {
    generation: u64,
    turns: Vec<Turn>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SessionSlot {
    state: Mutex<SessionState>,
    busy: AtomicBool,
    last_used: AtomicU64,
}

impl SessionSlot {
    fn new(tick: u64) -> Self {
        Self {
            state: Mutex::new(SessionState {
                generation: 0,
                turns: Vec::new(),
                updated_at: Utc::now(),
            }),
            busy: AtomicBool::new(false),
            last_used: AtomicU64::new(tick),
        }
    }
}

pub struct SessionStore {
    slots: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
    max_sessions: usize,
    clock: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    async fn slot(&self, id: &SessionId) -> Arc<SessionSlot> {
        let tick = self.tick();
        if let Some(slot) = self.slots.read().await.get(id) {
            slot.last_used.store(tick, Ordering::Relaxed);
            return slot.clone();
        }

        let mut slots = self.slots.write().await;
        self.slot_locked(&mut slots, id, tick)
    }

    /// Find or insert a slot while the caller holds the map write lock.
    fn slot_locked(&self, slots: &mut HashMap<SessionId, Arc<SessionSlot>>, id: &SessionId, tick: u64) -> Arc<SessionSlot> {
        if let Some(slot) = slots.get(id) {
            slot.last_used.store(tick, Ordering::Relaxed);
            return slot.clone();
        }
        if slots.len() >= self.max_sessions {
            evict_idle(slots);
        }
        debug!(session_id = %id, "Creating session");
        let slot = Arc::new(SessionSlot::new(tick));
        slots.insert(id.clone(), slot.clone());
        slot
    }

    /// The session's current history, creating an empty session if needed.
    pub async fn get_or_create(&self, id: &SessionId) -> HistorySnapshot {
        let slot = self.slot(id).await;
        let state = slot.state.lock().await;
        snapshot(id, &state)
    }

    /// Append outside of any cycle, to whatever generation is current.
    pub async fn append(&self, id: &SessionId, turn: Turn) {
        let slot = self.slot(id).await;
        let mut state = slot.state.lock().await;
        state.turns.push(turn);
        state.updated_at = Utc::now();
    }

    /// Clear the history. Idempotent, and creates the session if absent.
    pub async fn reset(&self, id: &SessionId) {
        let slot = self.slot(id).await;
        let mut state = slot.state.lock().await;
        state.turns.clear();
        state.generation += 1;
        state.updated_at = Utc::now();
        info!(session_id = %id, generation = state.generation, "Session reset");
    }

    /// Typed history for inspection. Unknown ids read as empty and are
    /// not created.
    pub async fn snapshot(&self, id: &SessionId) -> HistorySnapshot {
        let slot = self.slots.read().await.get(id).cloned();
        match slot {
            Some(slot) => snapshot(id, &*slot.state.lock().await),
            None => HistorySnapshot {
                session_id: id.clone(),
                generation: 0,
                turns: Vec::new(),
                updated_at: Utc::now(),
            },
        }
    }

    /// Claim the session for one cycle.
    ///
    /// The slot is marked busy under the map lock, so eviction can never
    /// remove a session between lookup and claim.
    pub async fn acquire(&self, id: &SessionId) -> Result<SessionLease, SessionError> {
        let tick = self.tick();
        let slot = {
            let mut slots = self.slots.write().await;
            let slot = self.slot_locked(&mut slots, id, tick);
            if slot
                .busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                warn!(session_id = %id, "Rejecting request, session is busy");
                return Err(SessionError::Busy(id.to_string()));
            }
            slot
        };

        // Built before the next await so a cancelled caller still releases.
        let mut lease = SessionLease {
            session_id: id.clone(),
            slot,
            generation: 0,
        };
        lease.generation = lease.slot.state.lock().await.generation;
        Ok(lease)
    }

    pub async fn is_busy(&self, id: &SessionId) -> bool {
        self.slots
            .read()
            .await
            .get(id)
            .is_some_and(|s| s.busy.load(Ordering::Acquire))
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn snapshot(id: &SessionId, state: &SessionState) -> HistorySnapshot {
    HistorySnapshot {
        session_id: id.clone(),
        generation: state.generation,
        turns: state.turns.clone(),
        updated_at: state.updated_at,
    }
}

/// Drop the least recently used session that has no cycle running.
fn evict_idle(slots: &mut HashMap<SessionId, Arc<SessionSlot>>) {
    let victim = slots
        .iter()
        .filter(|(_, s)| !s.busy.load(Ordering::Acquire))
        .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
        .map(|(id, _)| id.clone());

    match victim {
        Some(id) => {
            debug!(session_id = %id, "Evicting idle session");
            slots.remove(&id);
        }
        None => warn!(sessions = slots.len(), "Session limit reached and every session is busy"),
    }
}

/// Exclusive right to run one cycle on a session. Released on drop.
#[derive(Debug)]
pub struct SessionLease {
    session_id: SessionId,
    slot: Arc<SessionSlot>,
    generation: u64,
}

impl SessionLease {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.slot.state.lock().await.turns.clone()
    }

    /// Append a turn unless the session was reset since the lease began.
    /// Returns whether the turn was stored.
    pub async fn append(&self, turn: Turn) -> bool {
        let mut state = self.slot.state.lock().await;
        if state.generation != self.generation {
            debug!(
                session_id = %self.session_id,
                lease_generation = self.generation,
                current_generation = state.generation,
                turn = turn.kind(),
                "Dropping append from a cycle that predates a reset"
            );
            return false;
        }
        state.turns.push(turn);
        state.updated_at = Utc::now();
        true
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}
