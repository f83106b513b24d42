//! Per-room reconciliation state.
//!
//! The table is an ephemeral cache owned by the loop, rebuilt every tick
//! from the authoritative directory. Losing it only causes redundant
//! re-dispatch or re-evaluation; every externally visible action is
//! idempotent or tolerates "already applied".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    NotDispatched,
    Dispatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording {
        egress_id: String,
        filepath: String,
    },
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording { .. })
    }
}

/// State for one occupancy session of a room. Evicted (and thereby reset)
/// when the room disappears or is observed empty.
#[derive(Debug, Default)]
pub struct RoomState {
    pub dispatch: DispatchState,
    /// A clinician entered first; dispatch is skipped for this session.
    pub staff_first: bool,
    pub recording: RecordingState,
    pub injection_triggered: bool,
    pub last_seen: u64,
}

#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, RoomState>,
}

impl RoomTable {
    /// Take the state for a room out of the table (or a fresh default),
    /// stamped with the current tick. The caller puts it back unless the
    /// room's session ended.
    pub fn take(&mut self, room: &str, tick: u64) -> RoomState {
        let mut state = self.rooms.remove(room).unwrap_or_default();
        state.last_seen = tick;
        state
    }

    pub fn put(&mut self, room: &str, state: RoomState) {
        let _ = self.rooms.insert(room.to_string(), state);
    }

    pub fn get(&self, room: &str) -> Option<&RoomState> {
        self.rooms.get(room)
    }

    /// Evict entries for rooms that were not observed this tick.
    pub fn drain_unseen(&mut self, tick: u64) -> Vec<(String, RoomState)> {
        let gone: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, s)| s.last_seen < tick)
            .map(|(name, _)| name.clone())
            .collect();
        gone.into_iter()
            .filter_map(|name| self.rooms.remove(&name).map(|s| (name, s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Guard against scheduling duplicate delayed removals. Shared between the
/// loop and the background tasks that execute the removals; keys are
/// released when the task finishes, successful or not.
#[derive(Clone, Default)]
pub struct PendingRemovals {
    inner: Arc<Mutex<HashSet<(String, String)>>>,
}

impl PendingRemovals {
    /// Claim a (room, key) slot. Returns false if a task for it is already
    /// scheduled.
    pub async fn try_claim(&self, room: &str, key: &str) -> bool {
        self.inner
            .lock()
            .await
            .insert((room.to_string(), key.to_string()))
    }

    pub async fn release(&self, room: &str, key: &str) {
        let _ = self
            .inner
            .lock()
            .await
            .remove(&(room.to_string(), key.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_returns_fresh_state_for_unknown_room() {
        let mut table = RoomTable::default();
        let state = table.take("ClinicA", 1);
        assert_eq!(state.dispatch, DispatchState::NotDispatched);
        assert!(!state.injection_triggered);
        assert_eq!(state.last_seen, 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_put_round_trip_preserves_state() {
        let mut table = RoomTable::default();
        let mut state = table.take("ClinicA", 1);
        state.dispatch = DispatchState::Dispatched;
        state.injection_triggered = true;
        table.put("ClinicA", state);

        let state = table.take("ClinicA", 2);
        assert_eq!(state.dispatch, DispatchState::Dispatched);
        assert!(state.injection_triggered);
        assert_eq!(state.last_seen, 2);
    }

    #[test]
    fn test_drain_unseen_evicts_vanished_rooms() {
        let mut table = RoomTable::default();
        let state = table.take("ClinicA", 1);
        table.put("ClinicA", state);
        let state = table.take("ClinicB", 2);
        table.put("ClinicB", state);

        let gone = table.drain_unseen(2);
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].0, "ClinicA");
        assert_eq!(table.len(), 1);
        assert!(table.get("ClinicB").is_some());
    }

    #[tokio::test]
    async fn test_pending_removals_claim_once() {
        let pending = PendingRemovals::default();
        assert!(pending.try_claim("ClinicA", "B:record_agent").await);
        assert!(!pending.try_claim("ClinicA", "B:record_agent").await);
        // Different room or key is independent.
        assert!(pending.try_claim("ClinicB", "B:record_agent").await);
        assert!(pending.try_claim("ClinicA", "A:assistant_agent").await);

        pending.release("ClinicA", "B:record_agent").await;
        assert!(pending.try_claim("ClinicA", "B:record_agent").await);
    }
}
