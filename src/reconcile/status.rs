//! Shared status handle, readable by the local status API.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One managed room, as of the last completed tick.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub total_participants: usize,
    pub real_participants: usize,
    pub identities: Vec<String>,
    pub dispatched: bool,
    pub staff_first: bool,
    pub recording: bool,
    pub injection_triggered: bool,
}

/// A recording whose stop request failed after local state was cleared.
/// The remote job may still be running; an external monitor reconciles
/// these against the egress service.
#[derive(Debug, Clone, Serialize)]
pub struct OrphanedEgress {
    pub room: String,
    pub egress_id: String,
    pub filepath: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ControlStatus {
    pub tick: u64,
    pub rooms: Vec<RoomSummary>,
    pub orphaned: Vec<OrphanedEgress>,
}

/// Oldest entries are dropped past this point; the list is a window for an
/// external monitor, not an audit log.
const ORPHAN_CAPACITY: usize = 100;

#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<ControlStatus>>,
}

impl StatusHandle {
    pub async fn snapshot(&self) -> ControlStatus {
        self.inner.lock().await.clone()
    }

    pub async fn set_rooms(&self, tick: u64, rooms: Vec<RoomSummary>) {
        let mut status = self.inner.lock().await;
        status.tick = tick;
        status.rooms = rooms;
    }

    pub async fn push_orphan(&self, room: &str, egress_id: &str, filepath: &str) {
        let mut status = self.inner.lock().await;
        if status.orphaned.len() == ORPHAN_CAPACITY {
            let _ = status.orphaned.remove(0);
        }
        status.orphaned.push(OrphanedEgress {
            room: room.to_string(),
            egress_id: egress_id.to_string(),
            filepath: filepath.to_string(),
            at: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_updates() {
        let handle = StatusHandle::default();
        handle
            .set_rooms(
                7,
                vec![RoomSummary {
                    name: "ClinicA".to_string(),
                    total_participants: 2,
                    real_participants: 2,
                    identities: vec!["DrSmith".to_string(), "PatientX".to_string()],
                    dispatched: true,
                    staff_first: false,
                    recording: true,
                    injection_triggered: false,
                }],
            )
            .await;
        handle.push_orphan("ClinicA", "eg_1", "default/recordings/x.mp4").await;

        let status = handle.snapshot().await;
        assert_eq!(status.tick, 7);
        assert_eq!(status.rooms.len(), 1);
        assert_eq!(status.orphaned.len(), 1);
        assert_eq!(status.orphaned[0].egress_id, "eg_1");
    }

    #[tokio::test]
    async fn test_orphan_list_keeps_newest_entries() {
        let handle = StatusHandle::default();
        for i in 0..150 {
            handle
                .push_orphan("ClinicA", &format!("eg_{i}"), "f.mp4")
                .await;
        }

        let status = handle.snapshot().await;
        assert_eq!(status.orphaned.len(), 100);
        assert_eq!(status.orphaned[0].egress_id, "eg_50");
        assert_eq!(status.orphaned[99].egress_id, "eg_149");
    }
}
