//! Recording controller: Idle ⇄ Recording, driven by the real-participant
//! threshold.
//!
//! The stop path clears local state even when the remote stop call fails;
//! a stuck local machine would block every future recording of the room,
//! while an orphaned remote job can be reconciled externally. Each such
//! failure is recorded on the status handle for that purpose.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RecordingConfig;
use crate::rtc::RoomControl;

use super::state::RecordingState;
use super::status::StatusHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingCommand {
    Start { filepath: String },
    Stop { egress_id: String, filepath: String },
}

/// Pure transition decision. `None` means the state already matches the
/// observed occupancy.
pub fn evaluate(
    room: &str,
    real: usize,
    min_real: usize,
    output_prefix: &str,
    state: &RecordingState,
) -> Option<RecordingCommand> {
    match state {
        RecordingState::Idle if real >= min_real => Some(RecordingCommand::Start {
            filepath: output_path(output_prefix, room),
        }),
        RecordingState::Recording {
            egress_id,
            filepath,
        } if real < min_real => Some(RecordingCommand::Stop {
            egress_id: egress_id.clone(),
            filepath: filepath.clone(),
        }),
        _ => None,
    }
}

fn output_path(prefix: &str, room: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{prefix}/{room}_{timestamp}.mp4")
}

pub struct RecordingController {
    client: Arc<dyn RoomControl>,
    config: RecordingConfig,
    status: StatusHandle,
}

impl RecordingController {
    pub fn new(client: Arc<dyn RoomControl>, config: RecordingConfig, status: StatusHandle) -> Self {
        Self {
            client,
            config,
            status,
        }
    }

    /// Drive the room's recording state toward the observed occupancy. A
    /// failed start leaves the state Idle; the guard re-fires next tick.
    pub async fn reconcile(&self, room: &str, real: usize, state: &mut RecordingState) {
        match evaluate(
            room,
            real,
            self.config.min_real_participants,
            &self.config.output_prefix,
            state,
        ) {
            Some(RecordingCommand::Start { filepath }) => {
                match self
                    .client
                    .start_room_egress(room, &filepath, &self.config.profile)
                    .await
                {
                    Ok(egress_id) => {
                        info!("Recording started for {room} (file: {filepath})");
                        *state = RecordingState::Recording {
                            egress_id,
                            filepath,
                        };
                    }
                    Err(e) => warn!("Failed to start recording for {room}: {e}"),
                }
            }
            Some(RecordingCommand::Stop {
                egress_id,
                filepath,
            }) => {
                self.stop(room, &egress_id, &filepath).await;
                *state = RecordingState::Idle;
            }
            None => {}
        }
    }

    /// Best-effort stop for a room evicted while recording (the room
    /// vanished from the directory between ticks).
    pub async fn stop_for_evicted(&self, room: &str, state: RecordingState) {
        if let RecordingState::Recording {
            egress_id,
            filepath,
        } = state
        {
            warn!("Room {room} vanished while recording, stopping egress {egress_id}");
            self.stop(room, &egress_id, &filepath).await;
        }
    }

    async fn stop(&self, room: &str, egress_id: &str, filepath: &str) {
        match self.client.stop_egress(egress_id).await {
            Ok(()) => info!("Recording stopped for {room}. Saved: {filepath}"),
            Err(e) => {
                warn!("Failed to stop recording {egress_id} for {room}: {e} (clearing local state anyway)");
                self.status.push_orphan(room, egress_id, filepath).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_at_threshold() {
        let cmd = evaluate("ClinicA", 2, 2, "default/recordings", &RecordingState::Idle);
        match cmd {
            Some(RecordingCommand::Start { filepath }) => {
                assert!(filepath.starts_with("default/recordings/ClinicA_"));
                assert!(filepath.ends_with(".mp4"));
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_idle_below_threshold_is_noop() {
        assert_eq!(
            evaluate("ClinicA", 1, 2, "default/recordings", &RecordingState::Idle),
            None
        );
        assert_eq!(
            evaluate("ClinicA", 0, 2, "default/recordings", &RecordingState::Idle),
            None
        );
    }

    #[test]
    fn test_stop_when_dropping_below_threshold() {
        let state = RecordingState::Recording {
            egress_id: "eg_1".to_string(),
            filepath: "default/recordings/ClinicA_x.mp4".to_string(),
        };
        assert_eq!(
            evaluate("ClinicA", 1, 2, "default/recordings", &state),
            Some(RecordingCommand::Stop {
                egress_id: "eg_1".to_string(),
                filepath: "default/recordings/ClinicA_x.mp4".to_string(),
            })
        );
    }

    #[test]
    fn test_recording_at_or_above_threshold_is_noop() {
        let state = RecordingState::Recording {
            egress_id: "eg_1".to_string(),
            filepath: "f.mp4".to_string(),
        };
        assert_eq!(evaluate("ClinicA", 2, 2, "p", &state), None);
        assert_eq!(evaluate("ClinicA", 5, 2, "p", &state), None);
    }
}
