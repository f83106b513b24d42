//! Stale-agent reaper.
//!
//! Four independent rules, evaluated every tick against the fresh roster:
//!
//! - A: injector bot and automated worker both present → remove the worker
//!   after a short delay (hands the room to the waiting-video flow).
//! - B: exactly one real participant left with the recording worker →
//!   remove the worker after a longer delay.
//! - C: room crowded (≥ 3 participants) → remove worker and/or injector
//!   immediately; removing the injector chains a recording-worker dispatch.
//! - D: the injector bot is alone → remove it immediately.
//!
//! Delayed removals capture only (room, identity, expected condition) and
//! re-validate against live participant state when the delay expires; a
//! stale trigger degrades to a no-op.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ReaperConfig;
use crate::occupancy::{self, Classifier, Role};
use crate::rtc::{Participant, RoomControl, RtcError};

use super::state::{DispatchState, PendingRemovals, RoomState};

/// Condition a delayed removal re-checks before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCondition {
    /// The injector bot is still in the room alongside the target.
    WorkerWithInjector,
    /// Exactly one real participant remains alongside the target.
    LoneRealWithRecorder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaperAction {
    RemoveNow {
        identity: String,
        /// Worker to dispatch after a successful removal (hand-off chain).
        then_dispatch: Option<String>,
    },
    RemoveDelayed {
        identity: String,
        delay: Duration,
        /// Pending-set key guarding against duplicate scheduling.
        key: String,
        condition: RemovalCondition,
    },
}

/// Pure rule evaluation for one room.
pub fn evaluate(
    participants: &[Participant],
    classifier: &dyn Classifier,
    config: &ReaperConfig,
) -> Vec<ReaperAction> {
    let mut actions = Vec::new();
    let total = participants.len();
    let real = occupancy::real_count(participants, classifier);
    let injector_present = occupancy::has_role(participants, classifier, Role::InjectorBot);

    // Rule A
    if injector_present {
        for p in participants {
            if classifier.classify(p) == Role::Worker {
                let identity = p.identity.trim().to_string();
                actions.push(ReaperAction::RemoveDelayed {
                    key: format!("handoff:{identity}"),
                    identity,
                    delay: Duration::from_secs(config.worker_handoff_delay_seconds),
                    condition: RemovalCondition::WorkerWithInjector,
                });
            }
        }
    }

    // Rule B
    if real == 1
        && participants
            .iter()
            .any(|p| p.identity.trim() == config.handoff_agent)
    {
        actions.push(ReaperAction::RemoveDelayed {
            identity: config.handoff_agent.clone(),
            delay: Duration::from_secs(config.lone_recorder_delay_seconds),
            key: "lone-recorder".to_string(),
            condition: RemovalCondition::LoneRealWithRecorder,
        });
    }

    // Rule C
    if total >= 3 {
        for p in participants {
            match classifier.classify(p) {
                Role::Worker => actions.push(ReaperAction::RemoveNow {
                    identity: p.identity.trim().to_string(),
                    then_dispatch: None,
                }),
                Role::InjectorBot => actions.push(ReaperAction::RemoveNow {
                    identity: p.identity.trim().to_string(),
                    then_dispatch: Some(config.handoff_agent.clone()),
                }),
                _ => {}
            }
        }
    }

    // Rule D
    if let [only] = participants {
        if classifier.classify(only) == Role::InjectorBot {
            actions.push(ReaperAction::RemoveNow {
                identity: only.identity.trim().to_string(),
                then_dispatch: None,
            });
        }
    }

    actions
}

/// Issue a removal, treating a not-found response as success (the desired
/// end state already holds). Any other failure is logged and retried
/// naturally when the triggering condition is re-evaluated next tick.
pub async fn safe_remove(client: &dyn RoomControl, room: &str, identity: &str) -> bool {
    match client.remove_participant(room, identity).await {
        Ok(()) => {
            info!("Removed {identity} from {room}");
            true
        }
        Err(RtcError::NotFound) => {
            debug!("{identity} was already gone from {room}");
            true
        }
        Err(e) => {
            warn!("Failed to remove {identity} from {room}: {e}");
            false
        }
    }
}

#[derive(Clone)]
pub struct Reaper {
    client: Arc<dyn RoomControl>,
    classifier: Arc<dyn Classifier>,
    config: ReaperConfig,
    pending: PendingRemovals,
}

impl Reaper {
    pub fn new(
        client: Arc<dyn RoomControl>,
        classifier: Arc<dyn Classifier>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            client,
            classifier,
            config,
            pending: PendingRemovals::default(),
        }
    }

    pub async fn reconcile(&self, room: &str, participants: &[Participant], state: &mut RoomState) {
        for action in evaluate(participants, &*self.classifier, &self.config) {
            match action {
                ReaperAction::RemoveNow {
                    identity,
                    then_dispatch,
                } => {
                    if !safe_remove(&*self.client, room, &identity).await {
                        continue;
                    }
                    if let Some(agent) = then_dispatch {
                        match self.client.dispatch_agent(room, &agent).await {
                            Ok(()) => {
                                info!("Dispatched {agent} to {room} after removing {identity}");
                                state.dispatch = DispatchState::Dispatched;
                            }
                            Err(e) => warn!("Hand-off dispatch of {agent} to {room} failed: {e}"),
                        }
                    }
                }
                ReaperAction::RemoveDelayed {
                    identity,
                    delay,
                    key,
                    condition,
                } => {
                    if self.pending.try_claim(room, &key).await {
                        self.spawn_delayed(room.to_string(), identity, delay, key, condition);
                    }
                }
            }
        }
    }

    fn spawn_delayed(
        &self,
        room: String,
        identity: String,
        delay: Duration,
        key: String,
        condition: RemovalCondition,
    ) {
        let client = Arc::clone(&self.client);
        let classifier = Arc::clone(&self.classifier);
        let pending = self.pending.clone();

        let _ = tokio::spawn(async move {
            sleep(delay).await;
            if condition_holds(&*client, &*classifier, &room, &identity, condition).await {
                let _ = safe_remove(&*client, &room, &identity).await;
            } else {
                debug!("Delayed removal of {identity} from {room} no longer applies");
            }
            pending.release(&room, &key).await;
        });
    }
}

async fn condition_holds(
    client: &dyn RoomControl,
    classifier: &dyn Classifier,
    room: &str,
    identity: &str,
    condition: RemovalCondition,
) -> bool {
    let participants = match client.list_participants(room).await {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not re-validate delayed removal in {room}: {e}");
            return false;
        }
    };

    if !participants.iter().any(|p| p.identity.trim() == identity) {
        return false;
    }

    match condition {
        RemovalCondition::WorkerWithInjector => {
            occupancy::has_role(&participants, classifier, Role::InjectorBot)
        }
        RemovalCondition::LoneRealWithRecorder => {
            occupancy::real_count(&participants, classifier) == 1
        }
    }
}
