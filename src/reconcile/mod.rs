//! The reconciliation loop.
//!
//! Every tick polls the room registry and the live room directory, then
//! drives each occupied room through the per-room engines in a fixed
//! order: dispatch, reaper, recording, injection. Rooms observed empty or
//! gone from the directory are evicted from the state table, which resets
//! their occupancy session.

pub mod dispatch;
pub mod injection;
pub mod reaper;
pub mod recording;
pub mod state;
pub mod status;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{Config, RoutingConfig};
use crate::occupancy::{self, Classifier};
use crate::registry::RoomRegistry;
use crate::rtc::RoomControl;

use dispatch::DispatchDecision;
use injection::Injector;
use reaper::Reaper;
use recording::RecordingController;
use state::{DispatchState, RoomTable};
use status::{RoomSummary, StatusHandle};

pub struct Reconciler {
    client: Arc<dyn RoomControl>,
    registry: Arc<dyn RoomRegistry>,
    classifier: Arc<dyn Classifier>,
    routing: RoutingConfig,
    recording: RecordingController,
    injector: Injector,
    reaper: Reaper,
    status: StatusHandle,
    table: RoomTable,
    tick: u64,
    poll_interval: Duration,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn RoomControl>,
        registry: Arc<dyn RoomRegistry>,
        classifier: Arc<dyn Classifier>,
        recording: RecordingController,
        injector: Injector,
        reaper: Reaper,
        status: StatusHandle,
        config: &Config,
    ) -> Self {
        Self {
            client,
            registry,
            classifier,
            routing: config.routing.clone(),
            recording,
            injector,
            reaper,
            status,
            table: RoomTable::default(),
            tick: 0,
            poll_interval: Duration::from_millis(config.service.poll_interval_ms),
        }
    }

    pub async fn run(mut self) {
        info!("Reconciliation loop started ({}ms interval)", self.poll_interval.as_millis());
        loop {
            self.tick().await;
            sleep(self.poll_interval).await;
        }
    }

    /// One full reconciliation pass. A directory failure skips the pass
    /// entirely; per-room failures skip that room and leave its state
    /// untouched for the next tick.
    pub async fn tick(&mut self) {
        self.tick += 1;
        let registered = self.registry.fetch_registered_rooms().await;

        let rooms = match self.client.list_rooms().await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!("Could not list rooms, skipping pass: {e}");
                return;
            }
        };

        let mut summaries = Vec::with_capacity(rooms.len());
        for room in &rooms {
            let name = room.name.as_str();
            let participants = match self.client.list_participants(name).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("Could not list participants of {name}: {e}");
                    // Keep the session alive across a transient failure;
                    // otherwise the eviction sweep below would reset it and
                    // stop a live recording.
                    let state = self.table.take(name, self.tick);
                    self.table.put(name, state);
                    continue;
                }
            };

            let mut state = self.table.take(name, self.tick);

            if participants.is_empty() {
                // Session over: stop any recording and drop the state so the
                // next occupant starts a fresh session.
                if state.recording.is_recording() {
                    self.recording.stop_for_evicted(name, state.recording).await;
                }
                debug!("Room {name} is empty, session state reset");
                continue;
            }

            let real = occupancy::real_count(&participants, &*self.classifier);

            match dispatch::evaluate(
                name,
                &participants,
                &*self.classifier,
                &self.routing,
                &registered,
                &state,
            ) {
                DispatchDecision::Dispatch(agent) => {
                    match self.client.dispatch_agent(name, &agent).await {
                        Ok(()) => {
                            info!("Dispatched {agent} to {name}");
                            state.dispatch = DispatchState::Dispatched;
                        }
                        Err(e) => warn!("Failed to dispatch {agent} to {name}: {e}"),
                    }
                }
                DispatchDecision::StaffFirst => {
                    info!("Clinician entered {name} first, skipping dispatch this session");
                    state.staff_first = true;
                }
                DispatchDecision::Defer | DispatchDecision::Skip => {}
            }

            self.reaper.reconcile(name, &participants, &mut state).await;
            self.recording
                .reconcile(name, real, &mut state.recording)
                .await;
            self.injector.maybe_trigger(name, &participants, &mut state);

            summaries.push(RoomSummary {
                name: name.to_string(),
                total_participants: participants.len(),
                real_participants: real,
                identities: participants.iter().map(|p| p.identity.clone()).collect(),
                dispatched: state.dispatch == DispatchState::Dispatched,
                staff_first: state.staff_first,
                recording: state.recording.is_recording(),
                injection_triggered: state.injection_triggered,
            });
            self.table.put(name, state);
        }

        for (name, state) in self.table.drain_unseen(self.tick) {
            debug!("Room {name} left the directory, session state reset");
            self.recording.stop_for_evicted(&name, state.recording).await;
        }

        self.status.set_rooms(self.tick, summaries).await;
    }
}
