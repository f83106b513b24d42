//! Waiting-video injector.
//!
//! When exactly one customer is in a room, a promotional video is looped
//! into the room through an inbound media bridge. Only customers count
//! toward the trigger; staff and bot participants are ignored. The trigger
//! fires at most once per occupancy session; the flag is set before the
//! video fetch, so a failed fetch skips injection for the rest of that
//! session (deliberately preserved behavior, logged).

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::catalog::VideoCatalog;
use crate::config::InjectionConfig;
use crate::media::{MediaPusher, PushOutcome};
use crate::occupancy::{self, Classifier};
use crate::rtc::{Participant, RoomControl};

use super::state::RoomState;

const BRIDGE_DISPLAY_NAME: &str = "Waiting room video";

/// Pure trigger decision: the single customer to play for, if the room is
/// in the waiting configuration and this session has not already triggered.
pub fn should_inject<'a>(
    participants: &'a [Participant],
    classifier: &dyn Classifier,
    state: &RoomState,
) -> Option<&'a Participant> {
    if state.injection_triggered {
        return None;
    }
    occupancy::lone_customer(participants, classifier)
}

#[derive(Clone)]
pub struct Injector {
    client: Arc<dyn RoomControl>,
    catalog: Arc<dyn VideoCatalog>,
    pusher: Arc<dyn MediaPusher>,
    classifier: Arc<dyn Classifier>,
    config: InjectionConfig,
    bridge_identity: String,
}

impl Injector {
    pub fn new(
        client: Arc<dyn RoomControl>,
        catalog: Arc<dyn VideoCatalog>,
        pusher: Arc<dyn MediaPusher>,
        classifier: Arc<dyn Classifier>,
        config: InjectionConfig,
        bridge_identity: String,
    ) -> Self {
        Self {
            client,
            catalog,
            pusher,
            classifier,
            config,
            bridge_identity,
        }
    }

    /// Evaluate the trigger for one room and, when it fires, mark the
    /// session and start the injection flow in the background. The loop is
    /// never blocked on the bridge or the push process.
    pub fn maybe_trigger(&self, room: &str, participants: &[Participant], state: &mut RoomState) {
        let Some(waiting) = should_inject(participants, &*self.classifier, state) else {
            return;
        };

        info!(
            "Room {room} has one waiting participant ({}), starting video injection",
            waiting.identity
        );
        state.injection_triggered = true;

        let this = self.clone();
        let room = room.to_string();
        let _ = tokio::spawn(async move {
            this.run(&room).await;
        });
    }

    async fn run(&self, room: &str) {
        // The trigger snapshot may be stale by the time this task runs;
        // re-validate against live state before creating the bridge.
        match self.client.list_participants(room).await {
            Ok(participants) => {
                if occupancy::lone_customer(&participants, &*self.classifier).is_none() {
                    info!("Room {room} no longer has a lone waiting customer, skipping injection");
                    return;
                }
            }
            Err(e) => {
                warn!("Could not re-validate {room} before injection: {e}");
                return;
            }
        }

        let video_url = match self.catalog.fetch_promo_video_url().await {
            Ok(url) => url,
            Err(e) => {
                // The session flag stays set until the room empties, so this
                // session will not be retried.
                warn!("Failed to fetch waiting-room video for {room}: {e}; injection skipped for this session");
                return;
            }
        };

        let bridge = match self
            .client
            .create_ingress(room, &self.bridge_identity, BRIDGE_DISPLAY_NAME)
            .await
        {
            Ok(bridge) => bridge,
            Err(e) => {
                warn!("Failed to create media bridge for {room}: {e}");
                return;
            }
        };
        info!("Media bridge {} created for {room}", bridge.ingress_id);

        sleep(Duration::from_secs(self.config.settle_delay_seconds)).await;

        self.push_until_exhausted(room, &video_url, &bridge.rtmp_target())
            .await;

        match self.client.delete_ingress(&bridge.ingress_id).await {
            Ok(()) => info!("Media bridge {} removed from {room}", bridge.ingress_id),
            Err(e) => warn!(
                "Failed to delete media bridge {} for {room}: {e}",
                bridge.ingress_id
            ),
        }
    }

    /// Keep the loop-push process running until the duration budget is
    /// spent, restarting it after a cooldown when it exits early.
    async fn push_until_exhausted(&self, room: &str, video_url: &str, rtmp_target: &str) {
        let cooldown = Duration::from_secs(self.config.restart_cooldown_seconds);
        let deadline = Instant::now() + Duration::from_secs(self.config.max_duration_seconds);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.pusher.push(video_url, rtmp_target, remaining).await {
                Ok(PushOutcome::BudgetExhausted) => break,
                Ok(PushOutcome::ExitedEarly(code)) => {
                    warn!("Push process for {room} exited early (code {code:?}), restarting after cooldown");
                }
                Err(e) => {
                    warn!("Push process for {room} failed: {e}, restarting after cooldown");
                }
            }
            sleep(cooldown).await;
        }

        info!("Video injection budget spent for {room}");
    }
}
