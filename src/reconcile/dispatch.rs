//! Dispatch engine: at most one automated-worker attach request per room
//! occupancy session.

use std::collections::HashSet;

use crate::config::RoutingConfig;
use crate::occupancy::{Classifier, Role};
use crate::rtc::Participant;

use super::state::{DispatchState, RoomState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Nothing to do this tick.
    Skip,
    /// The room's only participant is a bot; wait for a human.
    Defer,
    /// A clinician entered first; skip dispatch for this session.
    StaffFirst,
    /// Issue a dispatch request for the named worker.
    Dispatch(String),
}

/// Pure dispatch decision for one room, given the current roster and
/// session state. Failure handling and state updates stay with the caller.
pub fn evaluate(
    room: &str,
    participants: &[Participant],
    classifier: &dyn Classifier,
    routing: &RoutingConfig,
    registered: &HashSet<String>,
    state: &RoomState,
) -> DispatchDecision {
    if state.dispatch == DispatchState::Dispatched || state.staff_first {
        return DispatchDecision::Skip;
    }
    if participants.is_empty() {
        return DispatchDecision::Skip;
    }

    if let [only] = participants {
        match classifier.classify(only) {
            Role::InjectorBot | Role::RecordingBot => return DispatchDecision::Defer,
            Role::Staff => return DispatchDecision::StaffFirst,
            _ => {}
        }
    }

    let agent = routing
        .routes
        .iter()
        .find(|rule| room.starts_with(rule.prefix.as_str()))
        .map(|rule| rule.agent.clone())
        .or_else(|| registered.contains(room).then(|| routing.registry_agent.clone()));

    match agent {
        Some(agent) => DispatchDecision::Dispatch(agent),
        None => DispatchDecision::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::occupancy::NameClassifier;
    use crate::reconcile::state::RoomState;

    fn classifier() -> NameClassifier {
        NameClassifier::from_config(&ClassifierConfig::default())
    }

    fn participant(identity: &str) -> Participant {
        Participant {
            identity: identity.to_string(),
            ..Default::default()
        }
    }

    fn decide(room: &str, participants: &[Participant], state: &RoomState) -> DispatchDecision {
        decide_with_registry(room, participants, state, &HashSet::new())
    }

    fn decide_with_registry(
        room: &str,
        participants: &[Participant],
        state: &RoomState,
        registered: &HashSet<String>,
    ) -> DispatchDecision {
        evaluate(
            room,
            participants,
            &classifier(),
            &RoutingConfig::default(),
            registered,
            state,
        )
    }

    #[test]
    fn test_route_prefix_selects_worker() {
        let state = RoomState::default();
        assert_eq!(
            decide("ClinicA", &[participant("PatientX")], &state),
            DispatchDecision::Dispatch("assistant_agent".to_string())
        );
        assert_eq!(
            decide("Registration01", &[participant("PatientX")], &state),
            DispatchDecision::Dispatch("medical_agent".to_string())
        );
    }

    #[test]
    fn test_at_most_once_per_session() {
        let mut state = RoomState::default();
        let roster = [participant("PatientX")];
        assert!(matches!(
            decide("ClinicA", &roster, &state),
            DispatchDecision::Dispatch(_)
        ));
        state.dispatch = DispatchState::Dispatched;
        assert_eq!(decide("ClinicA", &roster, &state), DispatchDecision::Skip);
    }

    #[test]
    fn test_lone_bot_defers() {
        let state = RoomState::default();
        assert_eq!(
            decide("ClinicA", &[participant("ingress_agent")], &state),
            DispatchDecision::Defer
        );
        assert_eq!(
            decide("ClinicA", &[participant("EG_ClinicA")], &state),
            DispatchDecision::Defer
        );
    }

    #[test]
    fn test_lone_staff_skips_session() {
        let mut state = RoomState::default();
        assert_eq!(
            decide("ClinicA", &[participant("DrSmith")], &state),
            DispatchDecision::StaffFirst
        );
        state.staff_first = true;
        assert_eq!(
            decide("ClinicA", &[participant("DrSmith")], &state),
            DispatchDecision::Skip
        );
    }

    #[test]
    fn test_staff_among_others_does_not_block() {
        // Only a *lone* clinician suppresses dispatch.
        let state = RoomState::default();
        let roster = [participant("DrSmith"), participant("PatientX")];
        assert!(matches!(
            decide("ClinicA", &roster, &state),
            DispatchDecision::Dispatch(_)
        ));
    }

    #[test]
    fn test_registry_membership_falls_back_to_registry_agent() {
        let state = RoomState::default();
        let roster = [participant("PatientX")];
        assert_eq!(decide("consult-4711", &roster, &state), DispatchDecision::Skip);

        let registered: HashSet<String> = ["consult-4711".to_string()].into();
        assert_eq!(
            decide_with_registry("consult-4711", &roster, &state, &registered),
            DispatchDecision::Dispatch("assistant_agent".to_string())
        );
    }

    #[test]
    fn test_empty_room_skips() {
        let state = RoomState::default();
        assert_eq!(decide("ClinicA", &[], &state), DispatchDecision::Skip);
    }
}
