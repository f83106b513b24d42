//! Participant role classification.
//!
//! Pure and deterministic: every other component derives its decisions from
//! the roles assigned here. A structured role tag in the participant
//! metadata wins; substring matching on identity/display name is kept as
//! the legacy fallback for participants whose tokens carry no tag.

use serde::Deserialize;

use crate::config::ClassifierConfig;
use crate::rtc::Participant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Clinician or other staff member. Human, counts as real.
    Staff,
    /// Automated conversational worker (e.g. assistant_agent).
    Worker,
    /// Recording worker or egress participant.
    RecordingBot,
    /// Inbound media bridge participant pushing the waiting-room video.
    InjectorBot,
    /// A real customer.
    Customer,
}

impl Role {
    pub fn is_real(self) -> bool {
        matches!(self, Role::Staff | Role::Customer)
    }
}

pub trait Classifier: Send + Sync {
    fn classify(&self, participant: &Participant) -> Role;
}

#[derive(Debug, Deserialize)]
struct MetadataTag {
    role: String,
}

/// Classifier combining structured metadata tags with the legacy naming
/// conventions owned by the upstream identity issuers.
pub struct NameClassifier {
    staff_markers: Vec<String>,
    worker_suffix: String,
    injector_identity: String,
    recorder_identities: Vec<String>,
    recorder_prefix: String,
}

impl NameClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            staff_markers: config
                .staff_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            worker_suffix: config.worker_suffix.clone(),
            injector_identity: config.injector_identity.clone(),
            recorder_identities: config.recorder_identities.clone(),
            recorder_prefix: config.recorder_prefix.clone(),
        }
    }

    fn from_metadata(metadata: &str) -> Option<Role> {
        let tag: MetadataTag = serde_json::from_str(metadata).ok()?;
        match tag.role.as_str() {
            "staff" => Some(Role::Staff),
            "worker" => Some(Role::Worker),
            "recorder" => Some(Role::RecordingBot),
            "injector" => Some(Role::InjectorBot),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }

    fn is_staff_name(&self, participant: &Participant) -> bool {
        let identity = participant.identity.trim().to_lowercase();
        let name = participant.name.trim().to_lowercase();
        self.staff_markers
            .iter()
            .any(|marker| identity.contains(marker) || name.contains(marker))
    }
}

impl Classifier for NameClassifier {
    fn classify(&self, participant: &Participant) -> Role {
        if let Some(role) = Self::from_metadata(&participant.metadata) {
            return role;
        }

        let identity = participant.identity.trim();
        if identity == self.injector_identity {
            return Role::InjectorBot;
        }
        if self.recorder_identities.iter().any(|id| id == identity)
            || identity.starts_with(&self.recorder_prefix)
        {
            return Role::RecordingBot;
        }
        if identity.ends_with(&self.worker_suffix) {
            return Role::Worker;
        }
        if self.is_staff_name(participant) {
            return Role::Staff;
        }
        Role::Customer
    }
}

/// Number of real participants (staff and customers; every automated role
/// is excluded). This is the count the recording threshold is judged on.
pub fn real_count(participants: &[Participant], classifier: &dyn Classifier) -> usize {
    participants
        .iter()
        .filter(|p| !p.identity.trim().is_empty())
        .filter(|p| classifier.classify(p).is_real())
        .count()
}

/// The single customer in the room, when there is exactly one. Staff do not
/// mask a waiting customer; only a second customer does.
pub fn lone_customer<'a>(
    participants: &'a [Participant],
    classifier: &dyn Classifier,
) -> Option<&'a Participant> {
    let mut customers = participants
        .iter()
        .filter(|p| !p.identity.trim().is_empty())
        .filter(|p| classifier.classify(p) == Role::Customer);
    let first = customers.next()?;
    if customers.next().is_some() {
        return None;
    }
    Some(first)
}

pub fn has_role(participants: &[Participant], classifier: &dyn Classifier, role: Role) -> bool {
    participants.iter().any(|p| classifier.classify(p) == role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn classifier() -> NameClassifier {
        NameClassifier::from_config(&ClassifierConfig::default())
    }

    fn participant(identity: &str, name: &str) -> Participant {
        Participant {
            identity: identity.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_legacy_naming_conventions() {
        let c = classifier();
        assert_eq!(c.classify(&participant("ingress_agent", "")), Role::InjectorBot);
        assert_eq!(c.classify(&participant("record_agent", "")), Role::RecordingBot);
        assert_eq!(c.classify(&participant("EG_ClinicA", "")), Role::RecordingBot);
        assert_eq!(c.classify(&participant("assistant_agent", "")), Role::Worker);
        assert_eq!(c.classify(&participant("DrSmith", "Dr. Smith")), Role::Staff);
        assert_eq!(c.classify(&participant("PatientX", "Pat")), Role::Customer);
    }

    #[test]
    fn test_injector_beats_worker_suffix() {
        // "ingress_agent" also ends with the worker suffix; the specific
        // identity must win.
        let c = classifier();
        assert_eq!(c.classify(&participant("ingress_agent", "")), Role::InjectorBot);
    }

    #[test]
    fn test_metadata_tag_takes_precedence() {
        let c = classifier();
        let mut p = participant("DrSmith", "Dr. Smith");
        p.metadata = r#"{"role":"customer"}"#.to_string();
        assert_eq!(c.classify(&p), Role::Customer);

        let mut p = participant("someone", "");
        p.metadata = r#"{"role":"injector"}"#.to_string();
        assert_eq!(c.classify(&p), Role::InjectorBot);
    }

    #[test]
    fn test_unknown_metadata_falls_back() {
        let c = classifier();
        let mut p = participant("assistant_agent", "");
        p.metadata = r#"{"role":"sidekick"}"#.to_string();
        assert_eq!(c.classify(&p), Role::Worker);

        let mut p = participant("PatientX", "");
        p.metadata = "not json".to_string();
        assert_eq!(c.classify(&p), Role::Customer);
    }

    #[test]
    fn test_real_count_counts_humans_only() {
        let c = classifier();
        let participants = vec![
            participant("DrSmith", "Dr. Smith"),
            participant("PatientX", ""),
            participant("assistant_agent", ""),
            participant("ingress_agent", ""),
            participant("EG_ClinicA", ""),
            participant("  ", ""),
        ];
        assert_eq!(real_count(&participants, &c), 2);
    }

    #[test]
    fn test_lone_customer() {
        let c = classifier();
        let participants = vec![participant("PatientX", ""), participant("assistant_agent", "")];
        assert_eq!(
            lone_customer(&participants, &c).map(|p| p.identity.as_str()),
            Some("PatientX")
        );

        // A clinician in the room does not mask the waiting patient.
        let participants = vec![participant("PatientX", ""), participant("DrSmith", "")];
        assert_eq!(
            lone_customer(&participants, &c).map(|p| p.identity.as_str()),
            Some("PatientX")
        );

        let participants = vec![participant("PatientX", ""), participant("PatientY", "")];
        assert!(lone_customer(&participants, &c).is_none());
    }
}
