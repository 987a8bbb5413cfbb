//! Phase gate sequence.
//!
//! Checks run strictly in order, each a hard allow or deny: existence,
//! identity, location, temporal validity, quota. Expiration and quota
//! exhaustion both delete the governed artifact.

use crate::error::Denial;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ucon_policy::{Phase, PhaseRules};
use ucon_storage::AccessState;

/// Condition of the artifact a phase governs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Stored and readable
    Present,
    /// Removed by expiration or quota
    Deleted,
    /// Never produced
    Absent,
}

/// Gate outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Access allowed
    Grant,
    /// Access refused, nothing changes
    Deny(Denial),
    /// Access refused and the artifact must be deleted
    DeleteAndDeny(Denial),
}

/// Progress of one (instance, resource) through the phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Nothing granted yet
    Unchecked,
    /// Log read granted
    LogGranted,
    /// An algorithm ran
    Processed,
    /// An output read granted
    OutputGranted,
    /// Refused
    Denied,
    /// Artifact gone
    Expired,
}

impl RequestState {
    /// State reached by a granted request in `phase`
    #[must_use]
    pub const fn granted(phase: Phase) -> Self {
        match phase {
            Phase::LogAccess => Self::LogGranted,
            Phase::Processing => Self::Processed,
            Phase::OutputAccess => Self::OutputGranted,
        }
    }

    /// State reached by a refused request
    #[must_use]
    pub const fn denied(denial: &Denial) -> Self {
        match denial {
            Denial::Expired | Denial::QuotaExceeded => Self::Expired,
            _ => Self::Denied,
        }
    }
}

/// One request at a phase gate
#[derive(Debug, Clone)]
pub struct GateRequest<'a> {
    /// Requesting principal
    pub actor: &'a str,
    /// Declared requester location
    pub location: &'a str,
    /// Evaluation instant
    pub now: DateTime<Utc>,
}

/// Run the gate sequence for `rules`
#[must_use]
pub fn evaluate(
    rules: &PhaseRules<'_>,
    state: &AccessState,
    artifact: Artifact,
    request: &GateRequest<'_>,
) -> Verdict {
    match artifact {
        _ if state.deleted => return Verdict::Deny(Denial::Expired),
        Artifact::Deleted => return Verdict::Deny(Denial::Expired),
        Artifact::Absent => return Verdict::Deny(Denial::OutputUnavailable),
        Artifact::Present => {}
    }
    if !rules.permits_actor(request.actor) {
        return Verdict::Deny(Denial::Unauthorized);
    }
    if !rules.permits_location(request.location) {
        return Verdict::Deny(Denial::LocationNotAllowed);
    }
    if rules.is_expired(request.now) {
        return Verdict::DeleteAndDeny(Denial::Expired);
    }
    if rules.outside_window(request.now) {
        return Verdict::Deny(Denial::OutsideTimeWindow);
    }
    if rules.quota_exhausted(state.access_count) {
        return Verdict::DeleteAndDeny(Denial::QuotaExceeded);
    }
    Verdict::Grant
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ucon_policy::TimeRange;

    fn rules<'a>(
        actors: Option<Vec<&str>>,
        locations: Option<&'a [String]>,
        window: Option<&'a TimeRange>,
    ) -> PhaseRules<'a> {
        PhaseRules {
            phase: Phase::LogAccess,
            actors: actors.map(|a| a.into_iter().map(str::to_string).collect()),
            locations,
            expiration: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
            max_access_count: Some(2),
            access_window: window,
        }
    }

    fn request(actor: &str, now: DateTime<Utc>) -> GateRequest<'_> {
        GateRequest {
            actor,
            location: "IT",
            now,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_order_existence_first() {
        let deleted = AccessState {
            deleted: true,
            ..AccessState::default()
        };
        let r = rules(Some(vec![]), None, None);
        // Even an unauthorized actor sees the deletion first
        assert_eq!(
            evaluate(&r, &deleted, Artifact::Present, &request("mallory", now())),
            Verdict::Deny(Denial::Expired)
        );
        assert_eq!(
            evaluate(&r, &AccessState::default(), Artifact::Absent, &request("mallory", now())),
            Verdict::Deny(Denial::OutputUnavailable)
        );
    }

    #[test]
    fn test_identity_and_location() {
        let locations = vec!["it".to_string()];
        let r = rules(Some(vec!["pubk1"]), Some(&locations), None);
        let fresh = AccessState::default();
        assert_eq!(evaluate(&r, &fresh, Artifact::Present, &request("pubk1", now())), Verdict::Grant);
        assert_eq!(
            evaluate(&r, &fresh, Artifact::Present, &request("pubk2", now())),
            Verdict::Deny(Denial::Unauthorized)
        );
        let abroad = GateRequest {
            location: "fr",
            ..request("pubk1", now())
        };
        assert_eq!(
            evaluate(&r, &fresh, Artifact::Present, &abroad),
            Verdict::Deny(Denial::LocationNotAllowed)
        );
        // Absent block never denies on identity, empty list always does
        let open = rules(None, None, None);
        assert_eq!(evaluate(&open, &fresh, Artifact::Present, &request("anyone", now())), Verdict::Grant);
        let closed = rules(Some(vec![]), None, None);
        assert_eq!(
            evaluate(&closed, &fresh, Artifact::Present, &request("anyone", now())),
            Verdict::Deny(Denial::Unauthorized)
        );
    }

    #[test]
    fn test_expiration_and_quota_delete() {
        let r = rules(None, None, None);
        let later = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            evaluate(&r, &AccessState::default(), Artifact::Present, &request("a", later)),
            Verdict::DeleteAndDeny(Denial::Expired)
        );
        let used = AccessState {
            access_count: 2,
            ..AccessState::default()
        };
        assert_eq!(
            evaluate(&r, &used, Artifact::Present, &request("a", now())),
            Verdict::DeleteAndDeny(Denial::QuotaExceeded)
        );
        let once = AccessState {
            access_count: 1,
            ..AccessState::default()
        };
        assert_eq!(evaluate(&r, &once, Artifact::Present, &request("a", now())), Verdict::Grant);
    }

    #[test]
    fn test_window_denies_without_deletion() {
        let window = TimeRange {
            event_attribute: "time:timestamp".to_string(),
            start_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap(),
        };
        let r = rules(None, None, Some(&window));
        assert_eq!(
            evaluate(&r, &AccessState::default(), Artifact::Present, &request("a", now())),
            Verdict::Deny(Denial::OutsideTimeWindow)
        );
    }

    #[test]
    fn test_request_states() {
        assert_eq!(RequestState::granted(Phase::Processing), RequestState::Processed);
        assert_eq!(RequestState::denied(&Denial::QuotaExceeded), RequestState::Expired);
        assert_eq!(RequestState::denied(&Denial::Unauthorized), RequestState::Denied);
        assert_eq!(serde_json::to_value(RequestState::LogGranted).unwrap(), "LOG_GRANTED");
    }
}
