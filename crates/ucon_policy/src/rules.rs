//! Per-phase rule views and request matching.
//!
//! Absence semantics apply uniformly: an absent list never denies, an
//! explicit empty list denies everyone, a non-empty actor list also admits
//! the owner.

use crate::document::{PolicyDocument, TimeRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enforcement phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Reading the log
    LogAccess,
    /// Running an algorithm over the log
    Processing,
    /// Reading algorithm outputs
    OutputAccess,
}

impl Phase {
    /// Every phase, in lock order
    pub const ALL: [Phase; 3] = [Phase::LogAccess, Phase::Processing, Phase::OutputAccess];

    /// Stable name used in file names and audit records
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::LogAccess => "log-access",
            Phase::Processing => "processing",
            Phase::OutputAccess => "output-access",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown phase {:?}", s))
    }
}

/// Actor list with the owner folded in
#[must_use]
pub fn with_owner(list: Option<&[String]>, owner: &str) -> Option<Vec<String>> {
    list.map(|users| {
        let mut users = users.to_vec();
        if !users.is_empty() && !users.iter().any(|u| u == owner) {
            users.push(owner.to_string());
        }
        users
    })
}

/// Effective actor lists per phase, as recorded in the instance mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUsers {
    /// Log-access actors, `None` when unrestricted
    #[serde(rename = "logUsage")]
    pub log_usage: Option<Vec<String>>,
    /// Processing actors
    pub processing: Option<Vec<String>>,
    /// Output-access actors
    pub output: Option<Vec<String>>,
}

impl AuthorizedUsers {
    /// Derive from a document
    #[must_use]
    pub fn of(doc: &PolicyDocument) -> Self {
        Self {
            log_usage: doc.phase_rules(Phase::LogAccess).actors,
            processing: doc.phase_rules(Phase::Processing).actors,
            output: doc.phase_rules(Phase::OutputAccess).actors,
        }
    }
}

/// The rules governing one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRules<'a> {
    /// Phase these rules apply to
    pub phase: Phase,
    /// Permitted actors, owner included
    pub actors: Option<Vec<String>>,
    /// Permitted locations
    pub locations: Option<&'a [String]>,
    /// Instant after which the governed artifact is deleted
    pub expiration: Option<DateTime<Utc>>,
    /// Successful accesses allowed before deletion
    pub max_access_count: Option<u64>,
    /// Window outside which access is refused without deletion
    pub access_window: Option<&'a TimeRange>,
}

impl PolicyDocument {
    /// Rules governing `phase`.
    ///
    /// Processing reads the log, so it inherits the log's expiration but
    /// carries no quota of its own.
    #[must_use]
    pub fn phase_rules(&self, phase: Phase) -> PhaseRules<'_> {
        match phase {
            Phase::LogAccess => {
                let rules = &self.log_usage_rules;
                PhaseRules {
                    phase,
                    actors: with_owner(rules.access_control_rules.as_deref(), &self.owner),
                    locations: rules.allowed_locations.as_deref(),
                    expiration: rules.log_expiration,
                    max_access_count: rules.max_access_count,
                    access_window: None,
                }
            }
            Phase::Processing => {
                let rules = &self.processing_rules;
                PhaseRules {
                    phase,
                    actors: with_owner(rules.access_control_rules.as_deref(), &self.owner),
                    locations: rules.allowed_locations.as_deref(),
                    expiration: self.log_usage_rules.log_expiration,
                    max_access_count: None,
                    access_window: None,
                }
            }
            Phase::OutputAccess => {
                let rules = &self.output_rules;
                PhaseRules {
                    phase,
                    actors: with_owner(rules.access_control_rules.as_deref(), &self.owner),
                    locations: rules.allowed_locations.as_deref(),
                    expiration: rules.output_expiration,
                    max_access_count: rules.max_access_count,
                    access_window: rules.allowed_time_range.as_ref(),
                }
            }
        }
    }
}

impl PhaseRules<'_> {
    /// Identity check, exact match
    #[must_use]
    pub fn permits_actor(&self, actor: &str) -> bool {
        self.actors
            .as_ref()
            .is_none_or(|actors| actors.iter().any(|a| a == actor))
    }

    /// Location check, case-insensitive
    #[must_use]
    pub fn permits_location(&self, location: &str) -> bool {
        self.locations
            .is_none_or(|locations| locations.iter().any(|l| l.eq_ignore_ascii_case(location)))
    }

    /// Whether `now` is past the expiration
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| now > expiration)
    }

    /// Whether `now` is outside the access window
    #[must_use]
    pub fn outside_window(&self, now: DateTime<Utc>) -> bool {
        self.access_window.is_some_and(|window| !window.contains(now))
    }

    /// Whether `access_count` successful accesses exhaust the quota
    #[must_use]
    pub fn quota_exhausted(&self, access_count: u64) -> bool {
        self.max_access_count.is_some_and(|max| access_count >= max)
    }
}
