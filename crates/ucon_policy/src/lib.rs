//! UCON.FABRIC Policy System
//!
//! Reads usage-control authorizations written in Turtle, materializes them
//! into a [`PolicyDocument`], and derives the structural fingerprint that
//! decides which generated enforcement program serves them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decode;
pub mod document;
pub mod error;
pub mod graph;
pub mod rules;
pub mod shape;
pub mod turtle;
pub mod vocab;

pub use decode::{is_identifier, is_plain_file_name, parse_policy};
pub use document::{
    AttributeExclusionRules, LogUsageRules, ObjectId, OutputRules, PolicyDocument, ProcessingRules,
    SemanticLogConstraints, Technique, TimeRange,
};
pub use error::{ParseError, ParseResult};
pub use rules::{AuthorizedUsers, Phase, PhaseRules};
pub use shape::{RuleProfile, StructuralShape, dedup_key, fingerprint, log_content_hash};
