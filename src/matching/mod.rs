//! Request matching against a pool of recorded entries

mod matcher;
pub(crate) mod query;
mod rules;

pub use matcher::{
    matcher_from_config, ClosestCandidate, MatchDiagnostic, Matcher, RecordMatcher, RuleFailure,
};
pub use rules::{MatchRules, DEFAULT_MATCHED_HEADERS};
