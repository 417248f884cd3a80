pub mod diff;
pub mod matching;
pub mod normalize;

pub use diff::{ChangeKind, ChangeSet, FieldChange, ReconciliationEngine};
pub use matching::{MatchMethod, MatchResult, Matcher, MemberAction, PrimaryMatch};
