// Error types for pick submission and resolution.

use thiserror::Error;

use crate::model::{ContestantId, GolferId, Phase, PickId, PickSlot, TournamentId};

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ResolveError {
    /// No result has been ingested yet for a golfer the decision depends on.
    /// The pick stays unresolved and is retried on the next batch.
    #[error("no result yet for {slot} golfer {golfer} (pick {pick})")]
    MissingResult {
        pick: PickId,
        slot: PickSlot,
        golfer: GolferId,
    },

    /// A result exists but its earnings are not known yet.
    #[error("earnings not yet known for {slot} golfer {golfer} (pick {pick})")]
    MissingEarnings {
        pick: PickId,
        slot: PickSlot,
        golfer: GolferId,
    },

    #[error("tournament {tournament} is {phase}, not final")]
    TournamentNotFinal { tournament: TournamentId, phase: Phase },

    /// The pick passed submission validation but no longer holds, e.g. after
    /// an operator override elsewhere.
    #[error("pick {pick} failed re-validation: {reason}")]
    IntegrityConflict { pick: PickId, reason: String },

    #[error("pick {0} not found")]
    PickNotFound(PickId),

    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl ResolveError {
    /// Whether a later batch run may succeed without operator action.
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            ResolveError::MissingResult { .. } | ResolveError::MissingEarnings { .. }
        )
    }
}

/// Why a pick was left unresolved by a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Waiting on upstream data; retry later.
    AwaitingResults(String),
    /// Data-integrity warning; needs an operator to look at it.
    Integrity(String),
    /// Storage failure while resolving this pick.
    Store(String),
}

impl From<&ResolveError> for SkipReason {
    fn from(err: &ResolveError) -> Self {
        if err.is_deferred() {
            return SkipReason::AwaitingResults(err.to_string());
        }
        match err {
            ResolveError::IntegrityConflict { .. } | ResolveError::PickNotFound(_) => {
                SkipReason::Integrity(err.to_string())
            }
            _ => SkipReason::Store(err.to_string()),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AwaitingResults(msg) => write!(f, "awaiting results: {msg}"),
            SkipReason::Integrity(msg) => write!(f, "integrity warning: {msg}"),
            SkipReason::Store(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A single reason a pick submission was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionProblem {
    CutoffPassed,
    SameGolfer,
    NotInField(PickSlot),
    Amateur(PickSlot),
    AlreadyUsed(PickSlot),
    UnknownGolfer(PickSlot),
}

impl std::fmt::Display for SubmissionProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionProblem::CutoffPassed => f.write_str("the deadline for this tournament has passed"),
            SubmissionProblem::SameGolfer => f.write_str("primary and backup must be different golfers"),
            SubmissionProblem::NotInField(slot) => write!(f, "{slot} golfer is not in the tournament field"),
            SubmissionProblem::Amateur(slot) => write!(f, "{slot} golfer is an amateur"),
            SubmissionProblem::AlreadyUsed(slot) => write!(f, "{slot} golfer has already been used this season"),
            SubmissionProblem::UnknownGolfer(slot) => write!(f, "{slot} golfer does not exist"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid pick: {}", join_problems(.0))]
    InvalidPickSubmission(Vec<SubmissionProblem>),

    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),

    #[error("contestant {0} not found")]
    ContestantNotFound(ContestantId),

    #[error("pick {0} not found")]
    PickNotFound(PickId),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl SubmissionError {
    pub fn problems(&self) -> &[SubmissionProblem] {
        match self {
            SubmissionError::InvalidPickSubmission(problems) => problems,
            _ => &[],
        }
    }
}

fn join_problems(problems: &[SubmissionProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
