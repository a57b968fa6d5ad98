// Entity records: contestants, golfers, tournaments, field entries, results,
// picks and season usage.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map($name)
            }
        }
    };
}

row_id!(
    /// Row id of a league contestant.
    ContestantId
);
row_id!(
    /// Row id of a golfer (not the provider's player id).
    GolferId
);
row_id!(
    /// Row id of a tournament (not the provider's tournament id).
    TournamentId
);
row_id!(
    /// Row id of a pick.
    PickId
);

// ---------------------------------------------------------------------------
// Contestant / Golfer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contestant {
    pub id: ContestantId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

impl Contestant {
    /// Display name, falling back to the username.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Golfer {
    pub id: GolferId,
    /// Provider player id. Stable across syncs.
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub is_amateur: bool,
}

impl Golfer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ---------------------------------------------------------------------------
// Tournament
// ---------------------------------------------------------------------------

/// Lifecycle phase of a tournament. Ordered: a tournament only ever moves
/// towards `Final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    NotYetOpen,
    OpenForPicks,
    InProgress,
    Final,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotYetOpen => "not_yet_open",
            Phase::OpenForPicks => "open_for_picks",
            Phase::InProgress => "in_progress",
            Phase::Final => "final",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "not_yet_open" => Some(Phase::NotYetOpen),
            "open_for_picks" => Some(Phase::OpenForPicks),
            "in_progress" => Some(Phase::InProgress),
            "final" => Some(Phase::Final),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Phase {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Phase {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Phase::from_db(s).ok_or_else(|| FromSqlError::Other(format!("unknown phase `{s}`").into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    /// Provider tournament id; unique together with `season_year`.
    pub external_id: String,
    pub name: String,
    pub season_year: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Pick submission cutoff (first tee time). `None` until the field is known.
    pub pick_deadline: Option<DateTime<Utc>>,
    /// Total purse in dollars.
    pub purse: i64,
    /// Team events split the purse two ways, so awarded points are halved.
    pub is_team_event: bool,
    pub phase: Phase,
    pub week_number: Option<u32>,
    /// Official earnings have been ingested; projections must not overwrite them.
    pub results_finalized: bool,
}

impl Tournament {
    /// Whether picks are read-only at `now`.
    pub fn is_cutoff_passed(&self, now: DateTime<Utc>) -> bool {
        if self.phase >= Phase::InProgress {
            return true;
        }
        self.pick_deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Tournament fields needed to create or refresh a schedule entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTournament {
    pub external_id: String,
    pub name: String,
    pub season_year: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub purse: i64,
    pub is_team_event: bool,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultStatus {
    InProgress,
    Cut,
    Withdrawn,
    Disqualified,
    Complete,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::InProgress => "in_progress",
            ResultStatus::Cut => "cut",
            ResultStatus::Withdrawn => "wd",
            ResultStatus::Disqualified => "dq",
            ResultStatus::Complete => "complete",
        }
    }

    /// Parse a stored or provider status string.
    ///
    /// The provider reports players still on the course as `active`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "in_progress" | "active" | "in progress" => Some(ResultStatus::InProgress),
            "cut" => Some(ResultStatus::Cut),
            "wd" | "withdrawn" => Some(ResultStatus::Withdrawn),
            "dq" | "disqualified" => Some(ResultStatus::Disqualified),
            "complete" | "finished" => Some(ResultStatus::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ResultStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ResultStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ResultStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown result status `{s}`").into()))
    }
}

/// Rounds a golfer must complete before a withdrawal stops voiding the pick.
pub const ROUNDS_BEFORE_WD_COUNTS: u8 = 2;

/// One golfer's outcome for one tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GolferResult {
    pub tournament_id: TournamentId,
    pub golfer_id: GolferId,
    pub status: ResultStatus,
    /// Finish position, e.g. `"1"`, `"T5"`, `"CUT"`.
    pub position: Option<String>,
    /// Prize money in dollars. `None` means not yet known, which is not the
    /// same as having earned nothing.
    pub earnings: Option<i64>,
    pub rounds_completed: u8,
}

impl GolferResult {
    /// Withdrew before completing two rounds.
    pub fn is_early_withdrawal(&self) -> bool {
        self.status == ResultStatus::Withdrawn && self.rounds_completed < ROUNDS_BEFORE_WD_COUNTS
    }
}

// ---------------------------------------------------------------------------
// Picks
// ---------------------------------------------------------------------------

/// Which of the two selections in a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickSlot {
    Primary,
    Backup,
}

impl fmt::Display for PickSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickSlot::Primary => f.write_str("primary"),
            PickSlot::Backup => f.write_str("backup"),
        }
    }
}

/// Outcome of resolving a pick.
///
/// The active slot is also the one charged against season usage, so the
/// primary/backup "used" flags are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub active_slot: PickSlot,
    pub active_golfer: GolferId,
    pub points: i64,
}

impl Resolution {
    pub fn primary_used(&self) -> bool {
        self.active_slot == PickSlot::Primary
    }

    pub fn backup_used(&self) -> bool {
        self.active_slot == PickSlot::Backup
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub id: PickId,
    pub contestant_id: ContestantId,
    pub tournament_id: TournamentId,
    pub primary: GolferId,
    pub backup: GolferId,
    /// `None` until the tournament is final and the pick has been resolved.
    pub resolution: Option<Resolution>,
}

impl Pick {
    pub fn golfer(&self, slot: PickSlot) -> GolferId {
        match slot {
            PickSlot::Primary => self.primary,
            PickSlot::Backup => self.backup,
        }
    }
}

/// A golfer consumed by a contestant for a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonUsage {
    pub contestant_id: ContestantId,
    pub golfer_id: GolferId,
    pub season_year: i32,
    /// The resolved pick this usage was derived from.
    pub pick_id: PickId,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
