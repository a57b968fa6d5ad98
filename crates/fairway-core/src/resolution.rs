// Pick resolution: decide which golfer counts, award points and maintain the
// once-per-season usage of each golfer.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{self, Database};
use crate::error::{ResolveError, SkipReason};
use crate::model::{
    GolferResult, Phase, Pick, PickId, PickSlot, Resolution, SeasonUsage, Tournament, TournamentId,
};

/// The withdrawal-substitution rule.
///
/// The primary counts unless it withdrew before finishing two rounds. Then
/// the backup counts, unless it also withdrew early, in which case the
/// primary is charged for zero points and the backup stays available. Team
/// events halve the points (rounding down).
pub fn decide(
    pick: &Pick,
    primary: Option<&GolferResult>,
    backup: Option<&GolferResult>,
    is_team_event: bool,
) -> Result<Resolution, ResolveError> {
    let primary = primary.ok_or(ResolveError::MissingResult {
        pick: pick.id,
        slot: PickSlot::Primary,
        golfer: pick.primary,
    })?;

    let (active_slot, points) = if !primary.is_early_withdrawal() {
        (PickSlot::Primary, earnings(pick, PickSlot::Primary, primary)?)
    } else {
        let backup = backup.ok_or(ResolveError::MissingResult {
            pick: pick.id,
            slot: PickSlot::Backup,
            golfer: pick.backup,
        })?;
        if backup.is_early_withdrawal() {
            (PickSlot::Primary, 0)
        } else {
            (PickSlot::Backup, earnings(pick, PickSlot::Backup, backup)?)
        }
    };

    let points = if is_team_event { points.div_euclid(2) } else { points };
    Ok(Resolution {
        active_slot,
        active_golfer: pick.golfer(active_slot),
        points,
    })
}

fn earnings(pick: &Pick, slot: PickSlot, result: &GolferResult) -> Result<i64, ResolveError> {
    result.earnings.ok_or(ResolveError::MissingEarnings {
        pick: pick.id,
        slot,
        golfer: pick.golfer(slot),
    })
}

/// Resolve one pick and rewrite the season usage it owns, atomically.
///
/// Safe to call repeatedly: with unchanged results the outcome is identical
/// and exactly one usage row remains for the pick.
pub fn resolve_pick(db: &Database, pick_id: PickId) -> Result<Resolution, ResolveError> {
    db.transaction(|tx| {
        let pick = db::load_pick(tx, pick_id)?.ok_or(ResolveError::PickNotFound(pick_id))?;
        let tournament = db::load_tournament(tx, pick.tournament_id)?
            .ok_or(ResolveError::TournamentNotFound(pick.tournament_id))?;
        if tournament.phase != Phase::Final {
            return Err(ResolveError::TournamentNotFinal {
                tournament: tournament.id,
                phase: tournament.phase,
            });
        }

        let primary = db::load_result(tx, tournament.id, pick.primary)?;
        let backup = db::load_result(tx, tournament.id, pick.backup)?;
        let resolution = decide(&pick, primary.as_ref(), backup.as_ref(), tournament.is_team_event)?;

        revalidate(tx, &pick, &tournament, &resolution)?;

        db::write_resolution(tx, pick.id, &resolution)?;
        db::delete_usage_for_pick(tx, pick.id)?;
        db::insert_usage(
            tx,
            &SeasonUsage {
                contestant_id: pick.contestant_id,
                golfer_id: resolution.active_golfer,
                season_year: tournament.season_year,
                pick_id: pick.id,
            },
        )?;
        db::recompute_season_total(tx, pick.contestant_id, tournament.season_year)?;
        Ok(resolution)
    })
}

/// Submission-time rules that must still hold when the pick is settled.
fn revalidate(
    conn: &Connection,
    pick: &Pick,
    tournament: &Tournament,
    resolution: &Resolution,
) -> Result<(), ResolveError> {
    for slot in [PickSlot::Primary, PickSlot::Backup] {
        let golfer = pick.golfer(slot);
        if !db::is_in_field(conn, tournament.id, golfer)? {
            return Err(ResolveError::IntegrityConflict {
                pick: pick.id,
                reason: format!("{slot} golfer {golfer} is not in the field"),
            });
        }
    }

    let owner = db::usage_owner(
        conn,
        pick.contestant_id,
        resolution.active_golfer,
        tournament.season_year,
    )?;
    match owner {
        Some(owner) if owner != pick.id => Err(ResolveError::IntegrityConflict {
            pick: pick.id,
            reason: format!(
                "golfer {} already used this season by pick {owner}",
                resolution.active_golfer
            ),
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPick {
    pub pick: PickId,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: SkipReason,
}

fn serialize_reason<S: serde::Serializer>(reason: &SkipReason, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(reason)
}

/// Outcome of resolving every pick of a tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub tournament: TournamentId,
    pub resolved: usize,
    pub skipped: Vec<SkippedPick>,
}

impl BatchReport {
    pub fn skipped_ids(&self) -> Vec<PickId> {
        self.skipped.iter().map(|s| s.pick).collect()
    }
}

/// Resolve each pick of a final tournament in its own transaction. A pick
/// that fails is reported and left unresolved; it never undoes the others.
pub fn resolve_tournament(db: &Database, tournament_id: TournamentId) -> Result<BatchReport, ResolveError> {
    let tournament = db
        .with_conn(|conn| db::load_tournament(conn, tournament_id))?
        .ok_or(ResolveError::TournamentNotFound(tournament_id))?;
    if tournament.phase != Phase::Final {
        return Err(ResolveError::TournamentNotFinal {
            tournament: tournament.id,
            phase: tournament.phase,
        });
    }

    let pick_ids = db.with_conn(|conn| db::pick_ids_for_tournament(conn, tournament_id))?;
    let mut report = BatchReport {
        tournament: tournament_id,
        resolved: 0,
        skipped: Vec::new(),
    };

    for pick_id in pick_ids {
        match resolve_pick(db, pick_id) {
            Ok(resolution) => {
                debug!(
                    pick = %pick_id,
                    slot = %resolution.active_slot,
                    golfer = %resolution.active_golfer,
                    points = resolution.points,
                    "pick resolved"
                );
                report.resolved += 1;
            }
            Err(err) => {
                if err.is_deferred() {
                    info!(pick = %pick_id, "pick deferred: {err}");
                } else {
                    warn!(pick = %pick_id, "pick left unresolved: {err}");
                }
                report.skipped.push(SkippedPick {
                    pick: pick_id,
                    reason: SkipReason::from(&err),
                });
            }
        }
    }

    info!(
        tournament = %tournament.name,
        resolved = report.resolved,
        skipped = report.skipped.len(),
        "resolution batch complete"
    );
    Ok(report)
}
