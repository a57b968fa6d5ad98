// Pick submission, operator overrides and the season-usage query surface.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::db::{self, Database};
use crate::error::{SubmissionError, SubmissionProblem};
use crate::lifecycle;
use crate::model::{
    ContestantId, Golfer, GolferId, Phase, Pick, PickId, PickSlot, Tournament, TournamentId,
};

/// Create or edit a contestant's pick for a tournament.
///
/// Every problem with the submission is reported at once. Nothing is written
/// unless the submission is valid.
pub fn submit_pick(
    db: &Database,
    contestant: ContestantId,
    tournament_id: TournamentId,
    primary: GolferId,
    backup: GolferId,
    now: DateTime<Utc>,
) -> Result<Pick, SubmissionError> {
    db.transaction(|tx| {
        if db::load_contestant(tx, contestant)?.is_none() {
            return Err(SubmissionError::ContestantNotFound(contestant));
        }
        let tournament = db::load_tournament(tx, tournament_id)?
            .ok_or(SubmissionError::TournamentNotFound(tournament_id))?;
        let existing = db::load_pick_for(tx, contestant, tournament_id)?;

        let mut problems = Vec::new();
        if tournament.is_cutoff_passed(now)
            || lifecycle::next_phase(&tournament, now, None) >= Phase::InProgress
        {
            problems.push(SubmissionProblem::CutoffPassed);
        }
        problems.extend(selection_problems(
            tx,
            &tournament,
            contestant,
            existing.as_ref().map(|p| p.id),
            primary,
            backup,
        )?);
        if !problems.is_empty() {
            return Err(SubmissionError::InvalidPickSubmission(problems));
        }

        let pick_id = db::upsert_pick_row(tx, contestant, tournament_id, primary, backup)?;
        let pick = db::load_pick(tx, pick_id)?.ok_or(SubmissionError::PickNotFound(pick_id))?;
        info!(
            pick = %pick.id,
            contestant = %contestant,
            tournament = %tournament.name,
            edited = existing.is_some(),
            "pick submitted"
        );
        Ok(pick)
    })
}

/// Operator override: replace a pick's selections regardless of the cutoff.
///
/// Any existing resolution and the usage it produced are cleared and the
/// contestant's standings recomputed; the next resolution batch settles the
/// pick again.
pub fn override_pick(
    db: &Database,
    pick_id: PickId,
    primary: GolferId,
    backup: GolferId,
) -> Result<Pick, SubmissionError> {
    db.transaction(|tx| {
        let pick = db::load_pick(tx, pick_id)?.ok_or(SubmissionError::PickNotFound(pick_id))?;
        let tournament = db::load_tournament(tx, pick.tournament_id)?
            .ok_or(SubmissionError::TournamentNotFound(pick.tournament_id))?;

        let problems =
            selection_problems(tx, &tournament, pick.contestant_id, Some(pick.id), primary, backup)?;
        if !problems.is_empty() {
            return Err(SubmissionError::InvalidPickSubmission(problems));
        }

        db::update_pick_selection(tx, pick.id, primary, backup)?;
        let released = db::delete_usage_for_pick(tx, pick.id)?;
        let total = db::recompute_season_total(tx, pick.contestant_id, tournament.season_year)?;
        let updated = db::load_pick(tx, pick.id)?.ok_or(SubmissionError::PickNotFound(pick.id))?;
        info!(
            pick = %pick.id,
            tournament = %tournament.name,
            released_usage = released,
            season_total = total,
            "pick overridden"
        );
        Ok(updated)
    })
}

/// Checks shared by submission and override. `own_pick` is the pick being
/// edited, whose own usage rows do not count against it.
fn selection_problems(
    conn: &Connection,
    tournament: &Tournament,
    contestant: ContestantId,
    own_pick: Option<PickId>,
    primary: GolferId,
    backup: GolferId,
) -> rusqlite::Result<Vec<SubmissionProblem>> {
    let mut problems = Vec::new();
    if primary == backup {
        problems.push(SubmissionProblem::SameGolfer);
    }

    for (slot, golfer_id) in [(PickSlot::Primary, primary), (PickSlot::Backup, backup)] {
        if slot == PickSlot::Backup && primary == backup {
            break;
        }
        let Some(golfer) = db::load_golfer(conn, golfer_id)? else {
            problems.push(SubmissionProblem::UnknownGolfer(slot));
            continue;
        };
        if !db::is_in_field(conn, tournament.id, golfer_id)? {
            problems.push(SubmissionProblem::NotInField(slot));
        }
        if golfer.is_amateur {
            problems.push(SubmissionProblem::Amateur(slot));
        }
        let owner = db::usage_owner(conn, contestant, golfer_id, tournament.season_year)?;
        if owner.is_some_and(|owner| Some(owner) != own_pick) {
            problems.push(SubmissionProblem::AlreadyUsed(slot));
        }
    }
    Ok(problems)
}

/// Golfers the contestant has consumed this season.
pub fn used_golfers(db: &Database, contestant: ContestantId, season_year: i32) -> Result<Vec<GolferId>> {
    db.used_golfers(contestant, season_year)
}

/// Field members the contestant may still pick for `tournament`: not
/// amateurs and not already used this season.
pub fn available_golfers(
    db: &Database,
    contestant: ContestantId,
    tournament_id: TournamentId,
) -> Result<Vec<Golfer>> {
    let Some(tournament) = db.tournament(tournament_id)? else {
        return Ok(Vec::new());
    };
    let used = db.used_golfers(contestant, tournament.season_year)?;
    let golfers = db
        .field(tournament_id)?
        .into_iter()
        .filter(|g| !g.is_amateur && !used.contains(&g.id))
        .collect();
    Ok(golfers)
}
