// Season standings.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::db::{self, Database};
use crate::model::{Contestant, ContestantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// 1-based; contestants with equal totals share a rank.
    pub rank: usize,
    pub contestant: Contestant,
    pub total_points: i64,
    pub resolved_picks: u32,
}

/// Recompute one contestant's season total from scratch and refresh the cache.
pub fn recompute(db: &Database, contestant: ContestantId, season_year: i32) -> Result<i64> {
    db.transaction(|tx| db::recompute_season_total(tx, contestant, season_year))
        .with_context(|| format!("failed to recompute standings for contestant {contestant}"))
}

/// Recompute every contestant that has a pick in the season.
pub fn recompute_season(db: &Database, season_year: i32) -> Result<usize> {
    let count = db
        .transaction(|tx| {
            let contestants = db::contestants_with_picks_in_season(tx, season_year)?;
            for contestant in &contestants {
                db::recompute_season_total(tx, *contestant, season_year)?;
            }
            Ok::<_, rusqlite::Error>(contestants.len())
        })
        .context("failed to recompute season standings")?;
    Ok(count)
}

/// The league table for a season, best total first.
pub fn standings(db: &Database, season_year: i32) -> Result<Vec<Standing>> {
    let rows = db.standings_rows(season_year)?;
    let mut table = Vec::with_capacity(rows.len());
    let mut previous: Option<(i64, usize)> = None;

    for (index, (contestant, total_points, resolved_picks)) in rows.into_iter().enumerate() {
        let rank = match previous {
            Some((total, rank)) if total == total_points => rank,
            _ => index + 1,
        };
        previous = Some((total_points, rank));
        table.push(Standing {
            rank,
            contestant,
            total_points,
            resolved_picks,
        });
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GolferResult, NewTournament, Phase, PickId, ResultStatus, TournamentId};
    use crate::resolution::resolve_pick;
    use chrono::{TimeZone, Utc};

    fn add_tournament(db: &Database, external_id: &str, day: u32) -> TournamentId {
        db.insert_tournament(
            &NewTournament {
                external_id: external_id.into(),
                name: format!("Event {external_id}"),
                season_year: 2026,
                starts_at: Utc.with_ymd_and_hms(2026, 5, day, 12, 0, 0).unwrap(),
                ends_at: Utc.with_ymd_and_hms(2026, 5, day + 3, 23, 0, 0).unwrap(),
                purse: 10_000_000,
                is_team_event: false,
            },
            None,
        )
        .unwrap()
    }

    fn settled_pick(
        db: &Database,
        contestant: ContestantId,
        tournament: TournamentId,
        golfer_ext: &str,
        earnings: i64,
    ) -> PickId {
        let primary = db.upsert_golfer(golfer_ext, "P", golfer_ext, false).unwrap();
        let backup = db.upsert_golfer(&format!("{golfer_ext}b"), "B", golfer_ext, false).unwrap();
        db.add_field_entry(tournament, primary).unwrap();
        db.add_field_entry(tournament, backup).unwrap();
        db.upsert_result(&GolferResult {
            tournament_id: tournament,
            golfer_id: primary,
            status: ResultStatus::Complete,
            position: None,
            earnings: Some(earnings),
            rounds_completed: 4,
        })
        .unwrap();
        db.with_conn(|c| db::upsert_pick_row(c, contestant, tournament, primary, backup))
            .unwrap()
    }

    #[test]
    fn totals_count_only_resolved_picks_of_final_tournaments() {
        let db = Database::open(":memory:").unwrap();
        let alice = db.add_contestant("alice", "a@example.com", Some("Alice"), false).unwrap();
        let t1 = add_tournament(&db, "001", 1);
        let t2 = add_tournament(&db, "002", 8);
        let t3 = add_tournament(&db, "003", 15);

        let p1 = settled_pick(&db, alice, t1, "g1", 100_000);
        let p2 = settled_pick(&db, alice, t2, "g2", 50_000);
        settled_pick(&db, alice, t3, "g3", 999_999); // never resolved

        db.set_phase(t1, Phase::Final).unwrap();
        db.set_phase(t2, Phase::Final).unwrap();
        resolve_pick(&db, p1).unwrap();
        resolve_pick(&db, p2).unwrap();
        assert_eq!(recompute(&db, alice, 2026).unwrap(), 150_000);

        // A resolved pick whose tournament is no longer final stops counting.
        db.set_phase(t2, Phase::InProgress).unwrap();
        assert_eq!(recompute(&db, alice, 2026).unwrap(), 100_000);
    }

    #[test]
    fn table_is_ordered_with_shared_ranks() {
        let db = Database::open(":memory:").unwrap();
        let bob = db.add_contestant("bob", "b@example.com", None, false).unwrap();
        let alice = db.add_contestant("alice", "a@example.com", None, false).unwrap();
        let carol = db.add_contestant("carol", "c@example.com", None, false).unwrap();
        let t1 = add_tournament(&db, "001", 1);

        let pb = settled_pick(&db, bob, t1, "g1", 80_000);
        let pa = settled_pick(&db, alice, t1, "g2", 80_000);
        db.set_phase(t1, Phase::Final).unwrap();
        resolve_pick(&db, pb).unwrap();
        resolve_pick(&db, pa).unwrap();
        assert_eq!(recompute_season(&db, 2026).unwrap(), 2);

        let table = standings(&db, 2026).unwrap();
        let summary: Vec<(usize, &str, i64)> = table
            .iter()
            .map(|s| (s.rank, s.contestant.username.as_str(), s.total_points))
            .collect();
        assert_eq!(
            summary,
            vec![(1, "alice", 80_000), (1, "bob", 80_000), (3, "carol", 0)]
        );
        assert_eq!(table[2].contestant.id, carol);
        assert_eq!(table[0].resolved_picks, 1);
    }
}
