// SQLite persistence layer for the league.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::model::{
    Contestant, ContestantId, Golfer, GolferId, GolferResult, NewTournament, Phase, Pick, PickId,
    PickSlot, Resolution, SeasonUsage, Tournament, TournamentId,
};

/// SQLite-backed store for contestants, golfers, tournaments, fields,
/// results, picks, season usage and the standings cache.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS contestants (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                username     TEXT NOT NULL UNIQUE,
                email        TEXT NOT NULL UNIQUE,
                display_name TEXT,
                is_admin     INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS golfers (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                is_amateur  INTEGER NOT NULL DEFAULT 0,
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS tournaments (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id       TEXT NOT NULL,
                name              TEXT NOT NULL,
                season_year       INTEGER NOT NULL,
                starts_at         TEXT NOT NULL,
                ends_at           TEXT NOT NULL,
                pick_deadline     TEXT,
                purse             INTEGER NOT NULL DEFAULT 0,
                is_team_event     INTEGER NOT NULL DEFAULT 0,
                phase             TEXT NOT NULL DEFAULT 'not_yet_open',
                week_number       INTEGER,
                results_finalized INTEGER NOT NULL DEFAULT 0,
                UNIQUE(external_id, season_year)
            );

            CREATE TABLE IF NOT EXISTS field_entries (
                tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
                golfer_id     INTEGER NOT NULL REFERENCES golfers(id),
                is_alternate  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (tournament_id, golfer_id)
            );

            CREATE TABLE IF NOT EXISTS results (
                tournament_id    INTEGER NOT NULL REFERENCES tournaments(id),
                golfer_id        INTEGER NOT NULL REFERENCES golfers(id),
                status           TEXT NOT NULL,
                position         TEXT,
                earnings         INTEGER,
                rounds_completed INTEGER NOT NULL DEFAULT 0
                                 CHECK (rounds_completed BETWEEN 0 AND 4),
                updated_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (tournament_id, golfer_id)
            );

            CREATE TABLE IF NOT EXISTS picks (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                contestant_id     INTEGER NOT NULL REFERENCES contestants(id),
                tournament_id     INTEGER NOT NULL REFERENCES tournaments(id),
                primary_golfer_id INTEGER NOT NULL REFERENCES golfers(id),
                backup_golfer_id  INTEGER NOT NULL REFERENCES golfers(id),
                active_golfer_id  INTEGER REFERENCES golfers(id),
                points            INTEGER,
                primary_used      INTEGER NOT NULL DEFAULT 0,
                backup_used       INTEGER NOT NULL DEFAULT 0,
                updated_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(contestant_id, tournament_id),
                CHECK (primary_golfer_id <> backup_golfer_id),
                CHECK (NOT (primary_used AND backup_used))
            );

            CREATE TABLE IF NOT EXISTS season_usage (
                contestant_id INTEGER NOT NULL REFERENCES contestants(id),
                golfer_id     INTEGER NOT NULL REFERENCES golfers(id),
                season_year   INTEGER NOT NULL,
                pick_id       INTEGER NOT NULL REFERENCES picks(id),
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (contestant_id, golfer_id, season_year)
            );

            CREATE TABLE IF NOT EXISTS season_standings (
                contestant_id  INTEGER NOT NULL REFERENCES contestants(id),
                season_year    INTEGER NOT NULL,
                total_points   INTEGER NOT NULL,
                resolved_picks INTEGER NOT NULL,
                PRIMARY KEY (contestant_id, season_year)
            );

            CREATE TABLE IF NOT EXISTS notifications_sent (
                tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
                kind          TEXT NOT NULL,
                sent_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (tournament_id, kind)
            );
            ",
        )
        .context("failed to create database schema")?;

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_season_usage_pick ON season_usage(pick_id);
             CREATE INDEX IF NOT EXISTS idx_picks_tournament ON picks(tournament_id);",
        )
        .context("failed to create indexes")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside one transaction. Commits if `f` returns `Ok`; any error
    /// drops the transaction, which rolls it back.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` against the connection outside of any transaction.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.conn();
        f(&conn)
    }

    // ------------------------------------------------------------------
    // Contestants
    // ------------------------------------------------------------------

    pub fn add_contestant(
        &self,
        username: &str,
        email: &str,
        display_name: Option<&str>,
        is_admin: bool,
    ) -> Result<ContestantId> {
        let conn = self.conn();
        let id = conn
            .query_row(
                "INSERT INTO contestants (username, email, display_name, is_admin)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id",
                params![username, email, display_name, is_admin],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to add contestant {username}"))?;
        Ok(id)
    }

    pub fn contestant(&self, id: ContestantId) -> Result<Option<Contestant>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, email, display_name, is_admin FROM contestants WHERE id = ?1",
            params![id],
            contestant_from_row,
        )
        .optional()
        .context("failed to load contestant")
    }

    pub fn contestant_by_username(&self, username: &str) -> Result<Option<Contestant>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, email, display_name, is_admin FROM contestants WHERE username = ?1",
            params![username],
            contestant_from_row,
        )
        .optional()
        .context("failed to load contestant by username")
    }

    pub fn contestants(&self) -> Result<Vec<Contestant>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, username, email, display_name, is_admin
                 FROM contestants ORDER BY lower(username)",
            )
            .context("failed to prepare contestants query")?;
        let rows = stmt
            .query_map([], contestant_from_row)
            .context("failed to query contestants")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map contestant rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Golfers
    // ------------------------------------------------------------------

    /// Insert a golfer or refresh the name/amateur flag of an existing one,
    /// keyed by provider id. Returns the golfer's row id.
    pub fn upsert_golfer(
        &self,
        external_id: &str,
        first_name: &str,
        last_name: &str,
        is_amateur: bool,
    ) -> Result<GolferId> {
        let conn = self.conn();
        let id = upsert_golfer_row(&conn, external_id, first_name, last_name, is_amateur)
            .context("failed to upsert golfer")?;
        Ok(id)
    }

    pub fn golfer(&self, id: GolferId) -> Result<Option<Golfer>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, external_id, first_name, last_name, is_amateur FROM golfers WHERE id = ?1",
            params![id],
            golfer_from_row,
        )
        .optional()
        .context("failed to load golfer")
    }

    pub fn golfer_by_external_id(&self, external_id: &str) -> Result<Option<Golfer>> {
        let conn = self.conn();
        golfer_by_external_id(&conn, external_id).context("failed to load golfer by external id")
    }

    // ------------------------------------------------------------------
    // Tournaments
    // ------------------------------------------------------------------

    /// Insert a new schedule entry. Fails if `(external_id, season_year)`
    /// already exists.
    pub fn insert_tournament(
        &self,
        new: &NewTournament,
        week_number: Option<u32>,
    ) -> Result<TournamentId> {
        let conn = self.conn();
        let id = conn
            .query_row(
                "INSERT INTO tournaments
                    (external_id, name, season_year, starts_at, ends_at, purse, is_team_event, week_number)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 RETURNING id",
                params![
                    new.external_id,
                    new.name,
                    new.season_year,
                    new.starts_at,
                    new.ends_at,
                    new.purse,
                    new.is_team_event,
                    week_number,
                ],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to insert tournament {}", new.name))?;
        Ok(id)
    }

    /// Refresh the listing of an already-imported tournament. A `purse` of
    /// `None` keeps the stored purse.
    pub fn update_tournament_listing(
        &self,
        id: TournamentId,
        name: &str,
        purse: Option<i64>,
        is_team_event: bool,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE tournaments
             SET name = ?2, purse = COALESCE(?3, purse), is_team_event = ?4
             WHERE id = ?1",
            params![id, name, purse, is_team_event],
        )
        .context("failed to update tournament listing")?;
        Ok(())
    }

    pub fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>> {
        let conn = self.conn();
        load_tournament(&conn, id).context("failed to load tournament")
    }

    pub fn tournament_by_external_id(
        &self,
        external_id: &str,
        season_year: i32,
    ) -> Result<Option<Tournament>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE external_id = ?1 AND season_year = ?2"),
            params![external_id, season_year],
            tournament_from_row,
        )
        .optional()
        .context("failed to load tournament by external id")
    }

    /// All tournaments of a season, in schedule order.
    pub fn tournaments_for_season(&self, season_year: i32) -> Result<Vec<Tournament>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments
                 WHERE season_year = ?1 ORDER BY starts_at, id"
            ))
            .context("failed to prepare season tournaments query")?;
        let rows = stmt
            .query_map(params![season_year], tournament_from_row)
            .context("failed to query season tournaments")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map tournament rows")?;
        Ok(rows)
    }

    /// Every tournament across seasons, in schedule order.
    pub fn all_tournaments(&self) -> Result<Vec<Tournament>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments ORDER BY starts_at, id"
            ))
            .context("failed to prepare tournaments query")?;
        let rows = stmt
            .query_map([], tournament_from_row)
            .context("failed to query tournaments")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map tournament rows")?;
        Ok(rows)
    }

    /// The week number the next imported tournament of the season gets.
    pub fn next_week_number(&self, season_year: i32) -> Result<u32> {
        let conn = self.conn();
        let max: Option<u32> = conn
            .query_row(
                "SELECT MAX(week_number) FROM tournaments WHERE season_year = ?1",
                params![season_year],
                |row| row.get(0),
            )
            .context("failed to read max week number")?;
        Ok(max.unwrap_or(0) + 1)
    }

    pub fn set_pick_deadline(&self, id: TournamentId, deadline: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE tournaments SET pick_deadline = ?2 WHERE id = ?1",
            params![id, deadline],
        )
        .context("failed to set pick deadline")?;
        Ok(())
    }

    /// Persist a phase. Callers are responsible for monotonicity; see
    /// `Lifecycle::refresh`.
    pub fn set_phase(&self, id: TournamentId, phase: Phase) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE tournaments SET phase = ?2 WHERE id = ?1",
            params![id, phase],
        )
        .context("failed to set tournament phase")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Field
    // ------------------------------------------------------------------

    /// Add a golfer to a tournament field. Returns `false` if the entry
    /// already existed.
    pub fn add_field_entry(&self, tournament: TournamentId, golfer: GolferId) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO field_entries (tournament_id, golfer_id) VALUES (?1, ?2)",
                params![tournament, golfer],
            )
            .context("failed to add field entry")?;
        Ok(inserted > 0)
    }

    pub fn field(&self, tournament: TournamentId) -> Result<Vec<Golfer>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT g.id, g.external_id, g.first_name, g.last_name, g.is_amateur
                 FROM field_entries f JOIN golfers g ON g.id = f.golfer_id
                 WHERE f.tournament_id = ?1
                 ORDER BY g.last_name, g.first_name",
            )
            .context("failed to prepare field query")?;
        let rows = stmt
            .query_map(params![tournament], golfer_from_row)
            .context("failed to query field")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map field rows")?;
        Ok(rows)
    }

    pub fn field_size(&self, tournament: TournamentId) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM field_entries WHERE tournament_id = ?1",
                params![tournament],
                |row| row.get(0),
            )
            .context("failed to count field entries")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Insert or overwrite one golfer's result.
    pub fn upsert_result(&self, result: &GolferResult) -> Result<()> {
        let conn = self.conn();
        upsert_result_row(&conn, result).context("failed to upsert result")?;
        Ok(())
    }

    pub fn result(&self, tournament: TournamentId, golfer: GolferId) -> Result<Option<GolferResult>> {
        let conn = self.conn();
        load_result(&conn, tournament, golfer).context("failed to load result")
    }

    pub fn results(&self, tournament: TournamentId) -> Result<Vec<GolferResult>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RESULT_COLUMNS} FROM results WHERE tournament_id = ?1 ORDER BY golfer_id"
            ))
            .context("failed to prepare results query")?;
        let rows = stmt
            .query_map(params![tournament], result_from_row)
            .context("failed to query results")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map result rows")?;
        Ok(rows)
    }

    /// Write official results and mark the tournament finalized and final in
    /// a single transaction. Either everything lands or nothing changes.
    pub fn finalize_results(&self, tournament: TournamentId, results: &[GolferResult]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin finalize transaction")?;
        for result in results {
            upsert_result_row(&tx, result).context("failed to upsert final result")?;
        }
        tx.execute(
            "UPDATE tournaments SET results_finalized = 1, phase = ?2 WHERE id = ?1",
            params![tournament, Phase::Final],
        )
        .context("failed to mark tournament finalized")?;
        tx.commit().context("failed to commit finalize_results")?;
        Ok(results.len())
    }

    // ------------------------------------------------------------------
    // Picks
    // ------------------------------------------------------------------

    pub fn pick(&self, id: PickId) -> Result<Option<Pick>> {
        let conn = self.conn();
        load_pick(&conn, id).context("failed to load pick")
    }

    pub fn pick_for(&self, contestant: ContestantId, tournament: TournamentId) -> Result<Option<Pick>> {
        let conn = self.conn();
        load_pick_for(&conn, contestant, tournament).context("failed to load contestant pick")
    }

    /// Picks for a tournament, ordered by id.
    pub fn picks_for_tournament(&self, tournament: TournamentId) -> Result<Vec<Pick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PICK_COLUMNS} FROM picks WHERE tournament_id = ?1 ORDER BY id"
            ))
            .context("failed to prepare tournament picks query")?;
        let rows = stmt
            .query_map(params![tournament], pick_from_row)
            .context("failed to query tournament picks")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map pick rows")?;
        Ok(rows)
    }

    pub fn picks_for_contestant(&self, contestant: ContestantId) -> Result<Vec<Pick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PICK_COLUMNS} FROM picks WHERE contestant_id = ?1 ORDER BY id"
            ))
            .context("failed to prepare contestant picks query")?;
        let rows = stmt
            .query_map(params![contestant], pick_from_row)
            .context("failed to query contestant picks")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map pick rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Season usage
    // ------------------------------------------------------------------

    /// Golfers a contestant can no longer pick this season.
    pub fn used_golfers(&self, contestant: ContestantId, season_year: i32) -> Result<Vec<GolferId>> {
        let conn = self.conn();
        let usage = load_usage(&conn, contestant, season_year).context("failed to load season usage")?;
        Ok(usage.into_iter().map(|u| u.golfer_id).collect())
    }

    pub fn season_usage(&self, contestant: ContestantId, season_year: i32) -> Result<Vec<SeasonUsage>> {
        let conn = self.conn();
        load_usage(&conn, contestant, season_year).context("failed to load season usage")
    }

    // ------------------------------------------------------------------
    // Standings cache
    // ------------------------------------------------------------------

    /// Cached season total, or `None` if never computed.
    pub fn cached_total(&self, contestant: ContestantId, season_year: i32) -> Result<Option<i64>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT total_points FROM season_standings WHERE contestant_id = ?1 AND season_year = ?2",
            params![contestant, season_year],
            |row| row.get(0),
        )
        .optional()
        .context("failed to read cached total")
    }

    /// Every contestant with their cached season total and resolved pick
    /// count (zero when never computed), best total first, ties by name.
    pub fn standings_rows(&self, season_year: i32) -> Result<Vec<(Contestant, i64, u32)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.username, c.email, c.display_name, c.is_admin,
                        COALESCE(s.total_points, 0), COALESCE(s.resolved_picks, 0)
                 FROM contestants c
                 LEFT JOIN season_standings s
                        ON s.contestant_id = c.id AND s.season_year = ?1
                 ORDER BY COALESCE(s.total_points, 0) DESC,
                          lower(COALESCE(c.display_name, c.username))",
            )
            .context("failed to prepare standings query")?;
        let rows = stmt
            .query_map(params![season_year], |row| {
                Ok((contestant_from_row(row)?, row.get(5)?, row.get(6)?))
            })
            .context("failed to query standings")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to map standings rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Notification bookkeeping
    // ------------------------------------------------------------------

    /// Record that a notice of `kind` went out for `tournament`. Returns
    /// `false` if it had already been recorded.
    pub fn mark_notified(&self, tournament: TournamentId, kind: &str) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO notifications_sent (tournament_id, kind) VALUES (?1, ?2)",
                params![tournament, kind],
            )
            .context("failed to record notification")?;
        Ok(inserted > 0)
    }

    /// Forget a recorded notice so it may be sent again (used when delivery
    /// fails after the notice was claimed).
    pub fn unmark_notified(&self, tournament: TournamentId, kind: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM notifications_sent WHERE tournament_id = ?1 AND kind = ?2",
            params![tournament, kind],
        )
        .context("failed to clear notification record")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers shared by `Database` methods and transactional callers
// ---------------------------------------------------------------------------

const TOURNAMENT_COLUMNS: &str = "id, external_id, name, season_year, starts_at, ends_at, \
     pick_deadline, purse, is_team_event, phase, week_number, results_finalized";

const RESULT_COLUMNS: &str =
    "tournament_id, golfer_id, status, position, earnings, rounds_completed";

const PICK_COLUMNS: &str = "id, contestant_id, tournament_id, primary_golfer_id, backup_golfer_id, \
     active_golfer_id, points, primary_used, backup_used";

fn contestant_from_row(row: &Row<'_>) -> rusqlite::Result<Contestant> {
    Ok(Contestant {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        is_admin: row.get(4)?,
    })
}

fn golfer_from_row(row: &Row<'_>) -> rusqlite::Result<Golfer> {
    Ok(Golfer {
        id: row.get(0)?,
        external_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        is_amateur: row.get(4)?,
    })
}

fn tournament_from_row(row: &Row<'_>) -> rusqlite::Result<Tournament> {
    Ok(Tournament {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        season_year: row.get(3)?,
        starts_at: row.get(4)?,
        ends_at: row.get(5)?,
        pick_deadline: row.get(6)?,
        purse: row.get(7)?,
        is_team_event: row.get(8)?,
        phase: row.get(9)?,
        week_number: row.get(10)?,
        results_finalized: row.get(11)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<GolferResult> {
    Ok(GolferResult {
        tournament_id: row.get(0)?,
        golfer_id: row.get(1)?,
        status: row.get(2)?,
        position: row.get(3)?,
        earnings: row.get(4)?,
        rounds_completed: row.get(5)?,
    })
}

fn pick_from_row(row: &Row<'_>) -> rusqlite::Result<Pick> {
    let active: Option<GolferId> = row.get(5)?;
    let points: Option<i64> = row.get(6)?;
    let primary_used: bool = row.get(7)?;
    let resolution = match (active, points) {
        (Some(active_golfer), Some(points)) => Some(Resolution {
            active_slot: if primary_used {
                PickSlot::Primary
            } else {
                PickSlot::Backup
            },
            active_golfer,
            points,
        }),
        _ => None,
    };
    Ok(Pick {
        id: row.get(0)?,
        contestant_id: row.get(1)?,
        tournament_id: row.get(2)?,
        primary: row.get(3)?,
        backup: row.get(4)?,
        resolution,
    })
}

pub(crate) fn load_contestant(
    conn: &Connection,
    id: ContestantId,
) -> rusqlite::Result<Option<Contestant>> {
    conn.query_row(
        "SELECT id, username, email, display_name, is_admin FROM contestants WHERE id = ?1",
        params![id],
        contestant_from_row,
    )
    .optional()
}

pub(crate) fn upsert_golfer_row(
    conn: &Connection,
    external_id: &str,
    first_name: &str,
    last_name: &str,
    is_amateur: bool,
) -> rusqlite::Result<GolferId> {
    conn.query_row(
        "INSERT INTO golfers (external_id, first_name, last_name, is_amateur)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(external_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name  = excluded.last_name,
            is_amateur = excluded.is_amateur,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         RETURNING id",
        params![external_id, first_name, last_name, is_amateur],
        |row| row.get(0),
    )
}

pub(crate) fn golfer_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> rusqlite::Result<Option<Golfer>> {
    conn.query_row(
        "SELECT id, external_id, first_name, last_name, is_amateur FROM golfers WHERE external_id = ?1",
        params![external_id],
        golfer_from_row,
    )
    .optional()
}

pub(crate) fn load_golfer(conn: &Connection, id: GolferId) -> rusqlite::Result<Option<Golfer>> {
    conn.query_row(
        "SELECT id, external_id, first_name, last_name, is_amateur FROM golfers WHERE id = ?1",
        params![id],
        golfer_from_row,
    )
    .optional()
}

pub(crate) fn load_tournament(
    conn: &Connection,
    id: TournamentId,
) -> rusqlite::Result<Option<Tournament>> {
    conn.query_row(
        &format!("SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = ?1"),
        params![id],
        tournament_from_row,
    )
    .optional()
}

pub(crate) fn upsert_result_row(conn: &Connection, result: &GolferResult) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO results (tournament_id, golfer_id, status, position, earnings, rounds_completed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(tournament_id, golfer_id) DO UPDATE SET
            status           = excluded.status,
            position         = excluded.position,
            earnings         = excluded.earnings,
            rounds_completed = excluded.rounds_completed,
            updated_at       = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![
            result.tournament_id,
            result.golfer_id,
            result.status,
            result.position,
            result.earnings,
            result.rounds_completed,
        ],
    )?;
    Ok(())
}

pub(crate) fn load_result(
    conn: &Connection,
    tournament: TournamentId,
    golfer: GolferId,
) -> rusqlite::Result<Option<GolferResult>> {
    conn.query_row(
        &format!("SELECT {RESULT_COLUMNS} FROM results WHERE tournament_id = ?1 AND golfer_id = ?2"),
        params![tournament, golfer],
        result_from_row,
    )
    .optional()
}

pub(crate) fn is_in_field(
    conn: &Connection,
    tournament: TournamentId,
    golfer: GolferId,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM field_entries WHERE tournament_id = ?1 AND golfer_id = ?2)",
        params![tournament, golfer],
        |row| row.get(0),
    )
}

pub(crate) fn load_pick(conn: &Connection, id: PickId) -> rusqlite::Result<Option<Pick>> {
    conn.query_row(
        &format!("SELECT {PICK_COLUMNS} FROM picks WHERE id = ?1"),
        params![id],
        pick_from_row,
    )
    .optional()
}

pub(crate) fn load_pick_for(
    conn: &Connection,
    contestant: ContestantId,
    tournament: TournamentId,
) -> rusqlite::Result<Option<Pick>> {
    conn.query_row(
        &format!("SELECT {PICK_COLUMNS} FROM picks WHERE contestant_id = ?1 AND tournament_id = ?2"),
        params![contestant, tournament],
        pick_from_row,
    )
    .optional()
}

pub(crate) fn pick_ids_for_tournament(
    conn: &Connection,
    tournament: TournamentId,
) -> rusqlite::Result<Vec<PickId>> {
    let mut stmt = conn.prepare("SELECT id FROM picks WHERE tournament_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map(params![tournament], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Create a pick or replace the selections of the existing one for the same
/// contestant and tournament. Any previous resolution is cleared.
pub(crate) fn upsert_pick_row(
    conn: &Connection,
    contestant: ContestantId,
    tournament: TournamentId,
    primary: GolferId,
    backup: GolferId,
) -> rusqlite::Result<PickId> {
    conn.query_row(
        "INSERT INTO picks (contestant_id, tournament_id, primary_golfer_id, backup_golfer_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(contestant_id, tournament_id) DO UPDATE SET
            primary_golfer_id = excluded.primary_golfer_id,
            backup_golfer_id  = excluded.backup_golfer_id,
            active_golfer_id  = NULL,
            points            = NULL,
            primary_used      = 0,
            backup_used       = 0,
            updated_at        = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         RETURNING id",
        params![contestant, tournament, primary, backup],
        |row| row.get(0),
    )
}

pub(crate) fn update_pick_selection(
    conn: &Connection,
    pick: PickId,
    primary: GolferId,
    backup: GolferId,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE picks SET
            primary_golfer_id = ?2,
            backup_golfer_id  = ?3,
            active_golfer_id  = NULL,
            points            = NULL,
            primary_used      = 0,
            backup_used       = 0,
            updated_at        = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![pick, primary, backup],
    )?;
    Ok(())
}

pub(crate) fn write_resolution(
    conn: &Connection,
    pick: PickId,
    resolution: &Resolution,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE picks SET
            active_golfer_id = ?2,
            points           = ?3,
            primary_used     = ?4,
            backup_used      = ?5,
            updated_at       = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![
            pick,
            resolution.active_golfer,
            resolution.points,
            resolution.primary_used(),
            resolution.backup_used(),
        ],
    )?;
    Ok(())
}

pub(crate) fn load_usage(
    conn: &Connection,
    contestant: ContestantId,
    season_year: i32,
) -> rusqlite::Result<Vec<SeasonUsage>> {
    let mut stmt = conn.prepare(
        "SELECT contestant_id, golfer_id, season_year, pick_id
         FROM season_usage WHERE contestant_id = ?1 AND season_year = ?2
         ORDER BY golfer_id",
    )?;
    let rows = stmt
        .query_map(params![contestant, season_year], |row| {
            Ok(SeasonUsage {
                contestant_id: row.get(0)?,
                golfer_id: row.get(1)?,
                season_year: row.get(2)?,
                pick_id: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// The pick currently holding `golfer` in the contestant's season usage.
pub(crate) fn usage_owner(
    conn: &Connection,
    contestant: ContestantId,
    golfer: GolferId,
    season_year: i32,
) -> rusqlite::Result<Option<PickId>> {
    conn.query_row(
        "SELECT pick_id FROM season_usage
         WHERE contestant_id = ?1 AND golfer_id = ?2 AND season_year = ?3",
        params![contestant, golfer, season_year],
        |row| row.get(0),
    )
    .optional()
}

/// Remove every usage row derived from `pick`.
pub(crate) fn delete_usage_for_pick(conn: &Connection, pick: PickId) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM season_usage WHERE pick_id = ?1", params![pick])
}

pub(crate) fn insert_usage(conn: &Connection, usage: &SeasonUsage) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO season_usage (contestant_id, golfer_id, season_year, pick_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![usage.contestant_id, usage.golfer_id, usage.season_year, usage.pick_id],
    )?;
    Ok(())
}

/// Recompute a contestant's season total from scratch and store it in the
/// standings cache. Only resolved picks of final tournaments count.
pub(crate) fn recompute_season_total(
    conn: &Connection,
    contestant: ContestantId,
    season_year: i32,
) -> rusqlite::Result<i64> {
    let (total, resolved): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(p.points), 0), COUNT(p.points)
         FROM picks p JOIN tournaments t ON t.id = p.tournament_id
         WHERE p.contestant_id = ?1
           AND t.season_year = ?2
           AND t.phase = ?3
           AND p.points IS NOT NULL",
        params![contestant, season_year, Phase::Final],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    conn.execute(
        "INSERT INTO season_standings (contestant_id, season_year, total_points, resolved_picks)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(contestant_id, season_year) DO UPDATE SET
            total_points   = excluded.total_points,
            resolved_picks = excluded.resolved_picks",
        params![contestant, season_year, total, resolved],
    )?;
    Ok(total)
}

pub(crate) fn contestants_with_picks_in_season(
    conn: &Connection,
    season_year: i32,
) -> rusqlite::Result<Vec<ContestantId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT p.contestant_id
         FROM picks p JOIN tournaments t ON t.id = p.tournament_id
         WHERE t.season_year = ?1
         ORDER BY p.contestant_id",
    )?;
    let rows = stmt
        .query_map(params![season_year], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
