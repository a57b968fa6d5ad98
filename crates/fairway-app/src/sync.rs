// Ingestion: pull the schedule, fields, leaderboards and earnings from the
// feed into the store, then resolve picks for tournaments that finalize.
//
// A failed feed call means "no update this cycle": the step logs a warning,
// returns `None` and leaves stored results as they were.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use anyhow::{Context, Result};
use chrono::{Datelike, Weekday};
use chrono_tz::Tz;
use clap::ValueEnum;
use fairway_core::db::Database;
use fairway_core::events::LifecycleEvent;
use fairway_core::lifecycle::{fallback_cutoff, Lifecycle, Window};
use fairway_core::model::{GolferId, GolferResult, NewTournament, Phase, ResultStatus, Tournament, TournamentId};
use fairway_core::payout::projected_earnings;
use fairway_core::resolution::{resolve_tournament, BatchReport};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, PurseConfig, SyncMode};
use crate::feed::types::{Earnings, LeaderboardRow};
use crate::feed::{FeedError, ResultsFeed};

// ---------------------------------------------------------------------------
// Steps and settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStep {
    Schedule,
    Field,
    Live,
    LiveWithWd,
    Withdrawals,
    Results,
    Earnings,
    All,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::Schedule => "schedule",
            SyncStep::Field => "field",
            SyncStep::Live => "live",
            SyncStep::LiveWithWd => "live-with-wd",
            SyncStep::Withdrawals => "withdrawals",
            SyncStep::Results => "results",
            SyncStep::Earnings => "earnings",
            SyncStep::All => "all",
        }
    }

    /// The concrete steps this one runs, in order.
    pub fn expand(self) -> Vec<SyncStep> {
        match self {
            SyncStep::All => vec![
                SyncStep::Schedule,
                SyncStep::Field,
                SyncStep::Live,
                SyncStep::Withdrawals,
                SyncStep::Results,
                SyncStep::Earnings,
            ],
            step => vec![step],
        }
    }

    /// Calendar gate, evaluated on the weekday in the league time zone.
    /// Free mode spends its limited call budget on the days each step matters.
    pub fn is_allowed(self, mode: SyncMode, weekday: Weekday) -> bool {
        let standard = mode == SyncMode::Standard;
        match self {
            SyncStep::Schedule => weekday == Weekday::Mon,
            SyncStep::Field => standard || matches!(weekday, Weekday::Tue | Weekday::Wed),
            SyncStep::Live | SyncStep::LiveWithWd | SyncStep::All => true,
            SyncStep::Withdrawals => standard,
            SyncStep::Results | SyncStep::Earnings => {
                standard || matches!(weekday, Weekday::Sun | Weekday::Mon)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub season_year: i32,
    pub timezone: Tz,
    pub min_field_size: usize,
    pub fallback_deadline_hour: u32,
    pub mode: SyncMode,
    pub purses: PurseConfig,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            season_year: config.league.season_year,
            timezone: config.timezone,
            min_field_size: config.league.min_field_size,
            fallback_deadline_hour: config.league.fallback_deadline_hour,
            mode: config.feed.sync_mode,
            purses: config.purses.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub imported: usize,
    pub updated: usize,
    pub excluded: usize,
    pub undated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Rows written (field entries added, or results upserted).
    pub updated: usize,
    pub events: Vec<LifecycleEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    pub tournament: TournamentId,
    pub golfer: GolferId,
    pub name: String,
    pub rounds_completed: u8,
    /// Withdrew before completing two rounds, so the backup pick applies.
    pub early: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub steps: Vec<SyncStep>,
    pub skipped_steps: Vec<SyncStep>,
    pub schedule: Option<ScheduleSummary>,
    pub field_entries_added: usize,
    pub results_updated: usize,
    pub withdrawals: Vec<Withdrawal>,
    pub events: Vec<LifecycleEvent>,
    pub resolutions: Vec<BatchReport>,
}

// ---------------------------------------------------------------------------
// TournamentSync
// ---------------------------------------------------------------------------

pub struct TournamentSync<'a> {
    db: &'a Database,
    feed: &'a dyn ResultsFeed,
    lifecycle: &'a Lifecycle,
    settings: SyncSettings,
}

async fn fetched<T>(what: &str, call: impl Future<Output = Result<T, FeedError>>) -> Option<T> {
    match call.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("no {what} update this cycle: {e}");
            None
        }
    }
}

fn non_empty(position: &Option<String>) -> Option<String> {
    position.as_ref().map(|p| p.trim().to_string()).filter(|p| !p.is_empty())
}

fn live_status(row: &LeaderboardRow) -> ResultStatus {
    row.status
        .as_deref()
        .and_then(ResultStatus::parse)
        .unwrap_or(ResultStatus::InProgress)
}

/// Status of a row on an official board; anyone still "active" finished.
fn final_status(row: &LeaderboardRow) -> ResultStatus {
    match row.status.as_deref().and_then(ResultStatus::parse) {
        Some(ResultStatus::InProgress) | None => ResultStatus::Complete,
        Some(status) => status,
    }
}

fn earnings_by_player(earnings: &Earnings) -> HashMap<&str, i64> {
    earnings
        .leaderboard
        .iter()
        .map(|row| (row.player_id.as_str(), row.amount()))
        .collect()
}

impl<'a> TournamentSync<'a> {
    pub fn new(
        db: &'a Database,
        feed: &'a dyn ResultsFeed,
        lifecycle: &'a Lifecycle,
        settings: SyncSettings,
    ) -> Self {
        Self {
            db,
            feed,
            lifecycle,
            settings,
        }
    }

    /// Import or refresh the season schedule.
    pub async fn sync_schedule(&self, year: i32) -> Result<Option<ScheduleSummary>> {
        let Some(schedule) = fetched("schedule", self.feed.schedule(year)).await else {
            return Ok(None);
        };

        let mut summary = ScheduleSummary::default();
        for event in &schedule.schedule {
            if self.settings.purses.is_excluded(&event.name) {
                debug!(tournament = %event.name, "skipping excluded event");
                summary.excluded += 1;
                continue;
            }
            let (Some(starts_at), Some(ends_at)) = (event.date.start.to_utc(), event.date.end.to_utc())
            else {
                warn!(tournament = %event.name, "schedule event has no usable dates");
                summary.undated += 1;
                continue;
            };

            match self.db.tournament_by_external_id(&event.tourn_id, year)? {
                Some(existing) => {
                    self.db.update_tournament_listing(
                        existing.id,
                        &event.name,
                        event.purse(),
                        event.is_team_event(),
                    )?;
                    summary.updated += 1;
                }
                None => {
                    let purse = event
                        .purse()
                        .unwrap_or_else(|| self.settings.purses.estimate_for(&event.name));
                    let week = self.db.next_week_number(year)?;
                    self.db.insert_tournament(
                        &NewTournament {
                            external_id: event.tourn_id.clone(),
                            name: event.name.clone(),
                            season_year: year,
                            starts_at,
                            ends_at,
                            purse,
                            is_team_event: event.is_team_event(),
                        },
                        Some(week),
                    )?;
                    info!(tournament = %event.name, week, purse, "imported tournament");
                    summary.imported += 1;
                }
            }
        }

        info!(
            year,
            imported = summary.imported,
            updated = summary.updated,
            excluded = summary.excluded,
            "schedule synced"
        );
        Ok(Some(summary))
    }

    /// Load the field, set the pick deadline and announce whether picks are
    /// open. The short-field alert only goes out on the Wednesday pass.
    pub async fn sync_field(
        &self,
        tournament: &mut Tournament,
        is_wednesday: bool,
    ) -> Result<Option<SyncOutcome>> {
        let Some(board) = fetched(
            "field",
            self.feed.leaderboard(&tournament.external_id, tournament.season_year),
        )
        .await
        else {
            return Ok(None);
        };

        let mut added = 0;
        for row in board.rows.iter().filter(|row| !row.is_amateur) {
            let golfer = self
                .db
                .upsert_golfer(&row.player_id, &row.first_name, &row.last_name, false)?;
            if self.db.add_field_entry(tournament.id, golfer)? {
                added += 1;
            }
        }

        let open_before = tournament.phase < Phase::InProgress;
        if open_before {
            let cutoff = board.first_tee_time().or_else(|| {
                fallback_cutoff(
                    tournament.starts_at,
                    self.settings.timezone,
                    self.settings.fallback_deadline_hour,
                )
            });
            if let Some(cutoff) = cutoff.filter(|c| tournament.pick_deadline != Some(*c)) {
                self.db.set_pick_deadline(tournament.id, cutoff)?;
                tournament.pick_deadline = Some(cutoff);
                info!(tournament = %tournament.name, %cutoff, "pick deadline set");
            }
        }

        let mut events = self.lifecycle.refresh(self.db, tournament, Some(board.status()))?;

        let field_size = self.db.field_size(tournament.id)?;
        let minimum = self.settings.min_field_size;
        if open_before && field_size >= minimum {
            events.push(LifecycleEvent::FieldPopulated {
                tournament: tournament.id,
                field_size,
            });
        } else if open_before && is_wednesday {
            warn!(tournament = %tournament.name, field_size, minimum, "field still short on Wednesday");
            events.push(LifecycleEvent::FieldShort {
                tournament: tournament.id,
                field_size,
                minimum,
            });
        }

        debug!(tournament = %tournament.name, added, field_size, "field synced");
        Ok(Some(SyncOutcome {
            updated: added,
            events,
        }))
    }

    /// Upsert in-progress results with projected earnings.
    pub async fn sync_live_leaderboard(&self, tournament: &mut Tournament) -> Result<Option<SyncOutcome>> {
        if tournament.results_finalized {
            debug!(tournament = %tournament.name, "results finalized; skipping live sync");
            return Ok(None);
        }
        let Some(board) = fetched(
            "leaderboard",
            self.feed.leaderboard(&tournament.external_id, tournament.season_year),
        )
        .await
        else {
            return Ok(None);
        };

        let events = self.lifecycle.refresh(self.db, tournament, Some(board.status()))?;
        let positions = board.positions();
        let mut updated = 0;
        for row in &board.rows {
            let Some(golfer) = self.db.golfer_by_external_id(&row.player_id)? else {
                continue;
            };
            let position = non_empty(&row.position);
            let earnings =
                projected_earnings(position.as_deref().unwrap_or(""), tournament.purse, positions.as_slice());
            self.db.upsert_result(&GolferResult {
                tournament_id: tournament.id,
                golfer_id: golfer.id,
                status: live_status(row),
                position,
                earnings: Some(earnings),
                rounds_completed: row.rounds_completed(),
            })?;
            updated += 1;
        }

        info!(tournament = %tournament.name, status = board.status(), updated, "live leaderboard synced");
        Ok(Some(SyncOutcome { updated, events }))
    }

    /// Record withdrawals from the leaderboard.
    pub async fn check_withdrawals(&self, tournament: &Tournament) -> Result<Option<Vec<Withdrawal>>> {
        if tournament.results_finalized {
            return Ok(None);
        }
        let Some(board) = fetched(
            "withdrawals",
            self.feed.leaderboard(&tournament.external_id, tournament.season_year),
        )
        .await
        else {
            return Ok(None);
        };

        let mut withdrawals = Vec::new();
        for row in board.rows.iter().filter(|row| row.is_withdrawn()) {
            let Some(golfer) = self.db.golfer_by_external_id(&row.player_id)? else {
                continue;
            };
            let result = GolferResult {
                tournament_id: tournament.id,
                golfer_id: golfer.id,
                status: ResultStatus::Withdrawn,
                position: non_empty(&row.position).or_else(|| Some("WD".to_string())),
                earnings: Some(0),
                rounds_completed: row.rounds_completed(),
            };
            self.db.upsert_result(&result)?;

            let early = result.is_early_withdrawal();
            if early {
                warn!(tournament = %tournament.name, golfer = %golfer.full_name(), rounds = result.rounds_completed, "early withdrawal");
            } else {
                info!(tournament = %tournament.name, golfer = %golfer.full_name(), rounds = result.rounds_completed, "withdrawal");
            }
            withdrawals.push(Withdrawal {
                tournament: tournament.id,
                golfer: golfer.id,
                name: golfer.full_name(),
                rounds_completed: result.rounds_completed,
                early,
            });
        }
        Ok(Some(withdrawals))
    }

    /// Ingest official results and earnings once the provider declares the
    /// tournament complete, finalizing it in one transaction.
    pub async fn sync_results(&self, tournament: &mut Tournament) -> Result<Option<SyncOutcome>> {
        let Some(board) = fetched(
            "results",
            self.feed.leaderboard(&tournament.external_id, tournament.season_year),
        )
        .await
        else {
            return Ok(None);
        };
        if !board.is_official() {
            debug!(tournament = %tournament.name, status = board.status(), "results not official yet");
            return Ok(None);
        }

        let Some(earnings) = fetched(
            "earnings",
            self.feed.earnings(&tournament.external_id, tournament.season_year),
        )
        .await
        else {
            return Ok(None);
        };
        if earnings.leaderboard.is_empty() {
            info!(tournament = %tournament.name, "official earnings not published yet");
            return Ok(None);
        }
        let amounts = earnings_by_player(&earnings);

        let mut results = Vec::with_capacity(board.rows.len());
        for row in &board.rows {
            let Some(golfer) = self.db.golfer_by_external_id(&row.player_id)? else {
                debug!(player = %row.player_id, "no golfer for leaderboard row");
                continue;
            };
            results.push(GolferResult {
                tournament_id: tournament.id,
                golfer_id: golfer.id,
                status: final_status(row),
                position: non_empty(&row.position),
                earnings: Some(amounts.get(row.player_id.as_str()).copied().unwrap_or(0)),
                rounds_completed: row.rounds_completed(),
            });
        }

        let events = self.lifecycle.refresh(self.db, tournament, Some(board.status()))?;
        let written = self
            .db
            .finalize_results(tournament.id, &results)
            .with_context(|| format!("failed to finalize results for {}", tournament.name))?;
        tournament.results_finalized = true;
        tournament.phase = Phase::Final;

        info!(tournament = %tournament.name, results = written, "results finalized");
        Ok(Some(SyncOutcome {
            updated: written,
            events,
        }))
    }

    /// Re-apply official earnings to a finalized tournament, picking up
    /// provider corrections. Returns the number of results that changed.
    pub async fn sync_earnings(&self, tournament: &Tournament) -> Result<Option<SyncOutcome>> {
        if !tournament.results_finalized {
            return Ok(None);
        }
        let Some(earnings) = fetched(
            "earnings",
            self.feed.earnings(&tournament.external_id, tournament.season_year),
        )
        .await
        else {
            return Ok(None);
        };
        if earnings.leaderboard.is_empty() {
            return Ok(None);
        }
        let amounts = earnings_by_player(&earnings);

        let mut changed = Vec::new();
        for mut result in self.db.results(tournament.id)? {
            let Some(golfer) = self.db.golfer(result.golfer_id)? else {
                continue;
            };
            let amount = amounts.get(golfer.external_id.as_str()).copied().unwrap_or(0);
            if result.earnings != Some(amount) {
                result.earnings = Some(amount);
                changed.push(result);
            }
        }
        if !changed.is_empty() {
            self.db.finalize_results(tournament.id, &changed)?;
            info!(tournament = %tournament.name, changed = changed.len(), "earnings corrected");
        }
        Ok(Some(SyncOutcome {
            updated: changed.len(),
            events: Vec::new(),
        }))
    }

    // ------------------------------------------------------------------
    // Runner
    // ------------------------------------------------------------------

    /// Run a step (or all of them) over the tournaments in the relevant
    /// windows. `force` bypasses the calendar gates.
    pub async fn run(&self, step: SyncStep, force: bool) -> Result<SyncReport> {
        let now = self.lifecycle.now();
        let weekday = now.with_timezone(&self.settings.timezone).weekday();
        let mut report = SyncReport::default();

        for step in step.expand() {
            if !force && !step.is_allowed(self.settings.mode, weekday) {
                info!(
                    step = step.as_str(),
                    mode = self.settings.mode.as_str(),
                    %weekday,
                    "sync step not scheduled today"
                );
                report.skipped_steps.push(step);
                continue;
            }
            match step {
                SyncStep::Schedule => {
                    report.schedule = self.sync_schedule(self.settings.season_year).await?;
                }
                SyncStep::Field => self.run_field(weekday == Weekday::Wed, &mut report).await?,
                SyncStep::Live => self.run_live(false, &mut report).await?,
                SyncStep::LiveWithWd => self.run_live(true, &mut report).await?,
                SyncStep::Withdrawals => self.run_withdrawals(&mut report).await?,
                SyncStep::Results => self.run_results(&mut report).await?,
                SyncStep::Earnings => self.run_earnings(&mut report).await?,
                // expanded above
                SyncStep::All => continue,
            }
            report.steps.push(step);
        }

        report
            .events
            .extend(self.lifecycle.due_reminders(self.db, self.settings.season_year)?);
        Ok(report)
    }

    async fn run_field(&self, is_wednesday: bool, report: &mut SyncReport) -> Result<()> {
        let selection = self.lifecycle.select(self.db, Window::Upcoming)?;
        report.events.extend(selection.events);
        for mut tournament in selection.tournaments {
            if tournament.phase >= Phase::InProgress {
                continue;
            }
            if let Some(outcome) = self.sync_field(&mut tournament, is_wednesday).await? {
                report.field_entries_added += outcome.updated;
                report.events.extend(outcome.events);
            }
        }
        Ok(())
    }

    async fn run_live(&self, with_withdrawals: bool, report: &mut SyncReport) -> Result<()> {
        let selection = self.lifecycle.select(self.db, Window::Active)?;
        report.events.extend(selection.events);
        for mut tournament in selection.tournaments {
            if tournament.phase != Phase::InProgress {
                continue;
            }
            if let Some(outcome) = self.sync_live_leaderboard(&mut tournament).await? {
                report.results_updated += outcome.updated;
                report.events.extend(outcome.events);
            }
            if with_withdrawals {
                if let Some(found) = self.check_withdrawals(&tournament).await? {
                    report.withdrawals.extend(found);
                }
            }
        }
        Ok(())
    }

    async fn run_withdrawals(&self, report: &mut SyncReport) -> Result<()> {
        let selection = self.lifecycle.select(self.db, Window::Active)?;
        report.events.extend(selection.events);
        for tournament in selection.tournaments {
            if tournament.phase != Phase::InProgress {
                continue;
            }
            if let Some(found) = self.check_withdrawals(&tournament).await? {
                report.withdrawals.extend(found);
            }
        }
        Ok(())
    }

    async fn run_results(&self, report: &mut SyncReport) -> Result<()> {
        let recent = self.lifecycle.select(self.db, Window::RecentlyCompleted)?;
        let pending = self.lifecycle.select(self.db, Window::PendingFinalization)?;
        report.events.extend(recent.events);
        report.events.extend(pending.events);

        let mut seen = HashSet::new();
        let candidates = recent
            .tournaments
            .into_iter()
            .chain(pending.tournaments)
            .filter(|t| !t.results_finalized && seen.insert(t.id));

        for mut tournament in candidates {
            if let Some(outcome) = self.sync_results(&mut tournament).await? {
                report.results_updated += outcome.updated;
                report.events.extend(outcome.events);
                report.resolutions.push(self.resolve(&tournament)?);
            }
        }
        Ok(())
    }

    async fn run_earnings(&self, report: &mut SyncReport) -> Result<()> {
        let recent = self.lifecycle.select(self.db, Window::RecentlyCompleted)?;
        report.events.extend(recent.events);
        for tournament in recent.tournaments.iter().filter(|t| t.results_finalized) {
            if let Some(outcome) = self.sync_earnings(tournament).await? {
                report.results_updated += outcome.updated;
                if outcome.updated > 0 {
                    report.resolutions.push(self.resolve(tournament)?);
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, tournament: &Tournament) -> Result<BatchReport> {
        resolve_tournament(self.db, tournament.id)
            .with_context(|| format!("failed to resolve picks for {}", tournament.name))
    }
}
