// Operator commands.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fairway_core::db::Database;
use fairway_core::error::SubmissionError;
use fairway_core::events::LifecycleEvent;
use fairway_core::lifecycle::{Clock, Lifecycle, SystemClock};
use fairway_core::model::{GolferId, PickId, TournamentId};
use fairway_core::picks::{override_pick, submit_pick};
use fairway_core::resolution::resolve_tournament;
use fairway_core::standings::standings;
use tracing::info;

use crate::config::{Config, API_KEY_ENV};
use crate::feed::{ResultsFeed, SlashGolfClient};
use crate::notify::{Dispatcher, LogNotifier, Notifier};
use crate::sync::{SyncSettings, SyncStep, TournamentSync};

#[derive(Debug, Parser)]
#[command(name = "fairway", version, about = "Golf pick'em season engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database, optionally importing the season schedule.
    Init {
        #[arg(long)]
        import_schedule: bool,
    },
    /// Register a contestant.
    AddContestant {
        username: String,
        email: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        admin: bool,
    },
    /// Submit or edit a pick before the deadline.
    Pick {
        username: String,
        tournament_id: i64,
        primary: i64,
        backup: i64,
    },
    /// Recompute tournament phases and send due reminders.
    Refresh,
    /// Pull data from the results feed.
    Sync {
        #[arg(long, value_enum, default_value_t = SyncStep::All)]
        mode: SyncStep,
        /// Ignore the calendar gates.
        #[arg(long)]
        force: bool,
    },
    /// Resolve every pick of a final tournament.
    Resolve { tournament_id: i64 },
    /// Replace a pick's golfers regardless of the deadline.
    Override {
        pick_id: i64,
        primary: i64,
        backup: i64,
    },
    /// Print the season standings.
    Standings {
        #[arg(long)]
        season: Option<i32>,
        #[arg(long)]
        json: bool,
    },
}

/// Everything a command needs. The feed is built on first use so commands
/// that never call it work without an API key.
pub struct AppContext {
    pub config: Config,
    pub db: Arc<Database>,
    pub clock: Arc<dyn Clock>,
    feed: Option<Arc<dyn ResultsFeed>>,
    notifier: Arc<dyn Notifier>,
}

impl AppContext {
    pub fn new(config: Config, db: Database) -> Self {
        Self {
            config,
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
            feed: None,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn ResultsFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// A fresh lifecycle. Its refresh throttle only spans this process, so
    /// each CLI invocation starts unthrottled.
    fn lifecycle(&self) -> Lifecycle {
        let interval = chrono::Duration::seconds(self.config.league.status_refresh_interval_secs as i64);
        Lifecycle::new(Arc::clone(&self.clock), interval)
    }

    fn feed(&self) -> Result<Arc<dyn ResultsFeed>> {
        if let Some(feed) = &self.feed {
            return Ok(Arc::clone(feed));
        }
        let Some(api_key) = self.config.api_key() else {
            bail!("no API key configured; set slashgolf_api_key in config/credentials.toml or {API_KEY_ENV}");
        };
        let client = SlashGolfClient::new(&self.config.feed, api_key).context("failed to build HTTP client")?;
        Ok(Arc::new(client))
    }

    /// Bring one tournament's phase up to date before a command acts on it.
    async fn touch(&self, tournament: TournamentId) -> Result<()> {
        let events = self.lifecycle().refresh_by_id(&self.db, tournament)?;
        self.dispatch(events).await
    }

    /// Hand events to the dispatcher and wait until they are processed.
    async fn dispatch(&self, events: Vec<LifecycleEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let dispatcher = Dispatcher::new(Arc::clone(&self.db), Arc::clone(&self.notifier));
        let (tx, handle) = dispatcher.spawn(events.len());
        for event in events {
            tx.send(event).await.context("notification queue closed early")?;
        }
        drop(tx);
        handle.await.context("notification task failed")?;
        Ok(())
    }
}

impl Command {
    pub async fn run<W: Write>(&self, ctx: &AppContext, out: &mut W) -> Result<()> {
        let season = ctx.config.league.season_year;
        match self {
            Command::Init { import_schedule } => {
                writeln!(out, "database ready at {}", ctx.config.db_path)?;
                if *import_schedule {
                    let feed = ctx.feed()?;
                    let lifecycle = ctx.lifecycle();
                    let sync = TournamentSync::new(
                        &ctx.db,
                        feed.as_ref(),
                        &lifecycle,
                        SyncSettings::from_config(&ctx.config),
                    );
                    match sync.sync_schedule(season).await? {
                        Some(summary) => writeln!(
                            out,
                            "imported {} tournaments ({} excluded)",
                            summary.imported, summary.excluded
                        )?,
                        None => writeln!(out, "schedule unavailable; try again later")?,
                    }
                }
            }

            Command::AddContestant {
                username,
                email,
                display_name,
                admin,
            } => {
                let id = ctx
                    .db
                    .add_contestant(username, email, display_name.as_deref(), *admin)?;
                info!(contestant = %id, username = %username, "contestant added");
                writeln!(out, "added contestant {username} (id {id})")?;
            }

            Command::Pick {
                username,
                tournament_id,
                primary,
                backup,
            } => {
                let contestant = ctx
                    .db
                    .contestant_by_username(username)?
                    .with_context(|| format!("no contestant named {username}"))?;
                ctx.touch(TournamentId(*tournament_id)).await?;
                let submitted = submit_pick(
                    &ctx.db,
                    contestant.id,
                    TournamentId(*tournament_id),
                    GolferId(*primary),
                    GolferId(*backup),
                    ctx.clock.now(),
                );
                match submitted {
                    Ok(pick) => writeln!(out, "pick {} saved for {}", pick.id, contestant.name())?,
                    Err(SubmissionError::InvalidPickSubmission(problems)) => {
                        for problem in &problems {
                            writeln!(out, "  - {problem}")?;
                        }
                        bail!("pick rejected with {} problem(s)", problems.len());
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Command::Refresh => {
                let mut lifecycle = ctx.lifecycle();
                let mut events = lifecycle
                    .refresh_season_if_due(&ctx.db, season)?
                    .unwrap_or_default();
                events.extend(lifecycle.due_reminders(&ctx.db, season)?);
                writeln!(out, "{} lifecycle event(s)", events.len())?;
                ctx.dispatch(events).await?;
            }

            Command::Sync { mode, force } => {
                let feed = ctx.feed()?;
                let lifecycle = ctx.lifecycle();
                let sync = TournamentSync::new(
                    &ctx.db,
                    feed.as_ref(),
                    &lifecycle,
                    SyncSettings::from_config(&ctx.config),
                );
                let report = sync.run(*mode, *force).await?;

                let ran: Vec<&str> = report.steps.iter().map(|s| s.as_str()).collect();
                writeln!(out, "ran: {}", ran.join(", "))?;
                if !report.skipped_steps.is_empty() {
                    let skipped: Vec<&str> = report.skipped_steps.iter().map(|s| s.as_str()).collect();
                    writeln!(out, "not scheduled today: {}", skipped.join(", "))?;
                }
                writeln!(
                    out,
                    "field entries added: {}, results updated: {}",
                    report.field_entries_added, report.results_updated
                )?;
                for wd in &report.withdrawals {
                    let kind = if wd.early { "early" } else { "late" };
                    writeln!(out, "withdrawal ({kind}): {} after {} round(s)", wd.name, wd.rounds_completed)?;
                }
                for batch in &report.resolutions {
                    writeln!(
                        out,
                        "tournament {}: {} resolved, {} skipped",
                        batch.tournament,
                        batch.resolved,
                        batch.skipped.len()
                    )?;
                }
                ctx.dispatch(report.events).await?;
            }

            Command::Resolve { tournament_id } => {
                ctx.touch(TournamentId(*tournament_id)).await?;
                let report = resolve_tournament(&ctx.db, TournamentId(*tournament_id))?;
                writeln!(out, "resolved {}, skipped {}", report.resolved, report.skipped.len())?;
                for skipped in &report.skipped {
                    writeln!(out, "  pick {}: {}", skipped.pick, skipped.reason)?;
                }
            }

            Command::Override {
                pick_id,
                primary,
                backup,
            } => {
                if let Some(existing) = ctx.db.pick(PickId(*pick_id))? {
                    ctx.touch(existing.tournament_id).await?;
                }
                let pick = override_pick(&ctx.db, PickId(*pick_id), GolferId(*primary), GolferId(*backup))?;
                writeln!(
                    out,
                    "pick {} now {} / {}; run `fairway resolve {}` to settle it",
                    pick.id, pick.primary, pick.backup, pick.tournament_id
                )?;
            }

            Command::Standings { season: requested, json } => {
                let season = requested.unwrap_or(season);
                let events = ctx
                    .lifecycle()
                    .refresh_season_if_due(&ctx.db, season)?
                    .unwrap_or_default();
                ctx.dispatch(events).await?;
                let table = standings(&ctx.db, season)?;
                if *json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&table)?)?;
                } else {
                    for row in &table {
                        writeln!(
                            out,
                            "{:>3}  {:<24} {:>12}  ({} picks)",
                            row.rank,
                            row.contestant.name(),
                            row.total_points,
                            row.resolved_picks
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}
