// Tournament lifecycle clock: phase derivation, refresh throttling, selection
// windows and deadline reminders.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::db::Database;
use crate::events::{LifecycleEvent, ReminderWindow};
use crate::model::{Phase, Tournament, TournamentId};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current instant. Injected so phase logic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

// ---------------------------------------------------------------------------
// Phase derivation
// ---------------------------------------------------------------------------

/// Phase implied by wall-clock time alone.
pub fn derive_phase(tournament: &Tournament, now: DateTime<Utc>) -> Phase {
    if now >= tournament.ends_at {
        return Phase::Final;
    }
    let cutoff_passed = tournament.pick_deadline.is_some_and(|cutoff| now >= cutoff);
    if now >= tournament.starts_at || cutoff_passed {
        return Phase::InProgress;
    }
    if tournament.pick_deadline.is_some() {
        Phase::OpenForPicks
    } else {
        Phase::NotYetOpen
    }
}

/// Provider statuses that mean the results are settled.
pub fn is_final_status(status: &str) -> bool {
    let status = status.trim();
    status.eq_ignore_ascii_case("complete") || status.eq_ignore_ascii_case("official")
}

/// Lower bound on the phase implied by a provider leaderboard status.
pub fn phase_from_status_hint(hint: &str) -> Option<Phase> {
    if is_final_status(hint) {
        return Some(Phase::Final);
    }
    let hint = hint.to_lowercase();
    if hint.contains("progress") || hint.contains("live") {
        Some(Phase::InProgress)
    } else {
        None
    }
}

/// The phase a tournament should be stored with. Never lower than `stored`.
pub fn next_phase(tournament: &Tournament, now: DateTime<Utc>, status_hint: Option<&str>) -> Phase {
    let derived = derive_phase(tournament, now);
    let hinted = status_hint.and_then(phase_from_status_hint).unwrap_or(Phase::NotYetOpen);
    tournament.phase.max(derived).max(hinted)
}

/// Events announcing a move from `from` to `to`. Only the phase reached is
/// announced, so a tournament first seen after it ended only reports
/// `TournamentFinalized`.
pub fn transition_events(
    tournament: &Tournament,
    from: Phase,
    to: Phase,
    now: DateTime<Utc>,
) -> Vec<LifecycleEvent> {
    if to <= from {
        return Vec::new();
    }
    let id = tournament.id;
    match to {
        Phase::Final => vec![LifecycleEvent::TournamentFinalized { tournament: id }],
        Phase::InProgress => {
            let mut events = vec![LifecycleEvent::CutoffPassed { tournament: id }];
            if now >= tournament.starts_at {
                events.push(LifecycleEvent::TournamentStarted { tournament: id });
            }
            events
        }
        Phase::OpenForPicks | Phase::NotYetOpen => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Cutoff helpers
// ---------------------------------------------------------------------------

/// Cutoff used when the provider has no tee times: the tournament's start
/// date at `hour` o'clock in the league time zone.
pub fn fallback_cutoff(starts_at: DateTime<Utc>, league_tz: Tz, hour: u32) -> Option<DateTime<Utc>> {
    let local = starts_at.date_naive().and_hms_opt(hour, 0, 0)?;
    league_tz
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The reminder window `now` falls in, if any. Nothing once the cutoff passed.
pub fn active_reminder_window(cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Option<ReminderWindow> {
    if now >= cutoff {
        return None;
    }
    let tolerance = Duration::minutes(ReminderWindow::TOLERANCE_MINUTES);
    ReminderWindow::ALL.into_iter().find(|window| {
        let target = cutoff - window.lead_time();
        (now - target).abs() <= tolerance
    })
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Rate limit for opportunistic phase recomputation.
#[derive(Debug, Clone)]
pub struct RefreshThrottle {
    interval: Duration,
    last_refresh: Option<DateTime<Utc>>,
}

impl RefreshThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_refresh: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Returns `true` and records `now` if a refresh is due.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.last_refresh = Some(now);
        true
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }
}

// ---------------------------------------------------------------------------
// Selection windows
// ---------------------------------------------------------------------------

/// Tournament subsets the sync runner works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Starting within ten days and not yet over.
    Upcoming,
    /// Starting within twelve hours or ended less than six hours ago.
    Active,
    /// Ended within the last two days (or ends within twelve hours).
    RecentlyCompleted,
    /// Final but official earnings not yet ingested.
    PendingFinalization,
}

impl Window {
    pub fn contains(&self, t: &Tournament, now: DateTime<Utc>) -> bool {
        match self {
            Window::Upcoming => {
                t.starts_at <= now + Duration::days(10) && t.ends_at >= now && t.phase != Phase::Final
            }
            Window::Active => {
                t.starts_at <= now + Duration::hours(12)
                    && t.ends_at >= now - Duration::hours(6)
                    && t.phase != Phase::Final
            }
            Window::RecentlyCompleted => {
                t.ends_at >= now - Duration::days(2) && t.ends_at <= now + Duration::hours(12)
            }
            Window::PendingFinalization => t.phase == Phase::Final && !t.results_finalized,
        }
    }

    fn newest_first(&self) -> bool {
        matches!(self, Window::RecentlyCompleted | Window::PendingFinalization)
    }
}

/// Tournaments in a window, with whatever phase changes the refresh produced.
#[derive(Debug, Default)]
pub struct Selection {
    pub tournaments: Vec<Tournament>,
    pub events: Vec<LifecycleEvent>,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Owns the clock and the refresh throttle and persists phase changes.
pub struct Lifecycle {
    clock: Arc<dyn Clock>,
    throttle: RefreshThrottle,
}

impl Lifecycle {
    pub fn new(clock: Arc<dyn Clock>, refresh_interval: Duration) -> Self {
        Self {
            clock,
            throttle: RefreshThrottle::new(refresh_interval),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Recompute one tournament's phase, persist it if it advanced and
    /// update `tournament` in place.
    pub fn refresh(
        &self,
        db: &Database,
        tournament: &mut Tournament,
        status_hint: Option<&str>,
    ) -> Result<Vec<LifecycleEvent>> {
        let now = self.now();
        let from = tournament.phase;
        let to = next_phase(tournament, now, status_hint);
        if to == from {
            return Ok(Vec::new());
        }

        db.set_phase(tournament.id, to)?;
        tournament.phase = to;
        info!(tournament = %tournament.name, %from, %to, "tournament phase advanced");
        Ok(transition_events(tournament, from, to, now))
    }

    pub fn refresh_by_id(&self, db: &Database, id: TournamentId) -> Result<Vec<LifecycleEvent>> {
        match db.tournament(id)? {
            Some(mut tournament) => self.refresh(db, &mut tournament, None),
            None => Ok(Vec::new()),
        }
    }

    /// Refresh every tournament of a season unless the throttle says a
    /// refresh already ran recently. `None` means skipped.
    pub fn refresh_season_if_due(
        &mut self,
        db: &Database,
        season_year: i32,
    ) -> Result<Option<Vec<LifecycleEvent>>> {
        let now = self.now();
        if !self.throttle.try_acquire(now) {
            debug!("phase refresh throttled");
            return Ok(None);
        }
        let mut events = Vec::new();
        for mut tournament in db.tournaments_for_season(season_year)? {
            events.extend(self.refresh(db, &mut tournament, None)?);
        }
        Ok(Some(events))
    }

    /// Load the tournaments in `window`, refreshing each one's phase.
    pub fn select(&self, db: &Database, window: Window) -> Result<Selection> {
        let now = self.now();
        let mut selection = Selection::default();
        for mut tournament in db.all_tournaments()? {
            if !window.contains(&tournament, now) {
                continue;
            }
            selection.events.extend(self.refresh(db, &mut tournament, None)?);
            selection.tournaments.push(tournament);
        }
        if window.newest_first() {
            selection.tournaments.sort_by(|a, b| b.ends_at.cmp(&a.ends_at));
        }
        Ok(selection)
    }

    /// Deadline reminders due right now for the season's open tournaments.
    pub fn due_reminders(&self, db: &Database, season_year: i32) -> Result<Vec<LifecycleEvent>> {
        let now = self.now();
        let events = db
            .tournaments_for_season(season_year)?
            .into_iter()
            .filter(|t| t.phase < Phase::InProgress)
            .filter_map(|t| {
                let window = active_reminder_window(t.pick_deadline?, now)?;
                Some(LifecycleEvent::DeadlineApproaching {
                    tournament: t.id,
                    window,
                })
            })
            .collect();
        Ok(events)
    }
}
