// Lifecycle events consumed by the notification dispatcher.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::model::TournamentId;

/// Reminder windows before the pick cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderWindow {
    DayBefore,
    HalfDayBefore,
    HourBefore,
}

impl ReminderWindow {
    /// Largest window first.
    pub const ALL: [ReminderWindow; 3] = [
        ReminderWindow::DayBefore,
        ReminderWindow::HalfDayBefore,
        ReminderWindow::HourBefore,
    ];

    /// Allowed drift either side of the exact lead time.
    pub const TOLERANCE_MINUTES: i64 = 30;

    pub fn hours_before(&self) -> i64 {
        match self {
            ReminderWindow::DayBefore => 24,
            ReminderWindow::HalfDayBefore => 12,
            ReminderWindow::HourBefore => 1,
        }
    }

    pub fn lead_time(&self) -> Duration {
        Duration::hours(self.hours_before())
    }

    pub fn key(&self) -> &'static str {
        match self {
            ReminderWindow::DayBefore => "reminder_24h",
            ReminderWindow::HalfDayBefore => "reminder_12h",
            ReminderWindow::HourBefore => "reminder_1h",
        }
    }
}

/// Something that happened to a tournament that contestants or admins may
/// need to hear about. Events carry ids only; consumers re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// The field reached the minimum size and picks can be made.
    FieldPopulated {
        tournament: TournamentId,
        field_size: usize,
    },
    /// The Wednesday field pass still found too few golfers.
    FieldShort {
        tournament: TournamentId,
        field_size: usize,
        minimum: usize,
    },
    DeadlineApproaching {
        tournament: TournamentId,
        window: ReminderWindow,
    },
    /// First tee time passed; picks are read-only.
    CutoffPassed { tournament: TournamentId },
    TournamentStarted { tournament: TournamentId },
    /// The tournament reached `Final` and its picks may be resolved.
    TournamentFinalized { tournament: TournamentId },
}

impl LifecycleEvent {
    pub fn tournament(&self) -> TournamentId {
        match self {
            LifecycleEvent::FieldPopulated { tournament, .. }
            | LifecycleEvent::FieldShort { tournament, .. }
            | LifecycleEvent::DeadlineApproaching { tournament, .. }
            | LifecycleEvent::CutoffPassed { tournament }
            | LifecycleEvent::TournamentStarted { tournament }
            | LifecycleEvent::TournamentFinalized { tournament } => *tournament,
        }
    }

    /// Dedupe key: at most one notice per tournament and kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::FieldPopulated { .. } => "picks_open",
            LifecycleEvent::FieldShort { .. } => "field_short",
            LifecycleEvent::DeadlineApproaching { window, .. } => window.key(),
            LifecycleEvent::CutoffPassed { .. } => "cutoff_passed",
            LifecycleEvent::TournamentStarted { .. } => "started",
            LifecycleEvent::TournamentFinalized { .. } => "finalized",
        }
    }
}
