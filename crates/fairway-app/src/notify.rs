// Notification dispatch for lifecycle events.
//
// Events arrive over an mpsc channel. Each tournament/kind pair is claimed in
// the store before delivery so a notice goes out at most once; a failed
// delivery releases the claim so a later pass can retry.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fairway_core::db::Database;
use fairway_core::events::LifecycleEvent;
use fairway_core::model::{Contestant, Phase, Tournament, TournamentId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub username: String,
    pub email: String,
}

impl From<&Contestant> for Recipient {
    fn from(c: &Contestant) -> Self {
        Self {
            username: c.username.clone(),
            email: c.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: &'static str,
    pub tournament: TournamentId,
    pub tournament_name: String,
    pub headline: String,
    pub recipients: Vec<Recipient>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<()>;
}

/// Writes notices to the log instead of sending them anywhere.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notice: &Notice) -> Result<()> {
        info!(
            kind = notice.kind,
            tournament = %notice.tournament_name,
            recipients = notice.recipients.len(),
            "{}",
            notice.headline
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { recipients: usize },
    /// Already sent for this tournament and kind.
    Duplicate,
    /// The event type carries no notice.
    Ignored,
    NoRecipients,
    TournamentMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Everyone,
    WithoutPick,
    Admins,
}

fn audience(event: &LifecycleEvent) -> Option<Audience> {
    match event {
        LifecycleEvent::FieldPopulated { .. } | LifecycleEvent::TournamentFinalized { .. } => {
            Some(Audience::Everyone)
        }
        LifecycleEvent::DeadlineApproaching { .. } => Some(Audience::WithoutPick),
        LifecycleEvent::FieldShort { .. } => Some(Audience::Admins),
        LifecycleEvent::CutoffPassed { .. } | LifecycleEvent::TournamentStarted { .. } => None,
    }
}

fn headline(event: &LifecycleEvent, tournament: &Tournament) -> String {
    let name = &tournament.name;
    match event {
        LifecycleEvent::FieldPopulated { field_size, .. } => {
            format!("Picks are open for {name} ({field_size} golfers in the field)")
        }
        LifecycleEvent::FieldShort {
            field_size, minimum, ..
        } => format!("{name} field has {field_size} golfers, expected at least {minimum}"),
        LifecycleEvent::DeadlineApproaching { window, .. } => format!(
            "{} hour(s) left to make your pick for {name}",
            window.hours_before()
        ),
        LifecycleEvent::CutoffPassed { .. } => format!("Picks are locked for {name}"),
        LifecycleEvent::TournamentStarted { .. } => format!("{name} is underway"),
        LifecycleEvent::TournamentFinalized { .. } => format!("Final results are in for {name}"),
    }
}

pub struct Dispatcher {
    db: Arc<Database>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(db: Arc<Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Start the dispatch loop on its own task. The task ends once every
    /// sender has been dropped and the queue is drained.
    pub fn spawn(self, buffer: usize) -> (mpsc::Sender<LifecycleEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    pub async fn run(self, mut rx: mpsc::Receiver<LifecycleEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.dispatch(&event).await {
                error!(kind = event.kind(), tournament = %event.tournament(), "notification failed: {e:#}");
            }
        }
        debug!("notification queue closed");
    }

    pub async fn dispatch(&self, event: &LifecycleEvent) -> Result<DispatchOutcome> {
        let Some(audience) = audience(event) else {
            debug!(kind = event.kind(), "no notice for event");
            return Ok(DispatchOutcome::Ignored);
        };

        // Events carry only the id; the tournament may have changed since.
        let Some(tournament) = self.db.tournament(event.tournament())? else {
            warn!(tournament = %event.tournament(), "notification for unknown tournament");
            return Ok(DispatchOutcome::TournamentMissing);
        };
        if matches!(event, LifecycleEvent::DeadlineApproaching { .. })
            && tournament.phase >= Phase::InProgress
        {
            return Ok(DispatchOutcome::Ignored);
        }

        let recipients = self.recipients(audience, &tournament)?;
        if recipients.is_empty() {
            debug!(kind = event.kind(), tournament = %tournament.name, "no recipients");
            return Ok(DispatchOutcome::NoRecipients);
        }

        let kind = event.kind();
        if !self.db.mark_notified(tournament.id, kind)? {
            debug!(kind, tournament = %tournament.name, "notice already sent");
            return Ok(DispatchOutcome::Duplicate);
        }

        let notice = Notice {
            kind,
            tournament: tournament.id,
            tournament_name: tournament.name.clone(),
            headline: headline(event, &tournament),
            recipients,
        };
        if let Err(e) = self.notifier.deliver(&notice).await {
            self.db.unmark_notified(tournament.id, kind)?;
            return Err(e).with_context(|| format!("failed to deliver {kind} notice for {}", tournament.name));
        }

        Ok(DispatchOutcome::Sent {
            recipients: notice.recipients.len(),
        })
    }

    fn recipients(&self, audience: Audience, tournament: &Tournament) -> Result<Vec<Recipient>> {
        let contestants = self.db.contestants()?;
        let mut recipients = Vec::new();
        for contestant in &contestants {
            let include = match audience {
                Audience::Everyone => true,
                Audience::Admins => contestant.is_admin,
                Audience::WithoutPick => self.db.pick_for(contestant.id, tournament.id)?.is_none(),
            };
            if include {
                recipients.push(Recipient::from(contestant));
            }
        }
        Ok(recipients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fairway_core::events::ReminderWindow;
    use fairway_core::model::NewTournament;
    use fairway_core::picks::submit_pick;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notice>>,
        fail: AtomicBool,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<Notice> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, notice: &Notice) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("mail relay refused connection");
            }
            self.sent.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    fn setup() -> (Arc<Database>, Arc<RecordingNotifier>, Dispatcher, TournamentId) {
        let db = Arc::new(Database::open(":memory:").unwrap());
        db.add_contestant("alice", "alice@example.com", None, true).unwrap();
        db.add_contestant("bob", "bob@example.com", None, false).unwrap();
        let id = db
            .insert_tournament(
                &NewTournament {
                    external_id: "014".into(),
                    name: "Masters Tournament".into(),
                    season_year: 2026,
                    starts_at: Utc.with_ymd_and_hms(2026, 4, 9, 12, 0, 0).unwrap(),
                    ends_at: Utc.with_ymd_and_hms(2026, 4, 12, 23, 0, 0).unwrap(),
                    purse: 21_000_000,
                    is_team_event: false,
                },
                Some(1),
            )
            .unwrap();
        db.set_pick_deadline(id, Utc.with_ymd_and_hms(2026, 4, 9, 11, 45, 0).unwrap())
            .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(db.clone(), notifier.clone());
        (db, notifier, dispatcher, id)
    }

    fn usernames(notice: &Notice) -> Vec<&str> {
        notice.recipients.iter().map(|r| r.username.as_str()).collect()
    }

    // ------------------------------------------------------------------
    // Dedupe and recipients
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn picks_open_goes_to_everyone_once() {
        let (_db, notifier, dispatcher, id) = setup();
        let event = LifecycleEvent::FieldPopulated {
            tournament: id,
            field_size: 88,
        };

        let outcome = dispatcher.dispatch(&event).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent { recipients: 2 });
        assert_eq!(dispatcher.dispatch(&event).await.unwrap(), DispatchOutcome::Duplicate);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "picks_open");
        assert!(sent[0].headline.contains("Masters Tournament"));
        assert_eq!(usernames(&sent[0]), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn reminders_skip_contestants_who_picked() {
        let (db, notifier, dispatcher, id) = setup();
        let bob = db.contestant_by_username("bob").unwrap().unwrap();
        let g1 = db.upsert_golfer("1", "A", "One", false).unwrap();
        let g2 = db.upsert_golfer("2", "B", "Two", false).unwrap();
        db.add_field_entry(id, g1).unwrap();
        db.add_field_entry(id, g2).unwrap();
        submit_pick(&db, bob.id, id, g1, g2, Utc.with_ymd_and_hms(2026, 4, 8, 12, 0, 0).unwrap())
            .unwrap();

        let event = LifecycleEvent::DeadlineApproaching {
            tournament: id,
            window: ReminderWindow::DayBefore,
        };
        dispatcher.dispatch(&event).await.unwrap();
        let sent = notifier.sent();
        assert_eq!(sent[0].kind, "reminder_24h");
        assert_eq!(usernames(&sent[0]), vec!["alice"]);

        // A different window is a different notice.
        let event = LifecycleEvent::DeadlineApproaching {
            tournament: id,
            window: ReminderWindow::HourBefore,
        };
        assert!(matches!(
            dispatcher.dispatch(&event).await.unwrap(),
            DispatchOutcome::Sent { recipients: 1 }
        ));
    }

    #[tokio::test]
    async fn reminders_are_dropped_once_play_starts() {
        let (db, notifier, dispatcher, id) = setup();
        db.set_phase(id, Phase::InProgress).unwrap();
        let event = LifecycleEvent::DeadlineApproaching {
            tournament: id,
            window: ReminderWindow::HourBefore,
        };
        assert_eq!(dispatcher.dispatch(&event).await.unwrap(), DispatchOutcome::Ignored);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn short_field_alerts_admins_only() {
        let (_db, notifier, dispatcher, id) = setup();
        let event = LifecycleEvent::FieldShort {
            tournament: id,
            field_size: 12,
            minimum: 50,
        };
        dispatcher.dispatch(&event).await.unwrap();
        assert_eq!(usernames(&notifier.sent()[0]), vec!["alice"]);
    }

    #[tokio::test]
    async fn lock_and_start_events_carry_no_notice() {
        let (_db, notifier, dispatcher, id) = setup();
        for event in [
            LifecycleEvent::CutoffPassed { tournament: id },
            LifecycleEvent::TournamentStarted { tournament: id },
        ] {
            assert_eq!(dispatcher.dispatch(&event).await.unwrap(), DispatchOutcome::Ignored);
        }
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_tournament_is_reported_not_sent() {
        let (_db, notifier, dispatcher, _id) = setup();
        let event = LifecycleEvent::TournamentFinalized {
            tournament: TournamentId(999),
        };
        assert_eq!(
            dispatcher.dispatch(&event).await.unwrap(),
            DispatchOutcome::TournamentMissing
        );
        assert!(notifier.sent().is_empty());
    }

    // ------------------------------------------------------------------
    // Failure and the channel loop
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn failed_delivery_releases_the_claim() {
        let (_db, notifier, dispatcher, id) = setup();
        let event = LifecycleEvent::TournamentFinalized { tournament: id };

        notifier.fail.store(true, Ordering::SeqCst);
        let err = dispatcher.dispatch(&event).await.unwrap_err();
        assert!(format!("{err:#}").contains("mail relay refused connection"));

        notifier.fail.store(false, Ordering::SeqCst);
        assert_eq!(
            dispatcher.dispatch(&event).await.unwrap(),
            DispatchOutcome::Sent { recipients: 2 }
        );
    }

    #[tokio::test]
    async fn spawned_loop_drains_the_queue() {
        let (_db, notifier, dispatcher, id) = setup();
        let (tx, handle) = dispatcher.spawn(8);

        tx.send(LifecycleEvent::FieldPopulated {
            tournament: id,
            field_size: 88,
        })
        .await
        .unwrap();
        tx.send(LifecycleEvent::FieldPopulated {
            tournament: id,
            field_size: 89,
        })
        .await
        .unwrap();
        tx.send(LifecycleEvent::TournamentFinalized { tournament: id })
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        let kinds: Vec<&str> = notifier.sent().iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec!["picks_open", "finalized"]);
    }
}
