// Operator commands against an in-memory database and a canned feed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use fairway_app::commands::{AppContext, Cli, Command};
use fairway_app::config::{load_config_from, Config};
use fairway_app::feed::{Earnings, FeedError, Leaderboard, ResultsFeed, Schedule};
use fairway_app::notify::{Notice, Notifier};
use fairway_app::sync::SyncStep;
use fairway_core::db::Database;
use fairway_core::lifecycle::FixedClock;
use fairway_core::model::{GolferId, GolferResult, Phase, ResultStatus};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CannedFeed {
    schedule: Mutex<Option<Value>>,
    boards: Mutex<HashMap<String, Value>>,
    earnings: Mutex<HashMap<String, Value>>,
}

fn canned<T: serde::de::DeserializeOwned>(endpoint: &str, value: Option<Value>) -> Result<T, FeedError> {
    value
        .map(|v| serde_json::from_value(v).unwrap())
        .ok_or(FeedError::Unavailable {
            endpoint: endpoint.to_string(),
            attempts: 1,
        })
}

#[async_trait]
impl ResultsFeed for CannedFeed {
    async fn schedule(&self, _year: i32) -> Result<Schedule, FeedError> {
        canned("schedule", self.schedule.lock().unwrap().clone())
    }

    async fn leaderboard(&self, tourn_id: &str, _year: i32) -> Result<Leaderboard, FeedError> {
        canned("leaderboard", self.boards.lock().unwrap().get(tourn_id).cloned())
    }

    async fn earnings(&self, tourn_id: &str, _year: i32) -> Result<Earnings, FeedError> {
        canned("earnings", self.earnings.lock().unwrap().get(tourn_id).cloned())
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Notice>>,
}

#[async_trait]
impl Notifier for Outbox {
    async fn deliver(&self, notice: &Notice) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

fn default_config(name: &str) -> Config {
    let crate_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let tmp = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&tmp);
    std::fs::create_dir_all(tmp.join("config")).unwrap();
    std::fs::copy(
        crate_root.join("defaults/league.toml"),
        tmp.join("config/league.toml"),
    )
    .unwrap();
    let config = load_config_from(&tmp).unwrap();
    let _ = std::fs::remove_dir_all(&tmp);
    config
}

fn utc(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, hour, 0, 0).unwrap()
}

fn date(dt: DateTime<Utc>) -> Value {
    json!({"$date": {"$numberLong": dt.timestamp_millis().to_string()}})
}

fn row(id: &str, status: &str, position: &str, rounds: usize) -> Value {
    json!({
        "playerId": id,
        "firstName": "Player",
        "lastName": id,
        "status": status,
        "position": position,
        "rounds": vec![json!({}); rounds],
        "teeTimeTimestamp": date(utc(4, 9, 11)),
    })
}

struct Harness {
    ctx: AppContext,
    clock: Arc<FixedClock>,
    feed: Arc<CannedFeed>,
    outbox: Arc<Outbox>,
}

impl Harness {
    fn new(name: &str, now: DateTime<Utc>) -> Self {
        let clock = Arc::new(FixedClock::new(now));
        let feed = Arc::new(CannedFeed::default());
        let outbox = Arc::new(Outbox::default());
        let ctx = AppContext::new(default_config(name), Database::open(":memory:").unwrap())
            .with_clock(clock.clone())
            .with_feed(feed.clone())
            .with_notifier(outbox.clone());
        Self {
            ctx,
            clock,
            feed,
            outbox,
        }
    }

    async fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("fairway").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        cli.command.run(&self.ctx, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn golfer(&self, external_id: &str) -> GolferId {
        self.ctx.db.golfer_by_external_id(external_id).unwrap().unwrap().id
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[test]
fn sync_mode_defaults_to_all() {
    let cli = Cli::try_parse_from(["fairway", "sync"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::Sync {
            mode: SyncStep::All,
            force: false
        }
    ));
}

#[test]
fn sync_modes_parse_in_kebab_case() {
    let cli = Cli::try_parse_from(["fairway", "sync", "--mode", "live-with-wd", "--force"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::Sync {
            mode: SyncStep::LiveWithWd,
            force: true
        }
    ));
    assert!(Cli::try_parse_from(["fairway", "sync", "--mode", "hourly"]).is_err());
}

#[test]
fn resolve_requires_a_tournament_id() {
    assert!(Cli::try_parse_from(["fairway", "resolve"]).is_err());
    let cli = Cli::try_parse_from(["fairway", "resolve", "7"]).unwrap();
    assert!(matches!(cli.command, Command::Resolve { tournament_id: 7 }));
}

// ---------------------------------------------------------------------------
// A week of operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn masters_week_from_schedule_to_standings() {
    // Monday of Masters week.
    let h = Harness::new("fairway-commands-week", utc(4, 6, 15));

    h.run(&["add-contestant", "alice", "alice@example.com", "--display-name", "Alice", "--admin"])
        .await
        .unwrap();
    h.run(&["add-contestant", "bob", "bob@example.com"]).await.unwrap();

    *h.feed.schedule.lock().unwrap() = Some(json!({"schedule": [
        {"tournId": "014", "name": "Masters Tournament", "format": "stroke",
         "purse": {"$numberInt": "1000000"},
         "date": {"start": date(utc(4, 9, 12)), "end": date(utc(4, 12, 23))}},
    ]}));
    let out = h.run(&["sync", "--mode", "schedule"]).await.unwrap();
    assert!(out.contains("ran: schedule"));
    let masters = h.ctx.db.tournament_by_external_id("014", 2026).unwrap().unwrap();
    assert_eq!(masters.week_number, Some(1));

    h.feed.boards.lock().unwrap().insert(
        "014".into(),
        json!({"status": "Not Started", "leaderboardRows": [
            row("1", "active", "", 0), row("2", "active", "", 0), row("3", "active", "", 0),
        ]}),
    );
    h.run(&["sync", "--mode", "field"]).await.unwrap();
    let masters = h.ctx.db.tournament(masters.id).unwrap().unwrap();
    assert_eq!(masters.phase, Phase::OpenForPicks);
    assert_eq!(masters.pick_deadline, Some(utc(4, 9, 11)));

    let tid = masters.id.to_string();
    let (g1, g2, g3) = (h.golfer("1"), h.golfer("2"), h.golfer("3"));
    h.run(&["pick", "alice", &tid, &g1.to_string(), &g2.to_string()]).await.unwrap();
    h.run(&["pick", "bob", &tid, &g3.to_string(), &g1.to_string()]).await.unwrap();

    let err = h
        .run(&["pick", "bob", &tid, &g3.to_string(), &g3.to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("pick rejected"));

    // Sunday night: official results are in.
    h.clock.set(utc(4, 13, 1));
    h.feed.boards.lock().unwrap().insert(
        "014".into(),
        json!({"status": "Official", "leaderboardRows": [
            row("1", "wd", "WD", 1), row("2", "complete", "1", 4), row("3", "complete", "2", 4),
        ]}),
    );
    h.feed.earnings.lock().unwrap().insert(
        "014".into(),
        json!({"leaderboard": [
            {"playerId": "2", "earnings": 180000},
            {"playerId": "3", "earnings": 109000},
        ]}),
    );
    let out = h.run(&["sync", "--mode", "results"]).await.unwrap();
    assert!(out.contains("2 resolved, 0 skipped"), "{out}");

    let finalized: Vec<String> = h
        .outbox
        .sent
        .lock()
        .unwrap()
        .iter()
        .filter(|n| n.kind == "finalized")
        .map(|n| n.tournament_name.clone())
        .collect();
    assert_eq!(finalized, vec!["Masters Tournament".to_string()]);

    let out = h.run(&["standings"]).await.unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].contains("Alice") && lines[0].contains("180000"), "{out}");
    assert!(lines[1].contains("bob") && lines[1].contains("109000"), "{out}");

    // Operator swaps bob's golfers; the pick is unsettled until resolved again.
    let bob = h.ctx.db.contestant_by_username("bob").unwrap().unwrap();
    let bob_pick = h.ctx.db.pick_for(bob.id, masters.id).unwrap().unwrap();
    let out = h
        .run(&["override", &bob_pick.id.to_string(), &g2.to_string(), &g3.to_string()])
        .await
        .unwrap();
    assert!(out.contains(&format!("fairway resolve {tid}")), "{out}");
    assert!(h.ctx.db.used_golfers(bob.id, 2026).unwrap().is_empty());

    let out = h.run(&["resolve", &tid]).await.unwrap();
    assert!(out.starts_with("resolved 2, skipped 0"), "{out}");

    let out = h.run(&["standings", "--json"]).await.unwrap();
    let table: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(table[0]["rank"], 1);
    assert_eq!(table[1]["rank"], 1);
    assert_eq!(table[1]["contestant"]["username"], "bob");
    assert_eq!(table[1]["total_points"], 180_000);
}

#[tokio::test]
async fn sync_without_feed_data_changes_nothing() {
    let h = Harness::new("fairway-commands-outage", utc(4, 6, 15));
    let out = h.run(&["sync", "--mode", "schedule"]).await.unwrap();
    assert!(out.contains("ran: schedule"));
    assert!(h.ctx.db.tournaments_for_season(2026).unwrap().is_empty());
}

#[tokio::test]
async fn resolve_refuses_a_tournament_still_in_play() {
    let h = Harness::new("fairway-commands-not-final", utc(4, 10, 15));
    *h.feed.schedule.lock().unwrap() = Some(json!({"schedule": [
        {"tournId": "014", "name": "Masters Tournament",
         "date": {"start": date(utc(4, 9, 12)), "end": date(utc(4, 12, 23))}},
    ]}));
    h.run(&["sync", "--mode", "schedule", "--force"]).await.unwrap();
    h.run(&["refresh"]).await.unwrap();

    let err = h.run(&["resolve", "1"]).await.unwrap_err();
    assert!(err.to_string().contains("not final"), "{err}");
}

#[tokio::test]
async fn resolve_advances_a_finished_tournament_without_refresh() {
    let h = Harness::new("fairway-commands-late-resolve", utc(4, 6, 15));
    h.run(&["add-contestant", "alice", "alice@example.com"]).await.unwrap();

    *h.feed.schedule.lock().unwrap() = Some(json!({"schedule": [
        {"tournId": "014", "name": "Masters Tournament",
         "date": {"start": date(utc(4, 9, 12)), "end": date(utc(4, 12, 23))}},
    ]}));
    h.run(&["sync", "--mode", "schedule", "--force"]).await.unwrap();
    h.feed.boards.lock().unwrap().insert(
        "014".into(),
        json!({"status": "Not Started", "leaderboardRows": [
            row("1", "active", "", 0), row("2", "active", "", 0),
        ]}),
    );
    h.run(&["sync", "--mode", "field", "--force"]).await.unwrap();

    let masters = h.ctx.db.tournament_by_external_id("014", 2026).unwrap().unwrap();
    let tid = masters.id.to_string();
    let (g1, g2) = (h.golfer("1"), h.golfer("2"));
    h.run(&["pick", "alice", &tid, &g1.to_string(), &g2.to_string()]).await.unwrap();

    // A week after the final round, with nothing having refreshed phases.
    h.clock.set(utc(4, 20, 12));
    h.ctx
        .db
        .upsert_result(&GolferResult {
            tournament_id: masters.id,
            golfer_id: g1,
            status: ResultStatus::Complete,
            position: Some("1".into()),
            earnings: Some(3_600_000),
            rounds_completed: 4,
        })
        .unwrap();
    assert_eq!(h.ctx.db.tournament(masters.id).unwrap().unwrap().phase, Phase::OpenForPicks);

    let out = h.run(&["resolve", &tid]).await.unwrap();
    assert!(out.starts_with("resolved 1, skipped 0"), "{out}");
    assert_eq!(h.ctx.db.tournament(masters.id).unwrap().unwrap().phase, Phase::Final);

    let kinds: Vec<&str> = h.outbox.sent.lock().unwrap().iter().map(|n| n.kind).collect();
    assert!(kinds.contains(&"finalized"), "{kinds:?}");
}

#[tokio::test]
async fn pick_after_an_unrefreshed_cutoff_is_rejected() {
    let h = Harness::new("fairway-commands-late-pick", utc(4, 6, 15));
    h.run(&["add-contestant", "alice", "alice@example.com"]).await.unwrap();
    *h.feed.schedule.lock().unwrap() = Some(json!({"schedule": [
        {"tournId": "014", "name": "Masters Tournament",
         "date": {"start": date(utc(4, 9, 12)), "end": date(utc(4, 12, 23))}},
    ]}));
    h.run(&["sync", "--mode", "schedule", "--force"]).await.unwrap();
    h.feed.boards.lock().unwrap().insert(
        "014".into(),
        json!({"status": "Not Started", "leaderboardRows": [
            row("1", "active", "", 0), row("2", "active", "", 0),
        ]}),
    );
    h.run(&["sync", "--mode", "field", "--force"]).await.unwrap();
    let masters = h.ctx.db.tournament_by_external_id("014", 2026).unwrap().unwrap();

    h.clock.set(utc(4, 10, 15));
    let (g1, g2) = (h.golfer("1"), h.golfer("2"));
    let err = h
        .run(&["pick", "alice", &masters.id.to_string(), &g1.to_string(), &g2.to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("pick rejected"), "{err}");
    assert_eq!(h.ctx.db.tournament(masters.id).unwrap().unwrap().phase, Phase::InProgress);
}
