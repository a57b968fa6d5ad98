// Provider response shapes.
//
// Numbers arrive as plain JSON numbers, strings, or MongoDB extended JSON
// (`{"$numberInt": "5"}`, `{"$numberLong": "5"}`); dates as
// `{"$date": {"$numberLong": "<millis>"}}`.

use chrono::{DateTime, Utc};
use fairway_core::lifecycle::is_final_status;
use serde::Deserialize;

/// A number in any of the provider's encodings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ApiNumber {
    Int(i64),
    Float(f64),
    Text(String),
    NumberInt {
        #[serde(rename = "$numberInt")]
        value: String,
    },
    NumberLong {
        #[serde(rename = "$numberLong")]
        value: String,
    },
}

impl ApiNumber {
    /// The integer value, or `None` when blank or unparseable.
    pub fn value(&self) -> Option<i64> {
        match self {
            ApiNumber::Int(n) => Some(*n),
            ApiNumber::Float(f) if f.is_finite() => Some(*f as i64),
            ApiNumber::Float(_) => None,
            ApiNumber::Text(s)
            | ApiNumber::NumberInt { value: s }
            | ApiNumber::NumberLong { value: s } => parse_text_number(s),
        }
    }
}

fn parse_text_number(s: &str) -> Option<i64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '$').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
}

/// A timestamp in milliseconds since the epoch, possibly wrapped in `$date`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ApiDate {
    Extended {
        #[serde(rename = "$date")]
        date: ApiNumber,
    },
    Millis(ApiNumber),
}

impl ApiDate {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let millis = match self {
            ApiDate::Extended { date } => date.value()?,
            ApiDate::Millis(n) => n.value()?,
        };
        DateTime::from_timestamp_millis(millis)
    }
}

// ---------------------------------------------------------------------------
// /schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub schedule: Vec<ScheduleEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    pub tourn_id: String,
    #[serde(default)]
    pub name: String,
    pub date: EventDates,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub purse: Option<ApiNumber>,
}

impl ScheduleEvent {
    pub fn is_team_event(&self) -> bool {
        self.format.as_deref() == Some("team")
    }

    /// Published purse, if positive.
    pub fn purse(&self) -> Option<i64> {
        self.purse.as_ref().and_then(ApiNumber::value).filter(|p| *p > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventDates {
    pub start: ApiDate,
    pub end: ApiDate,
}

// ---------------------------------------------------------------------------
// /leaderboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Leaderboard {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "leaderboardRows")]
    pub rows: Vec<LeaderboardRow>,
}

impl Leaderboard {
    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("")
    }

    /// The provider has declared the results complete or official.
    pub fn is_official(&self) -> bool {
        is_final_status(self.status())
    }

    pub fn positions(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.position.as_deref().unwrap_or(""))
            .collect()
    }

    pub fn row(&self, player_id: &str) -> Option<&LeaderboardRow> {
        self.rows.iter().find(|row| row.player_id == player_id)
    }

    /// The earliest tee time on the board.
    pub fn first_tee_time(&self) -> Option<DateTime<Utc>> {
        self.rows
            .iter()
            .filter_map(|row| row.tee_time_timestamp.as_ref()?.to_utc())
            .min()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub player_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_amateur: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub rounds: Vec<serde_json::Value>,
    #[serde(default)]
    pub tee_time_timestamp: Option<ApiDate>,
}

impl LeaderboardRow {
    /// Number of round entries, capped at four.
    pub fn rounds_completed(&self) -> u8 {
        self.rounds.len().min(4) as u8
    }

    pub fn is_withdrawn(&self) -> bool {
        self.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("wd"))
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

// ---------------------------------------------------------------------------
// /earnings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Earnings {
    #[serde(default)]
    pub leaderboard: Vec<EarningsRow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsRow {
    pub player_id: String,
    #[serde(default)]
    pub earnings: Option<ApiNumber>,
}

impl EarningsRow {
    /// Official earnings; a missing or blank value means nothing was won.
    pub fn amount(&self) -> i64 {
        self.earnings.as_ref().and_then(ApiNumber::value).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn numbers_in_every_encoding() {
        let cases = [
            (r#"9100000"#, Some(9_100_000)),
            (r#""9100000""#, Some(9_100_000)),
            (r#""$9,100,000""#, Some(9_100_000)),
            (r#"{"$numberInt": "4200000"}"#, Some(4_200_000)),
            (r#"{"$numberLong": "1775692800000"}"#, Some(1_775_692_800_000)),
            (r#"12.0"#, Some(12)),
            (r#""""#, None),
        ];
        for (json, expected) in cases {
            let n: ApiNumber = serde_json::from_str(json).unwrap();
            assert_eq!(n.value(), expected, "{json}");
        }
    }

    #[test]
    fn extended_json_dates() {
        let d: ApiDate = serde_json::from_str(r#"{"$date": {"$numberLong": "1775692800000"}}"#).unwrap();
        assert_eq!(d.to_utc(), Some(Utc.with_ymd_and_hms(2026, 4, 9, 0, 0, 0).unwrap()));

        let d: ApiDate = serde_json::from_str(r#"1775692800000"#).unwrap();
        assert_eq!(d.to_utc(), Some(Utc.with_ymd_and_hms(2026, 4, 9, 0, 0, 0).unwrap()));
    }

    #[test]
    fn schedule_event_flags() {
        let json = r#"{
            "schedule": [{
                "tournId": "018",
                "name": "Zurich Classic of New Orleans",
                "format": "team",
                "purse": {"$numberInt": "0"},
                "date": {
                    "start": {"$date": {"$numberLong": "1776902400000"}},
                    "end": {"$date": {"$numberLong": "1777161600000"}}
                }
            }]
        }"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        let event = &schedule.schedule[0];
        assert!(event.is_team_event());
        assert_eq!(event.purse(), None);
        assert!(event.date.start.to_utc().unwrap() < event.date.end.to_utc().unwrap());
    }

    #[test]
    fn leaderboard_rows_and_tee_times() {
        let json = r#"{
            "status": "Official",
            "leaderboardRows": [
                {"playerId": "1", "firstName": "A", "lastName": "One", "status": "complete",
                 "position": "1", "rounds": [{}, {}, {}, {}],
                 "teeTimeTimestamp": {"$date": {"$numberLong": "1775735400000"}}},
                {"playerId": "2", "firstName": "B", "lastName": "Two", "status": "wd",
                 "position": "WD", "rounds": [{}],
                 "teeTimeTimestamp": {"$date": {"$numberLong": "1775734200000"}}},
                {"playerId": "3", "isAmateur": true}
            ]
        }"#;
        let board: Leaderboard = serde_json::from_str(json).unwrap();
        assert!(board.is_official());
        for status in ["Round 3 Complete", "Incomplete", "Unofficial", "In Progress"] {
            let pending: Leaderboard = serde_json::from_value(serde_json::json!({"status": status})).unwrap();
            assert!(!pending.is_official(), "{status}");
        }
        assert_eq!(board.positions(), vec!["1", "WD", ""]);
        assert_eq!(board.row("2").unwrap().rounds_completed(), 1);
        assert!(board.row("2").unwrap().is_withdrawn());
        assert!(board.row("3").unwrap().is_amateur);
        assert_eq!(
            board.first_tee_time(),
            Some(Utc.timestamp_millis_opt(1_775_734_200_000).unwrap())
        );
    }

    #[test]
    fn earnings_amount_defaults_to_zero() {
        let json = r#"{"leaderboard": [
            {"playerId": "1", "earnings": {"$numberInt": "3600000"}},
            {"playerId": "2"}
        ]}"#;
        let earnings: Earnings = serde_json::from_str(json).unwrap();
        assert_eq!(earnings.leaderboard[0].amount(), 3_600_000);
        assert_eq!(earnings.leaderboard[1].amount(), 0);
    }
}
