use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::league::{League, Season, Team};

/// One derived strength record per (team, season).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Identity key: team id joined with the season sort key.
    pub id: String,
    pub team_id: i64,
    pub season: u32,
    pub league: League,
    pub win_percentage: f64,
    pub pythagorean_expectation: f64,
    pub last_update: DateTime<Utc>,
}

impl FeatureRecord {
    pub fn record_id(team_id: i64, season: u32) -> String {
        format!("{team_id}_{season}")
    }

    pub fn new(
        team_id: i64,
        season: u32,
        league: League,
        win_percentage: f64,
        pythagorean_expectation: f64,
        last_update: DateTime<Utc>,
    ) -> Self {
        FeatureRecord {
            id: Self::record_id(team_id, season),
            team_id,
            season,
            league,
            win_percentage,
            pythagorean_expectation,
            last_update,
        }
    }
}

/// A loaded-but-uncleaned match history frame.
///
/// Column content differs by backend: the flat-file backend carries raw
/// feed team names, the relational backend carries registered team codes.
/// `teams_are_codes` masks that difference for the cleaning step.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    pub rows: Vec<RawMatch>,
    pub teams_are_codes: bool,
}

/// One uncleaned match row. Fields stay optional until the cleaning
/// step decides what can be defaulted and what is a hard error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMatch {
    pub home: Option<String>,
    pub away: Option<String>,
    pub home_goal: Option<i64>,
    pub away_goal: Option<i64>,
    /// "H" | "D" | "A" when present.
    pub result: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub attendance: Option<f64>,
    pub season: Option<String>,
}

/// Uniform contract over the two storage backends.
///
/// Implementations must keep aggregation semantics identical: the same
/// match data expressed in either backend yields the same cleaned frame.
pub trait DataAccess: Send + Sync {
    /// Resolves a team name to its code, canonicalizing known name
    /// variants first.
    fn resolve_code(&self, league: League, team_name: &str) -> Result<String, DataError>;

    /// Resolves a team code to its numeric id.
    fn resolve_id(&self, code: &str) -> Result<i64, DataError>;

    /// Bulk team registration. Duplicate codes, in the batch or against
    /// already-registered teams, reject the whole batch.
    fn register_teams(&self, teams: &[Team]) -> Result<(), DataError>;

    /// Upserts derived feature records by id: numeric fields and
    /// `last_update` are overwritten in place for existing ids, new ids
    /// are inserted. One logical operation per record.
    fn upsert_features(&self, records: &[FeatureRecord]) -> Result<(), DataError>;

    /// Season-filtered slice of the persisted feature table.
    fn load_features(&self, league: League, season: Season) -> Result<Vec<FeatureRecord>, DataError>;

    /// Full match history for a league, shape as stored.
    fn load_matches(&self, league: League) -> Result<RawFrame, DataError>;

    /// Replaces the stored current-season slice with `rows` (file
    /// backend) or inserts the set difference against existing rows
    /// keyed by season, league, home, away and date (relational).
    fn replace_current_season(&self, league: League, rows: &[RawMatch]) -> Result<(), DataError>;
}
