use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};

use crate::data_access::{DataAccess, FeatureRecord};
use crate::dataset::{DEFAULT_KICKOFF, LeagueData, MatchRow};
use crate::error::DataError;
use crate::feature_cache::FeatureSource;
use crate::league::{League, Season};

/// Season scope for a derivation run. Current-season tables are the
/// cached serving path; full-history derivation is for training and
/// always recomputes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonFilter {
    Current,
    All,
}

/// Fixed training-frame column order. Frames handed to the classifier
/// must match this exactly, in this order.
pub const TRAINING_COLUMNS: [&str; 10] = [
    "date",
    "time",
    "home_team",
    "away_team",
    "season",
    "attendance",
    "home_win_percentage",
    "away_win_percentage",
    "home_pyth_expectation",
    "away_pyth_expectation",
];

/// One classifier-ready row, fields in `TRAINING_COLUMNS` order.
/// Date and time are integer-encoded (days from CE, seconds from
/// midnight) so the whole row flattens to numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub date: i64,
    pub time: i64,
    pub home_team: i64,
    pub away_team: i64,
    pub season: u32,
    pub attendance: f64,
    pub home_win_percentage: f64,
    pub away_win_percentage: f64,
    pub home_pyth_expectation: f64,
    pub away_pyth_expectation: f64,
}

impl TrainingRow {
    pub fn to_vector(&self) -> [f64; 10] {
        [
            self.date as f64,
            self.time as f64,
            self.home_team as f64,
            self.away_team as f64,
            f64::from(self.season),
            self.attendance,
            self.home_win_percentage,
            self.away_win_percentage,
            self.home_pyth_expectation,
            self.away_pyth_expectation,
        ]
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TeamSeasonAcc {
    games: f64,
    wins: f64,
    goals_for: f64,
    goals_against: f64,
}

/// Derives win percentage and Pythagorean expectation per (season,
/// team) from cleaned match rows. Pure aggregation, O(matches);
/// backend-agnostic by construction.
///
/// Each match contributes a home-perspective win value (1/0.5/0) and
/// the mirrored away-perspective value; goals for/against accumulate
/// across both perspectives. Teams with no matches in a season simply
/// never appear.
pub fn derive_features(
    rows: &[MatchRow],
    league: League,
    filter: SeasonFilter,
    now: DateTime<Utc>,
) -> Vec<FeatureRecord> {
    let current = Season::CURRENT.as_int();
    let mut acc: HashMap<(u32, i64), TeamSeasonAcc> = HashMap::new();
    for m in rows {
        if filter == SeasonFilter::Current && m.season != current {
            continue;
        }
        let home_win_value = match m.result {
            1 => 1.0,
            0 => 0.5,
            _ => 0.0,
        };
        let away_win_value = match m.result {
            -1 => 1.0,
            0 => 0.5,
            _ => 0.0,
        };

        let home = acc.entry((m.season, m.home_team)).or_default();
        home.games += 1.0;
        home.wins += home_win_value;
        home.goals_for += m.home_goal as f64;
        home.goals_against += m.away_goal as f64;

        let away = acc.entry((m.season, m.away_team)).or_default();
        away.games += 1.0;
        away.wins += away_win_value;
        away.goals_for += m.away_goal as f64;
        away.goals_against += m.home_goal as f64;
    }

    let mut out: Vec<FeatureRecord> = acc
        .into_iter()
        .map(|((season, team_id), t)| {
            let win_percentage = t.wins / t.games;
            let gf2 = t.goals_for * t.goals_for;
            let ga2 = t.goals_against * t.goals_against;
            // 0 goals for and against divides 0/0; the NaN stays NaN
            // rather than masquerading as a valid score.
            let pyth = gf2 / (gf2 + ga2);
            FeatureRecord::new(team_id, season, league, win_percentage, pyth, now)
        })
        .collect();
    out.sort_by(|a, b| a.season.cmp(&b.season).then(a.team_id.cmp(&b.team_id)));
    out
}

/// Joins cleaned match rows with their derived features into the fixed
/// training frame, returning the frame and the outcome labels.
pub fn training_frame(
    rows: &[MatchRow],
    features: &[FeatureRecord],
) -> Result<(Vec<TrainingRow>, Vec<i8>), DataError> {
    let by_key: HashMap<(u32, i64), &FeatureRecord> = features
        .iter()
        .map(|f| ((f.season, f.team_id), f))
        .collect();

    let mut frame = Vec::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());
    for m in rows {
        let home = by_key.get(&(m.season, m.home_team)).ok_or(
            DataError::TeamFeaturesMissing {
                team_id: m.home_team,
                season: m.season,
            },
        )?;
        let away = by_key.get(&(m.season, m.away_team)).ok_or(
            DataError::TeamFeaturesMissing {
                team_id: m.away_team,
                season: m.season,
            },
        )?;
        frame.push(row_for(m, home, away));
        labels.push(m.result);
    }
    Ok((frame, labels))
}

fn row_for(m: &MatchRow, home: &FeatureRecord, away: &FeatureRecord) -> TrainingRow {
    TrainingRow {
        date: i64::from(m.date.num_days_from_ce()),
        time: i64::from(m.time.num_seconds_from_midnight()),
        home_team: m.home_team,
        away_team: m.away_team,
        season: m.season,
        attendance: m.attendance,
        home_win_percentage: home.win_percentage,
        away_win_percentage: away.win_percentage,
        home_pyth_expectation: home.pythagorean_expectation,
        away_pyth_expectation: away.pythagorean_expectation,
    }
}

/// Builds the one-row frame for a single upcoming match, with the same
/// columns and defaults as training rows. Features come from the cached
/// current-season table.
pub fn single_match_frame(
    store: &dyn DataAccess,
    home_code: &str,
    away_code: &str,
    attendance: f64,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    features: &[FeatureRecord],
) -> Result<TrainingRow, DataError> {
    let home_team = store.resolve_id(home_code)?;
    let away_team = store.resolve_id(away_code)?;
    let season = Season::CURRENT.as_int();

    let lookup = |team_id: i64| {
        features
            .iter()
            .find(|f| f.team_id == team_id && f.season == season)
            .ok_or(DataError::TeamFeaturesMissing { team_id, season })
    };
    let home = lookup(home_team)?;
    let away = lookup(away_team)?;

    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let time = time.unwrap_or_else(|| {
        NaiveTime::parse_from_str(DEFAULT_KICKOFF, "%H:%M").expect("static kickoff sentinel")
    });

    Ok(TrainingRow {
        date: i64::from(date.num_days_from_ce()),
        time: i64::from(time.num_seconds_from_midnight()),
        home_team,
        away_team,
        season,
        attendance,
        home_win_percentage: home.win_percentage,
        away_win_percentage: away.win_percentage,
        home_pyth_expectation: home.pythagorean_expectation,
        away_pyth_expectation: away.pythagorean_expectation,
    })
}

/// Canonical cache source: load and clean the league history, derive
/// the current-season table, and persist it through the backend upsert
/// before handing it to the cache.
pub struct StoreFeatureSource {
    store: Arc<dyn DataAccess>,
}

impl StoreFeatureSource {
    pub fn new(store: Arc<dyn DataAccess>) -> Self {
        StoreFeatureSource { store }
    }
}

impl FeatureSource for StoreFeatureSource {
    fn compute(&self, league: League) -> Result<Vec<FeatureRecord>> {
        let rows = LeagueData::new(league, self.store.clone()).load()?;
        let records = derive_features(&rows, league, SeasonFilter::Current, Utc::now());
        self.store
            .upsert_features(&records)
            .with_context(|| format!("persist derived features for {league}"))?;
        Ok(records)
    }
}
