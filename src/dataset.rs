use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::info;

use crate::data_access::{DataAccess, RawFrame};
use crate::error::DataError;
use crate::league::{League, Season};
use crate::season_feed;

/// Kickoff time used when the source omits one.
pub const DEFAULT_KICKOFF: &str = "13:30";

/// One cleaned, training-ready match row. Teams are resolved to numeric
/// ids; result is encoded -1 away win / 0 draw / +1 home win.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub home_team: i64,
    pub away_team: i64,
    pub home_goal: i64,
    pub away_goal: i64,
    pub league: League,
    pub date: NaiveDate,
    /// Monday = 0, kept as a feature.
    pub day_of_week: u32,
    pub time: NaiveTime,
    pub attendance: f64,
    pub season: u32,
    pub result: i8,
}

/// Per-league container producing a uniform cleaned frame regardless of
/// which backend the history is stored in. Only loading and persistence
/// vary by backend; cleaning and aggregation never branch on it.
pub struct LeagueData {
    league: League,
    store: Arc<dyn DataAccess>,
}

impl LeagueData {
    pub fn new(league: League, store: Arc<dyn DataAccess>) -> Self {
        LeagueData { league, store }
    }

    pub fn league(&self) -> League {
        self.league
    }

    /// Loads the full match history through the configured backend and
    /// cleans it into training shape.
    pub fn load(&self) -> Result<Vec<MatchRow>> {
        let frame = self
            .store
            .load_matches(self.league)
            .with_context(|| format!("load match history for {}", self.league))?;
        self.clean(frame)
    }

    /// Raw-to-training cleaning: canonical columns, result encoding,
    /// date parsing, kickoff/attendance defaults, name-to-code-to-id
    /// resolution and season normalization.
    ///
    /// A row is dropped only when no match identity can be established,
    /// i.e. all of home, away, both goal counts and the date are absent.
    /// A row that still names its teams is kept even without a date;
    /// the season opening stands in so one gappy row cannot fail the
    /// whole frame.
    pub fn clean(&self, frame: RawFrame) -> Result<Vec<MatchRow>> {
        let mut rows = Vec::with_capacity(frame.rows.len());
        for raw in &frame.rows {
            let no_identity = raw.home.is_none()
                && raw.away.is_none()
                && raw.home_goal.is_none()
                && raw.away_goal.is_none()
                && raw.date.is_none();
            if no_identity {
                continue;
            }

            let home_label = raw
                .home
                .as_deref()
                .ok_or_else(|| DataError::Corrupt("match row missing home team".to_string()))?;
            let away_label = raw
                .away
                .as_deref()
                .ok_or_else(|| DataError::Corrupt("match row missing away team".to_string()))?;
            let season_raw = raw
                .season
                .as_deref()
                .ok_or_else(|| DataError::Corrupt("match row missing season".to_string()))?;
            let season = Season::parse(season_raw)?;

            let home_code = if frame.teams_are_codes {
                home_label.to_string()
            } else {
                self.store.resolve_code(self.league, home_label)?
            };
            let away_code = if frame.teams_are_codes {
                away_label.to_string()
            } else {
                self.store.resolve_code(self.league, away_label)?
            };
            let home_team = self.store.resolve_id(&home_code)?;
            let away_team = self.store.resolve_id(&away_code)?;

            let date = match raw.date.as_deref() {
                Some(raw_date) => parse_mixed_date(raw_date)?,
                None => season_opening(season),
            };
            let home_goal = raw.home_goal.unwrap_or(0);
            let away_goal = raw.away_goal.unwrap_or(0);
            let result = match raw.result.as_deref() {
                Some("H") => 1,
                Some("A") => -1,
                Some("D") => 0,
                _ => (home_goal - away_goal).signum() as i8,
            };

            rows.push(MatchRow {
                home_team,
                away_team,
                home_goal,
                away_goal,
                league: self.league,
                date,
                day_of_week: date.weekday().num_days_from_monday(),
                time: parse_kickoff(raw.time.as_deref())?,
                attendance: raw.attendance.unwrap_or(0.0),
                season: season.as_int(),
                result,
            });
        }
        Ok(rows)
    }

    /// Fetches the current season from the external feed, tags it, and
    /// persists it through the backend when asked. Feed failures are
    /// hard errors carrying league, season and URL context.
    pub fn update_current_season(&self, persist: bool) -> Result<usize> {
        let season = Season::CURRENT;
        let mut rows = season_feed::fetch_season(self.league, season)?;
        for row in &mut rows {
            row.season = Some(season.storage_label());
            if row.attendance.is_none() {
                row.attendance = Some(0.0);
            }
        }
        info!(
            league = %self.league,
            season = %season,
            rows = rows.len(),
            "fetched current season feed"
        );

        if persist {
            self.store
                .replace_current_season(self.league, &rows)
                .with_context(|| {
                    format!("persist current season ({season}) for {}", self.league)
                })?;
        } else {
            info!(league = %self.league, "persist disabled, stored data left untouched");
        }
        Ok(rows.len())
    }
}

/// Parses the date formats seen across feed vintages: dd/mm/yyyy,
/// dd/mm/yy and ISO.
pub(crate) fn parse_mixed_date(raw: &str) -> Result<NaiveDate, DataError> {
    let raw = raw.trim();
    for format in ["%d/%m/%Y", "%d/%m/%y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    Err(DataError::Corrupt(format!("unparseable match date '{raw}'")))
}

/// Stand-in date for rows that carry match identity but no date: the
/// first of July of the season's starting year, before any real
/// fixture.
fn season_opening(season: Season) -> NaiveDate {
    NaiveDate::from_ymd_opt(i32::from(season.start_year()), 7, 1)
        .expect("july 1st exists in every year")
}

fn parse_kickoff(raw: Option<&str>) -> Result<NaiveTime, DataError> {
    let raw = match raw {
        Some(value) if !value.trim().is_empty() => value.trim(),
        _ => DEFAULT_KICKOFF,
    };
    for format in ["%H:%M", "%H:%M:%S"] {
        if let Ok(time) = NaiveTime::parse_from_str(raw, format) {
            return Ok(time);
        }
    }
    Err(DataError::Corrupt(format!("unparseable kickoff time '{raw}'")))
}
