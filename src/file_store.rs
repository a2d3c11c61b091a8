use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::data_access::{DataAccess, FeatureRecord, RawFrame, RawMatch};
use crate::error::DataError;
use crate::league::{League, Season, Team, canonical_team_name};

const TEAM_FILE: &str = "team.csv";

/// Flat-file backend: one CSV per league for match history, one for the
/// derived feature table, and a shared team registry.
///
/// Writes go through a temp file followed by a rename, so readers in
/// this process observe either the old or the new file, never a partial
/// one.
pub struct FileStore {
    data_dir: PathBuf,
    teams: Mutex<Option<Vec<Team>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TeamRow {
    code: String,
    name: String,
    league: String,
    team_id: i64,
}

/// Raw feed columns, kept as fetched plus the season tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MatchCsvRow {
    #[serde(rename = "Date")]
    date: Option<String>,
    #[serde(rename = "Time")]
    time: Option<String>,
    #[serde(rename = "HomeTeam")]
    home_team: Option<String>,
    #[serde(rename = "AwayTeam")]
    away_team: Option<String>,
    #[serde(rename = "FTHG")]
    home_goal: Option<i64>,
    #[serde(rename = "FTAG")]
    away_goal: Option<i64>,
    #[serde(rename = "FTR")]
    result: Option<String>,
    #[serde(rename = "Attendance")]
    attendance: Option<f64>,
    season: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeatureCsvRow {
    id: String,
    #[serde(rename = "team")]
    team_id: i64,
    season: u32,
    league: String,
    win_percentage: f64,
    pythagorean_expectation: f64,
    last_update: String,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        FileStore {
            data_dir: data_dir.into(),
            teams: Mutex::new(None),
        }
    }

    fn team_path(&self) -> PathBuf {
        self.data_dir.join(TEAM_FILE)
    }

    fn matches_path(&self, league: League) -> PathBuf {
        self.data_dir.join(format!("{}.csv", league.code()))
    }

    fn features_path(&self, league: League) -> PathBuf {
        self.data_dir.join(format!("{}_wpc_pyth.csv", league.code()))
    }

    fn teams(&self) -> Result<Vec<Team>, DataError> {
        let mut memo = self.teams.lock().expect("team memo lock poisoned");
        if let Some(teams) = memo.as_ref() {
            return Ok(teams.clone());
        }
        let path = self.team_path();
        let rows: Vec<TeamRow> = if path.exists() {
            read_rows(&path)?
        } else {
            Vec::new()
        };
        let mut teams = Vec::with_capacity(rows.len());
        for row in rows {
            teams.push(Team {
                code: row.code,
                name: row.name,
                league: League::parse(&row.league)?,
                team_id: row.team_id,
            });
        }
        *memo = Some(teams.clone());
        Ok(teams)
    }
}

impl DataAccess for FileStore {
    fn resolve_code(&self, league: League, team_name: &str) -> Result<String, DataError> {
        let name = canonical_team_name(team_name);
        self.teams()?
            .iter()
            .find(|t| t.league == league && t.name == name)
            .map(|t| t.code.clone())
            .ok_or_else(|| DataError::TeamNotFound {
                league,
                name: name.to_string(),
            })
    }

    fn resolve_id(&self, code: &str) -> Result<i64, DataError> {
        self.teams()?
            .iter()
            .find(|t| t.code == code)
            .map(|t| t.team_id)
            .ok_or_else(|| DataError::TeamIdNotFound(code.to_string()))
    }

    fn register_teams(&self, teams: &[Team]) -> Result<(), DataError> {
        let existing = self.teams()?;
        let mut seen: std::collections::HashSet<&str> =
            existing.iter().map(|t| t.code.as_str()).collect();
        for team in teams {
            if !seen.insert(team.code.as_str()) {
                return Err(DataError::DuplicateTeam(team.code.clone()));
            }
        }

        let mut all = existing;
        all.extend(teams.iter().cloned());
        let rows: Vec<TeamRow> = all
            .iter()
            .map(|t| TeamRow {
                code: t.code.clone(),
                name: t.name.clone(),
                league: t.league.code().to_string(),
                team_id: t.team_id,
            })
            .collect();
        write_rows_atomic(&self.team_path(), &rows)?;

        let mut memo = self.teams.lock().expect("team memo lock poisoned");
        *memo = Some(all);
        info!(teams = teams.len(), "registered teams");
        Ok(())
    }

    fn upsert_features(&self, records: &[FeatureRecord]) -> Result<(), DataError> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.features_path(records[0].league);
        let existing: Vec<FeatureCsvRow> = if path.exists() {
            read_rows(&path)?
        } else {
            Vec::new()
        };

        let mut order: Vec<String> = existing.iter().map(|r| r.id.clone()).collect();
        let mut by_id: HashMap<String, FeatureCsvRow> =
            existing.into_iter().map(|r| (r.id.clone(), r)).collect();
        for record in records {
            match by_id.get_mut(&record.id) {
                Some(row) => {
                    // In-place update of the numeric fields and the
                    // timestamp; identity columns are left as stored.
                    row.win_percentage = record.win_percentage;
                    row.pythagorean_expectation = record.pythagorean_expectation;
                    row.last_update = record.last_update.to_rfc3339();
                }
                None => {
                    order.push(record.id.clone());
                    by_id.insert(record.id.clone(), feature_row(record));
                }
            }
        }

        let rows: Vec<FeatureCsvRow> = order
            .iter()
            .filter_map(|id| by_id.get(id).cloned())
            .collect();
        write_rows_atomic(&path, &rows)
    }

    fn load_features(
        &self,
        league: League,
        season: Season,
    ) -> Result<Vec<FeatureRecord>, DataError> {
        let path = self.features_path(league);
        let not_computed = || DataError::FeaturesNotComputed {
            league,
            season: season.as_int(),
        };
        if !path.exists() {
            return Err(not_computed());
        }
        let rows: Vec<FeatureCsvRow> = read_rows(&path)?;
        let mut out = Vec::new();
        for row in rows {
            if row.season != season.as_int() {
                continue;
            }
            out.push(FeatureRecord {
                id: row.id,
                team_id: row.team_id,
                season: row.season,
                league,
                win_percentage: row.win_percentage,
                pythagorean_expectation: row.pythagorean_expectation,
                last_update: parse_timestamp(&row.last_update)?,
            });
        }
        if out.is_empty() {
            return Err(not_computed());
        }
        Ok(out)
    }

    fn load_matches(&self, league: League) -> Result<RawFrame, DataError> {
        let rows: Vec<MatchCsvRow> = read_rows(&self.matches_path(league))?;
        Ok(RawFrame {
            rows: rows.into_iter().map(raw_from_csv).collect(),
            teams_are_codes: false,
        })
    }

    fn replace_current_season(&self, league: League, rows: &[RawMatch]) -> Result<(), DataError> {
        let path = self.matches_path(league);
        let current = Season::CURRENT.storage_label();
        let mut kept: Vec<MatchCsvRow> = if path.exists() {
            read_rows::<MatchCsvRow>(&path)?
                .into_iter()
                .filter(|row| row.season.as_deref() != Some(current.as_str()))
                .collect()
        } else {
            Vec::new()
        };
        kept.extend(rows.iter().map(csv_from_raw));
        write_rows_atomic(&path, &kept)?;
        info!(%league, rows = rows.len(), "current season slice replaced");
        Ok(())
    }
}

fn feature_row(record: &FeatureRecord) -> FeatureCsvRow {
    FeatureCsvRow {
        id: record.id.clone(),
        team_id: record.team_id,
        season: record.season,
        league: record.league.code().to_string(),
        win_percentage: record.win_percentage,
        pythagorean_expectation: record.pythagorean_expectation,
        last_update: record.last_update.to_rfc3339(),
    }
}

fn raw_from_csv(row: MatchCsvRow) -> RawMatch {
    RawMatch {
        home: row.home_team,
        away: row.away_team,
        home_goal: row.home_goal,
        away_goal: row.away_goal,
        result: row.result,
        date: row.date,
        time: row.time,
        attendance: row.attendance,
        season: row.season,
    }
}

fn csv_from_raw(raw: &RawMatch) -> MatchCsvRow {
    MatchCsvRow {
        date: raw.date.clone(),
        time: raw.time.clone(),
        home_team: raw.home.clone(),
        away_team: raw.away.clone(),
        home_goal: raw.home_goal,
        away_goal: raw.away_goal,
        result: raw.result.clone(),
        attendance: raw.attendance,
        season: raw.season.clone(),
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DataError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for row in reader.deserialize() {
        out.push(row?);
    }
    Ok(out)
}

fn write_rows_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let data = writer
        .into_inner()
        .map_err(|err| DataError::Io(std::io::Error::other(err)))?;

    let tmp = path.with_extension("csv.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DataError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| DataError::Corrupt(format!("bad last_update timestamp '{raw}': {err}")))
}
