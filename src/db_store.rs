use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::info;

use crate::data_access::{DataAccess, FeatureRecord, RawFrame, RawMatch};
use crate::dataset::parse_mixed_date;
use crate::error::DataError;
use crate::league::{League, Season, Team, canonical_team_name};
use crate::repository::SqliteRepository;

/// Relational backend over the SQLite repository adapter.
pub struct DbStore {
    repo: Mutex<SqliteRepository>,
}

impl DbStore {
    pub fn new(repo: SqliteRepository) -> Self {
        DbStore {
            repo: Mutex::new(repo),
        }
    }

    fn repo(&self) -> MutexGuard<'_, SqliteRepository> {
        self.repo.lock().expect("sqlite repository lock poisoned")
    }
}

impl DataAccess for DbStore {
    fn resolve_code(&self, league: League, team_name: &str) -> Result<String, DataError> {
        let name = canonical_team_name(team_name);
        let team = self.repo().find_team_by_name(league, name)?;
        match team {
            Some(team) => Ok(team.code),
            None => Err(DataError::TeamNotFound {
                league,
                name: name.to_string(),
            }),
        }
    }

    fn resolve_id(&self, code: &str) -> Result<i64, DataError> {
        let team = self.repo().get_team(code)?;
        match team {
            Some(team) => Ok(team.team_id),
            None => Err(DataError::TeamIdNotFound(code.to_string())),
        }
    }

    fn register_teams(&self, teams: &[Team]) -> Result<(), DataError> {
        let mut repo = self.repo();
        let mut seen = std::collections::HashSet::new();
        for team in teams {
            if !seen.insert(team.code.as_str()) {
                return Err(DataError::DuplicateTeam(team.code.clone()));
            }
            if repo.get_team(&team.code)?.is_some() {
                return Err(DataError::DuplicateTeam(team.code.clone()));
            }
        }
        let tx = repo.transaction()?;
        for team in teams {
            tx.execute(
                "INSERT INTO team (code, name, league, team_id) VALUES (?1, ?2, ?3, ?4)",
                params![team.code, team.name, team.league.code(), team.team_id],
            )?;
        }
        tx.commit()?;
        info!(teams = teams.len(), "registered teams");
        Ok(())
    }

    fn upsert_features(&self, records: &[FeatureRecord]) -> Result<(), DataError> {
        let mut repo = self.repo();
        let tx = repo.transaction()?;
        for record in records {
            // Conflict update deliberately leaves the identity columns
            // untouched: only the numeric fields and last_update move.
            tx.execute(
                r#"
                INSERT INTO pyth_wpc (
                    id, team_id, season, league,
                    win_percentage, pythagorean_expectation, last_update
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    win_percentage = excluded.win_percentage,
                    pythagorean_expectation = excluded.pythagorean_expectation,
                    last_update = excluded.last_update
                "#,
                params![
                    record.id,
                    record.team_id,
                    record.season,
                    record.league.code(),
                    record.win_percentage,
                    record.pythagorean_expectation,
                    record.last_update.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_features(
        &self,
        league: League,
        season: Season,
    ) -> Result<Vec<FeatureRecord>, DataError> {
        let repo = self.repo();
        let mut stmt = repo.connection().prepare(
            "SELECT id, team_id, season, win_percentage, pythagorean_expectation, last_update
             FROM pyth_wpc
             WHERE league = ?1 AND season = ?2
             ORDER BY team_id",
        )?;
        let rows = stmt.query_map(params![league.code(), season.as_int()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, team_id, season, wpc, pyth, last_update) = row?;
            let last_update = parse_timestamp(&last_update)?;
            out.push(FeatureRecord {
                id,
                team_id,
                season,
                league,
                win_percentage: wpc,
                pythagorean_expectation: pyth,
                last_update,
            });
        }
        if out.is_empty() {
            return Err(DataError::FeaturesNotComputed {
                league,
                season: season.as_int(),
            });
        }
        Ok(out)
    }

    fn load_matches(&self, league: League) -> Result<RawFrame, DataError> {
        let repo = self.repo();
        let mut stmt = repo.connection().prepare(
            "SELECT home_team, away_team, home_goal, away_goal,
                    result, date, time, attendance, season
             FROM game
             WHERE league = ?1
             ORDER BY date ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![league.code()], |row| {
            Ok(RawMatch {
                home: row.get(0)?,
                away: row.get(1)?,
                home_goal: row.get(2)?,
                away_goal: row.get(3)?,
                result: row.get(4)?,
                date: row.get(5)?,
                time: row.get(6)?,
                attendance: row.get(7)?,
                season: row.get(8)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(RawFrame {
            rows: out,
            teams_are_codes: true,
        })
    }

    fn replace_current_season(&self, league: League, rows: &[RawMatch]) -> Result<(), DataError> {
        // Set-difference insert: rows already stored under the
        // (season, league, home, away, date) key are skipped, the rest
        // are appended in one transaction.
        let mut staged = Vec::with_capacity(rows.len());
        for raw in rows {
            staged.push(self.stage_game(league, raw)?);
        }

        let mut repo = self.repo();
        let tx = repo.transaction()?;
        let mut inserted = 0usize;
        for game in &staged {
            let exists: Option<i64> = {
                use rusqlite::OptionalExtension;
                tx.query_row(
                    "SELECT id FROM game
                     WHERE season = ?1 AND league = ?2
                       AND home_team = ?3 AND away_team = ?4 AND date = ?5",
                    params![game.season, league.code(), game.home, game.away, game.date],
                    |row| row.get(0),
                )
                .optional()?
            };
            if exists.is_some() {
                continue;
            }
            tx.execute(
                "INSERT INTO game (
                     home_team, away_team, home_goal, away_goal,
                     season, league, date, time, attendance, result
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    game.home,
                    game.away,
                    game.home_goal,
                    game.away_goal,
                    game.season,
                    league.code(),
                    game.date,
                    game.time,
                    game.attendance,
                    game.result,
                ],
            )?;
            inserted += 1;
        }
        tx.commit()?;
        info!(%league, inserted, skipped = staged.len() - inserted, "current season upserted");
        Ok(())
    }
}

struct StagedGame {
    home: String,
    away: String,
    home_goal: i64,
    away_goal: i64,
    season: String,
    date: String,
    time: Option<String>,
    attendance: f64,
    result: String,
}

impl DbStore {
    fn stage_game(&self, league: League, raw: &RawMatch) -> Result<StagedGame, DataError> {
        let home_name = raw.home.as_deref().ok_or_else(|| {
            DataError::Corrupt("season update row missing home team".to_string())
        })?;
        let away_name = raw.away.as_deref().ok_or_else(|| {
            DataError::Corrupt("season update row missing away team".to_string())
        })?;
        let date_raw = raw
            .date
            .as_deref()
            .ok_or_else(|| DataError::Corrupt("season update row missing date".to_string()))?;
        // Dates are normalized before persisting so set-difference keys
        // line up across runs.
        let date = parse_mixed_date(date_raw)?.format("%Y-%m-%d").to_string();

        let home = self.resolve_code(league, home_name)?;
        let away = self.resolve_code(league, away_name)?;
        let home_goal = raw.home_goal.unwrap_or(0);
        let away_goal = raw.away_goal.unwrap_or(0);
        let result = match raw.result.as_deref() {
            Some(r @ ("H" | "D" | "A")) => r.to_string(),
            _ => match home_goal.cmp(&away_goal) {
                std::cmp::Ordering::Greater => "H".to_string(),
                std::cmp::Ordering::Equal => "D".to_string(),
                std::cmp::Ordering::Less => "A".to_string(),
            },
        };
        let season = raw
            .season
            .clone()
            .unwrap_or_else(|| Season::CURRENT.storage_label());

        Ok(StagedGame {
            home,
            away,
            home_goal,
            away_goal,
            season,
            date,
            time: raw.time.clone(),
            attendance: raw.attendance.unwrap_or(0.0),
            result,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DataError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| DataError::Corrupt(format!("bad last_update timestamp '{raw}': {err}")))
}
