use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::error::DataError;
use crate::league::{League, Team};

/// Thin adapter over the SQLite session: owns the connection and exposes
/// the row-level get/add/commit surface the relational store builds on.
///
/// Not thread-safe; callers share a repository across threads only behind
/// external synchronization.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self, DataError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let repo = SqliteRepository { conn };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        let repo = SqliteRepository {
            conn: Connection::open_in_memory()?,
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> Result<(), DataError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS team (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                league TEXT NOT NULL,
                team_id INTEGER NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS game (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                home_team TEXT NOT NULL REFERENCES team(code),
                away_team TEXT NOT NULL REFERENCES team(code),
                home_goal INTEGER NOT NULL,
                away_goal INTEGER NOT NULL,
                season TEXT NULL,
                league TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NULL,
                attendance REAL NULL,
                result TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_game_league ON game(league);
            CREATE INDEX IF NOT EXISTS idx_game_season ON game(season);

            CREATE TABLE IF NOT EXISTS pyth_wpc (
                id TEXT PRIMARY KEY,
                team_id INTEGER NOT NULL,
                season INTEGER NOT NULL,
                league TEXT NOT NULL,
                win_percentage REAL NOT NULL,
                pythagorean_expectation REAL NOT NULL,
                last_update TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pyth_wpc_league_season
                ON pyth_wpc(league, season);
            "#,
        )?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>, DataError> {
        Ok(self.conn.transaction()?)
    }

    pub fn get_team(&self, code: &str) -> Result<Option<Team>, DataError> {
        let row = self
            .conn
            .query_row(
                "SELECT code, name, league, team_id FROM team WHERE code = ?1",
                params![code],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(team_from_row).transpose()
    }

    pub fn find_team_by_name(
        &self,
        league: League,
        name: &str,
    ) -> Result<Option<Team>, DataError> {
        let row = self
            .conn
            .query_row(
                "SELECT code, name, league, team_id FROM team
                 WHERE name = ?1 AND league = ?2",
                params![name, league.code()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(team_from_row).transpose()
    }
}

fn team_from_row(
    (code, name, league, team_id): (String, String, String, i64),
) -> Result<Team, DataError> {
    Ok(Team {
        code,
        name,
        league: League::parse(&league)?,
        team_id,
    })
}
