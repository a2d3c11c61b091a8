use thiserror::Error;

use crate::league::League;

/// Errors surfaced by the data-access layer and the modules built on it.
///
/// Team resolution failures map to "unknown team" input errors for the
/// caller; configuration errors fail fast and are never downgraded.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("team not found for '{name}' in league {league}")]
    TeamNotFound { league: League, name: String },

    #[error("team id not found for code '{0}'")]
    TeamIdNotFound(String),

    #[error("duplicate team code '{0}'")]
    DuplicateTeam(String),

    #[error("unknown league '{0}'")]
    UnknownLeague(String),

    #[error("unrecognized season label '{0}'")]
    UnknownSeason(String),

    #[error("features not computed for league {league} season {season}")]
    FeaturesNotComputed { league: League, season: u32 },

    #[error("no derived features for team {team_id} in season {season}")]
    TeamFeaturesMissing { team_id: i64, season: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt stored record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
