use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::data_access::DataAccess;
use crate::db_store::DbStore;
use crate::error::DataError;
use crate::file_store::FileStore;
use crate::repository::SqliteRepository;

/// Which persistence backend serves a process. Both expose the same
/// `DataAccess` surface; the choice is configuration, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    File,
    Database,
}

impl BackendKind {
    pub fn parse(s: &str) -> Result<Self, DataError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" | "file" => Ok(BackendKind::File),
            "database" | "db" | "sqlite" => Ok(BackendKind::Database),
            other => Err(DataError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Result<Self, DataError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(DataError::Config(format!("unknown environment '{other}'"))),
        }
    }

    /// Directory name segregating persisted artifacts per environment.
    pub fn dir_name(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone)]
pub struct DataConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub environment: Environment,
}

impl DataConfig {
    /// Reads configuration from the environment, loading `.env` first
    /// if present. Every variable has a default so a fresh checkout
    /// works without any setup.
    pub fn from_env() -> Result<Self, DataError> {
        dotenvy::dotenv().ok();
        let backend = match env::var("MATCHCAST_BACKEND") {
            Ok(v) => BackendKind::parse(&v)?,
            Err(_) => BackendKind::Database,
        };
        let environment = match env::var("MATCHCAST_ENV") {
            Ok(v) => Environment::parse(&v)?,
            Err(_) => Environment::Development,
        };
        let data_dir =
            PathBuf::from(env::var("MATCHCAST_DATA_DIR").unwrap_or_else(|_| "data/processed".into()));
        let db_path =
            PathBuf::from(env::var("MATCHCAST_DB").unwrap_or_else(|_| "data/matchcast.sqlite".into()));
        Ok(DataConfig {
            backend,
            data_dir,
            db_path,
            environment,
        })
    }

    pub fn build_data_access(&self) -> Result<Arc<dyn DataAccess>, DataError> {
        match self.backend {
            BackendKind::File => Ok(Arc::new(FileStore::new(self.data_dir.clone()))),
            BackendKind::Database => {
                let repo = SqliteRepository::open(&self.db_path)?;
                Ok(Arc::new(DbStore::new(repo)))
            }
        }
    }
}
