use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DataError;

/// Supported leagues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Epl,
    Bundesliga,
}

impl League {
    pub fn code(self) -> &'static str {
        match self {
            League::Epl => "epl",
            League::Bundesliga => "bundesliga",
        }
    }

    /// Division identifier used by the football-data.co.uk feed.
    pub fn division(self) -> &'static str {
        match self {
            League::Epl => "E0",
            League::Bundesliga => "D1",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DataError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "epl" => Ok(League::Epl),
            "bundesliga" => Ok(League::Bundesliga),
            _ => Err(DataError::UnknownLeague(raw.to_string())),
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// First season with usable feed data.
pub const FIRST_SEASON_START: u16 = 1993;

/// Start year of the season currently designated as live.
pub const CURRENT_SEASON_START: u16 = 2024;

/// A season identified by its starting year, e.g. 2024 for 2024-2025.
///
/// The storage label form is `S_2024_2025`; the numeric sort key strips
/// separators, e.g. 20242025.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Season {
    start: u16,
}

impl Season {
    pub const CURRENT: Season = Season {
        start: CURRENT_SEASON_START,
    };

    pub fn new(start: u16) -> Self {
        Season { start }
    }

    pub fn start_year(self) -> u16 {
        self.start
    }

    pub fn end_year(self) -> u16 {
        self.start + 1
    }

    pub fn label(self) -> String {
        format!("{}-{}", self.start, self.end_year())
    }

    pub fn storage_label(self) -> String {
        format!("S_{}_{}", self.start, self.end_year())
    }

    /// Numeric sort key, e.g. 20242025.
    pub fn as_int(self) -> u32 {
        u32::from(self.start) * 10_000 + u32::from(self.end_year())
    }

    /// Two-digit year pair used in feed URLs, e.g. "2425".
    pub fn feed_digits(self) -> String {
        format!("{:02}{:02}", self.start % 100, self.end_year() % 100)
    }

    /// Parses any of the label forms: "S_2024_2025", "2024-2025",
    /// "2024/2025", "20242025" or a bare start year "2024".
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        match digits.len() {
            8 => {
                let start: u16 = digits[..4]
                    .parse()
                    .map_err(|_| DataError::UnknownSeason(raw.to_string()))?;
                let end: u16 = digits[4..]
                    .parse()
                    .map_err(|_| DataError::UnknownSeason(raw.to_string()))?;
                if end != start + 1 {
                    return Err(DataError::UnknownSeason(raw.to_string()));
                }
                Ok(Season::new(start))
            }
            4 => {
                let start: u16 = digits
                    .parse()
                    .map_err(|_| DataError::UnknownSeason(raw.to_string()))?;
                Ok(Season::new(start))
            }
            _ => Err(DataError::UnknownSeason(raw.to_string())),
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Normalizes a season label to its integer sort key.
pub fn season_to_int(raw: &str) -> Result<u32, DataError> {
    Season::parse(raw).map(Season::as_int)
}

/// A registered team. Code is unique within a league; the numeric id is
/// unique globally and stable across processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub code: String,
    pub name: String,
    pub league: League,
    pub team_id: i64,
}

impl Team {
    pub fn new(code: &str, name: &str, league: League) -> Self {
        Team {
            code: code.to_string(),
            name: name.to_string(),
            league,
            team_id: team_id_for_code(code),
        }
    }
}

/// Derives a stable non-negative id from a team code.
pub fn team_id_for_code(code: &str) -> i64 {
    let digest = Sha256::digest(code.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) & (i64::MAX as u64)) as i64
}

/// Maps historical renamings and feed spelling variants to the one
/// canonical name teams are registered under.
pub fn canonical_team_name(name: &str) -> &str {
    match name.trim() {
        "Tottenham" => "Tottenham Hotspur",
        "Leeds" => "Leeds United",
        "Brighton and Hove Albion" => "Brighton",
        "Hull" => "Hull City",
        "QPR" => "Queens Park Rangers",
        "Man United" | "MUN" => "Manchester United",
        "Nott'm Forest" => "Nottingham Forest",
        "West Ham" => "West Ham United",
        "Wolverhampton Wanderers" | "Wolverhampton" => "Wolves",
        "West Bromwich Albion" => "West Brom",
        "STO" | "Stoke" => "Stoke City",
        "City" => "Norwich",
        "Newcastle United" => "Newcastle",
        "Leicester" => "Leicester City",
        "Man City" => "Manchester City",
        "Sheffield Weds" => "Sheffield Wednesday",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_parses_all_label_forms() {
        for raw in ["S_2024_2025", "2024-2025", "2024/2025", "20242025", "2024"] {
            assert_eq!(Season::parse(raw).unwrap(), Season::new(2024), "{raw}");
        }
        assert_eq!(Season::parse("S_1993_1994").unwrap().as_int(), 19931994);
        assert!(Season::parse("2024-2026").is_err());
        assert!(Season::parse("abc").is_err());
    }

    #[test]
    fn season_labels_round_trip() {
        let s = Season::new(2021);
        assert_eq!(s.label(), "2021-2022");
        assert_eq!(s.storage_label(), "S_2021_2022");
        assert_eq!(s.as_int(), 20212022);
        assert_eq!(s.feed_digits(), "2122");
        assert_eq!(Season::parse(&s.storage_label()).unwrap(), s);
    }

    #[test]
    fn team_ids_are_stable_and_distinct() {
        assert_eq!(team_id_for_code("ARS"), team_id_for_code("ARS"));
        assert_ne!(team_id_for_code("ARS"), team_id_for_code("CHE"));
        assert!(team_id_for_code("ARS") >= 0);
    }

    #[test]
    fn name_variants_canonicalize() {
        assert_eq!(canonical_team_name("Man United"), "Manchester United");
        assert_eq!(canonical_team_name("Nott'm Forest"), "Nottingham Forest");
        assert_eq!(canonical_team_name("Wolverhampton"), "Wolves");
        assert_eq!(canonical_team_name(" City"), "Norwich");
        assert_eq!(canonical_team_name("Arsenal"), "Arsenal");
    }
}
