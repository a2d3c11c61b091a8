use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use csv::StringRecord;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

use crate::data_access::RawMatch;
use crate::league::{League, Season};

const FEED_BASE_URL: &str = "https://www.football-data.co.uk/mmz4281";
const REQUEST_TIMEOUT_SECS: u64 = 10;

static CLIENT: OnceCell<Client> = OnceCell::new();

fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// Seasonal CSV endpoint, e.g. ".../mmz4281/2425/E0.csv".
pub fn season_csv_url(league: League, season: Season) -> String {
    format!(
        "{FEED_BASE_URL}/{}/{}.csv",
        season.feed_digits(),
        league.division()
    )
}

/// Fetches one season's results for a league. Network and parse
/// failures surface to the caller with league, season and URL attached;
/// nothing is retried here.
pub fn fetch_season(league: League, season: Season) -> Result<Vec<RawMatch>> {
    let url = season_csv_url(league, season);
    let client = http_client()?;
    let resp = client
        .get(&url)
        .send()
        .with_context(|| format!("fetch season feed {url} (league {league}, season {season})"))?;
    let status = resp.status();
    let body = resp
        .text()
        .with_context(|| format!("read season feed body {url}"))?;
    if !status.is_success() {
        bail!("http {status} fetching {url} (league {league}, season {season})");
    }
    parse_feed_csv(&body)
        .with_context(|| format!("parse season feed {url} (league {league}, season {season})"))
}

/// Parses the feed CSV. Older vintages are ragged and carry dozens of
/// odds columns, so rows are indexed by header rather than deserialized.
pub fn parse_feed_csv(raw: &str) -> Result<Vec<RawMatch>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());
    let headers = reader.headers().context("season feed missing header row")?;
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);

    let home = col("HomeTeam").ok_or_else(|| anyhow!("feed missing HomeTeam column"))?;
    let away = col("AwayTeam").ok_or_else(|| anyhow!("feed missing AwayTeam column"))?;
    let fthg = col("FTHG").ok_or_else(|| anyhow!("feed missing FTHG column"))?;
    let ftag = col("FTAG").ok_or_else(|| anyhow!("feed missing FTAG column"))?;
    let date = col("Date").ok_or_else(|| anyhow!("feed missing Date column"))?;
    let ftr = col("FTR");
    let time = col("Time");
    let attendance = col("Attendance");

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.context("read season feed record")?;
        let row = RawMatch {
            home: field(&record, Some(home)),
            away: field(&record, Some(away)),
            home_goal: field(&record, Some(fthg)).and_then(|v| v.parse().ok()),
            away_goal: field(&record, Some(ftag)).and_then(|v| v.parse().ok()),
            result: field(&record, ftr),
            date: field(&record, Some(date)),
            time: field(&record, time),
            attendance: field(&record, attendance).and_then(|v| v.parse().ok()),
            season: None,
        };
        // Trailing blank lines show up as fully empty records.
        if row.home.is_none() && row.away.is_none() && row.date.is_none() {
            continue;
        }
        out.push(row);
    }
    Ok(out)
}

fn field(record: &StringRecord, index: Option<usize>) -> Option<String> {
    let value = record.get(index?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
