use std::sync::Arc;

use chrono::Utc;
use matchcast::data_access::{DataAccess, FeatureRecord, RawMatch};
use matchcast::dataset::{LeagueData, MatchRow};
use matchcast::db_store::DbStore;
use matchcast::error::DataError;
use matchcast::features::single_match_frame;
use matchcast::file_store::FileStore;
use matchcast::league::{League, Season, Team};
use matchcast::repository::SqliteRepository;

fn epl_teams() -> Vec<Team> {
    vec![
        Team::new("MUN", "Manchester United", League::Epl),
        Team::new("ARS", "Arsenal", League::Epl),
        Team::new("TOT", "Tottenham Hotspur", League::Epl),
    ]
}

fn seeded_file_store(dir: &std::path::Path) -> Arc<FileStore> {
    let store = Arc::new(FileStore::new(dir));
    store.register_teams(&epl_teams()).unwrap();
    store
}

fn seeded_db_store() -> Arc<DbStore> {
    let store = Arc::new(DbStore::new(SqliteRepository::open_in_memory().unwrap()));
    store.register_teams(&epl_teams()).unwrap();
    store
}

fn raw(home: &str, away: &str, hg: i64, ag: i64, date: &str) -> RawMatch {
    RawMatch {
        home: Some(home.to_string()),
        away: Some(away.to_string()),
        home_goal: Some(hg),
        away_goal: Some(ag),
        result: None,
        date: Some(date.to_string()),
        time: Some("15:00".to_string()),
        attendance: Some(60_000.0),
        season: Some(Season::CURRENT.storage_label()),
    }
}

fn season_rows() -> Vec<RawMatch> {
    vec![
        raw("Man United", "Arsenal", 2, 1, "17/08/2024"),
        raw("Arsenal", "Tottenham", 0, 0, "24/08/2024"),
        raw("Tottenham Hotspur", "Man United", 1, 3, "31/08/2024"),
    ]
}

fn sorted_frame(store: Arc<dyn DataAccess>) -> Vec<MatchRow> {
    let mut rows = LeagueData::new(League::Epl, store).load().unwrap();
    rows.sort_by_key(|r| (r.date, r.home_team));
    rows
}

#[test]
fn backends_agree_on_cleaned_frames() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = seeded_file_store(dir.path());
    let db_store = seeded_db_store();

    let rows = season_rows();
    file_store
        .replace_current_season(League::Epl, &rows)
        .unwrap();
    db_store
        .replace_current_season(League::Epl, &rows)
        .unwrap();

    let from_files = sorted_frame(file_store);
    let from_db = sorted_frame(db_store);
    assert_eq!(from_files.len(), 3);
    assert_eq!(from_files, from_db);

    let first = &from_files[0];
    assert_eq!(first.result, 1);
    assert_eq!(first.season, Season::CURRENT.as_int());
    assert_eq!(first.attendance, 60_000.0);
}

#[test]
fn relational_insert_is_a_set_difference() {
    let store = seeded_db_store();
    store
        .replace_current_season(League::Epl, &season_rows())
        .unwrap();
    // Feeding the same slice again must not duplicate any game.
    store
        .replace_current_season(League::Epl, &season_rows())
        .unwrap();
    assert_eq!(store.load_matches(League::Epl).unwrap().rows.len(), 3);

    let mut extended = season_rows();
    extended.push(raw("Arsenal", "Man United", 1, 1, "14/09/2024"));
    store.replace_current_season(League::Epl, &extended).unwrap();
    assert_eq!(store.load_matches(League::Epl).unwrap().rows.len(), 4);
}

#[test]
fn file_replace_preserves_historical_seasons() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_file_store(dir.path());

    let mut historical = raw("Arsenal", "Tottenham", 2, 2, "15/08/2020");
    historical.season = Some(Season::new(2020).storage_label());
    store
        .replace_current_season(League::Epl, &[historical.clone()])
        .unwrap();
    store
        .replace_current_season(League::Epl, &season_rows())
        .unwrap();

    // Replacing the slice again drops the stale current rows but keeps
    // the historical one.
    let replacement = vec![raw("Man United", "Tottenham", 1, 0, "21/09/2024")];
    store
        .replace_current_season(League::Epl, &replacement)
        .unwrap();

    let frame = store.load_matches(League::Epl).unwrap();
    assert_eq!(frame.rows.len(), 2);
    assert!(frame.rows.iter().any(|r| r.season == historical.season));
}

#[test]
fn rows_missing_only_the_date_survive_cleaning() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_file_store(dir.path());

    let mut dateless = raw("Man United", "Arsenal", 2, 1, "unused");
    dateless.date = None;
    let mut goalless = raw("Arsenal", "Tottenham", 0, 0, "24/08/2024");
    goalless.home_goal = None;
    goalless.away_goal = None;
    goalless.result = None;
    store
        .replace_current_season(League::Epl, &[dateless, goalless])
        .unwrap();

    // One gappy row must not fail the whole league load.
    let rows = LeagueData::new(League::Epl, store).load().unwrap();
    assert_eq!(rows.len(), 2);

    // The date-less row falls back to the season opening and keeps its
    // real result.
    let undated = rows
        .iter()
        .find(|r| r.result == 1)
        .expect("date-less row kept");
    assert_eq!(
        undated.date,
        chrono::NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    );

    // Missing goals default to zero and derive a draw.
    let drawn = rows.iter().find(|r| r.result == 0).unwrap();
    assert_eq!((drawn.home_goal, drawn.away_goal), (0, 0));
}

fn feature(team_id: i64, wpc: f64, pyth: f64) -> FeatureRecord {
    FeatureRecord::new(
        team_id,
        Season::CURRENT.as_int(),
        League::Epl,
        wpc,
        pyth,
        Utc::now(),
    )
}

fn assert_upsert_updates_in_place(store: &dyn DataAccess, team_id: i64) {
    store.upsert_features(&[feature(team_id, 0.4, 0.5)]).unwrap();
    store.upsert_features(&[feature(team_id, 0.7, 0.8)]).unwrap();

    let loaded = store.load_features(League::Epl, Season::CURRENT).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].win_percentage, 0.7);
    assert_eq!(loaded[0].pythagorean_expectation, 0.8);
    assert_eq!(loaded[0].id, FeatureRecord::record_id(team_id, loaded[0].season));
}

#[test]
fn upsert_overwrites_existing_ids_on_both_backends() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = seeded_file_store(dir.path());
    assert_upsert_updates_in_place(file_store.as_ref(), 11);

    let db_store = seeded_db_store();
    assert_upsert_updates_in_place(db_store.as_ref(), 11);
}

#[test]
fn missing_feature_table_is_a_typed_error() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = seeded_file_store(dir.path());
    assert!(matches!(
        file_store.load_features(League::Epl, Season::CURRENT),
        Err(DataError::FeaturesNotComputed { .. })
    ));

    let db_store = seeded_db_store();
    assert!(matches!(
        db_store.load_features(League::Epl, Season::CURRENT),
        Err(DataError::FeaturesNotComputed { .. })
    ));

    // A populated table still errors for a season it has no rows for.
    db_store.upsert_features(&[feature(7, 0.5, 0.5)]).unwrap();
    assert!(matches!(
        db_store.load_features(League::Epl, Season::new(2019)),
        Err(DataError::FeaturesNotComputed { .. })
    ));
}

#[test]
fn duplicate_registration_rejects_the_batch() {
    let db_store = seeded_db_store();
    let err = db_store
        .register_teams(&[Team::new("MUN", "Manchester United", League::Epl)])
        .unwrap_err();
    assert!(matches!(err, DataError::DuplicateTeam(code) if code == "MUN"));

    let dir = tempfile::tempdir().unwrap();
    let file_store = seeded_file_store(dir.path());
    let within_batch = [
        Team::new("NEW", "Newcastle", League::Epl),
        Team::new("NEW", "Newcastle", League::Epl),
    ];
    assert!(matches!(
        file_store.register_teams(&within_batch),
        Err(DataError::DuplicateTeam(_))
    ));
}

#[test]
fn name_variants_resolve_to_the_registered_team() {
    let db_store = seeded_db_store();
    assert_eq!(db_store.resolve_code(League::Epl, "Man United").unwrap(), "MUN");
    assert_eq!(db_store.resolve_code(League::Epl, "Tottenham").unwrap(), "TOT");

    let dir = tempfile::tempdir().unwrap();
    let file_store = seeded_file_store(dir.path());
    assert_eq!(
        file_store.resolve_code(League::Epl, "Man United").unwrap(),
        "MUN"
    );
    assert!(matches!(
        file_store.resolve_code(League::Epl, "Real Madrid"),
        Err(DataError::TeamNotFound { .. })
    ));
}

#[test]
fn single_match_frame_defaults_date_and_kickoff() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_file_store(dir.path());
    let mun = store.resolve_id("MUN").unwrap();
    let ars = store.resolve_id("ARS").unwrap();
    let features = [feature(mun, 0.8, 0.75), feature(ars, 0.6, 0.55)];

    let row = single_match_frame(store.as_ref(), "MUN", "ARS", 70_000.0, None, None, &features)
        .unwrap();
    assert_eq!(row.home_team, mun);
    assert_eq!(row.away_team, ars);
    assert_eq!(row.season, Season::CURRENT.as_int());
    assert_eq!(row.home_win_percentage, 0.8);
    assert_eq!(row.away_pyth_expectation, 0.55);
    // 13:30 sentinel kickoff.
    assert_eq!(row.time, 13 * 3600 + 30 * 60);

    assert!(matches!(
        single_match_frame(store.as_ref(), "MUN", "TOT", 0.0, None, None, &features),
        Err(DataError::TeamFeaturesMissing { .. })
    ));
}
