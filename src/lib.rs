//! Feature derivation and caching for soccer match outcome prediction.
//!
//! Historical match results are loaded through a backend-agnostic
//! [`data_access::DataAccess`] trait (CSV files or SQLite), cleaned into
//! typed rows, and reduced to per-team season features: win percentage
//! and Pythagorean expectation. A [`feature_cache::FeatureCache`] keeps
//! the derived tables warm with a one-day expiry, serving stale data
//! while a background worker recomputes.

pub mod classifier;
pub mod config;
pub mod data_access;
pub mod dataset;
pub mod db_store;
pub mod error;
pub mod feature_cache;
pub mod features;
pub mod file_store;
pub mod league;
pub mod logging;
pub mod repository;
pub mod season_feed;
