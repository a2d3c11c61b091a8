//! Outcome models sit behind a small trait so the serving path can
//! swap implementations without touching feature derivation. Models
//! are persisted as JSON keyed by league, kind, and environment.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Environment;
use crate::features::TrainingRow;
use crate::league::League;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    OutcomePrior,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::OutcomePrior => "outcome_prior",
        }
    }
}

/// Identifies one persisted model artifact on disk.
#[derive(Debug, Clone, Copy)]
pub struct ModelKey {
    pub league: League,
    pub kind: ModelKind,
    pub environment: Environment,
}

impl ModelKey {
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.league.code(), self.kind.name())
    }

    pub fn path(&self, base: &Path) -> PathBuf {
        base.join(self.environment.dir_name()).join(self.file_name())
    }
}

/// Probabilities over the three match outcomes, in label order
/// (-1 away win, 0 draw, +1 home win). Sums to 1 after fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDistribution {
    pub away_win: f64,
    pub draw: f64,
    pub home_win: f64,
}

pub trait Classifier {
    fn fit(&mut self, frame: &[TrainingRow], labels: &[i8]) -> Result<()>;

    /// Hard label per row: -1, 0, or +1.
    fn predict(&self, frame: &[TrainingRow]) -> Result<Vec<i8>>;

    fn predict_probability(&self, frame: &[TrainingRow]) -> Result<Vec<OutcomeDistribution>>;
}

/// Baseline model: the empirical outcome frequencies of the training
/// set, applied uniformly. Useful as a calibration floor for anything
/// that claims to beat it.
#[derive(Debug, Serialize, Deserialize)]
pub struct OutcomePriorClassifier {
    league: League,
    priors: Option<OutcomeDistribution>,
}

impl OutcomePriorClassifier {
    pub fn new(league: League) -> Self {
        OutcomePriorClassifier {
            league,
            priors: None,
        }
    }

    pub fn league(&self) -> League {
        self.league
    }

    pub fn save(&self, key: &ModelKey, base: &Path) -> Result<()> {
        let path = key.path(base);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating model directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming into {}", path.display()))?;
        info!(league = %self.league, path = %path.display(), "saved model");
        Ok(())
    }

    pub fn load(key: &ModelKey, base: &Path) -> Result<Self> {
        let path = key.path(base);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("reading model {}", path.display()))?;
        let model: OutcomePriorClassifier = serde_json::from_str(&json)
            .with_context(|| format!("parsing model {}", path.display()))?;
        Ok(model)
    }

    fn fitted(&self) -> Result<OutcomeDistribution> {
        match self.priors {
            Some(p) => Ok(p),
            None => bail!("classifier for {} has not been fitted", self.league),
        }
    }
}

impl Classifier for OutcomePriorClassifier {
    fn fit(&mut self, frame: &[TrainingRow], labels: &[i8]) -> Result<()> {
        if labels.is_empty() {
            bail!("cannot fit on an empty training set");
        }
        if frame.len() != labels.len() {
            bail!(
                "frame has {} rows but {} labels were given",
                frame.len(),
                labels.len()
            );
        }
        let total = labels.len() as f64;
        let away = labels.iter().filter(|&&l| l < 0).count() as f64;
        let draw = labels.iter().filter(|&&l| l == 0).count() as f64;
        let home = labels.iter().filter(|&&l| l > 0).count() as f64;
        self.priors = Some(OutcomeDistribution {
            away_win: away / total,
            draw: draw / total,
            home_win: home / total,
        });
        Ok(())
    }

    fn predict(&self, frame: &[TrainingRow]) -> Result<Vec<i8>> {
        let p = self.fitted()?;
        let label = if p.home_win >= p.draw && p.home_win >= p.away_win {
            1
        } else if p.draw >= p.away_win {
            0
        } else {
            -1
        };
        Ok(vec![label; frame.len()])
    }

    fn predict_probability(&self, frame: &[TrainingRow]) -> Result<Vec<OutcomeDistribution>> {
        let p = self.fitted()?;
        Ok(vec![p; frame.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_row() -> TrainingRow {
        TrainingRow {
            date: 0,
            time: 0,
            home_team: 1,
            away_team: 2,
            season: 20242025,
            attendance: 0.0,
            home_win_percentage: 0.5,
            away_win_percentage: 0.5,
            home_pyth_expectation: 0.5,
            away_pyth_expectation: 0.5,
        }
    }

    #[test]
    fn fit_counts_label_frequencies() {
        let frame = vec![blank_row(); 4];
        let labels = vec![1, 1, 0, -1];
        let mut model = OutcomePriorClassifier::new(League::Epl);
        model.fit(&frame, &labels).unwrap();
        let probs = model.predict_probability(&frame[..1]).unwrap();
        assert_eq!(probs[0].home_win, 0.5);
        assert_eq!(probs[0].draw, 0.25);
        assert_eq!(probs[0].away_win, 0.25);
        assert_eq!(model.predict(&frame).unwrap(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn unfitted_model_refuses_to_predict() {
        let model = OutcomePriorClassifier::new(League::Epl);
        assert!(model.predict(&[blank_row()]).is_err());
    }

    #[test]
    fn empty_training_set_is_an_error() {
        let mut model = OutcomePriorClassifier::new(League::Bundesliga);
        assert!(model.fit(&[], &[]).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let key = ModelKey {
            league: League::Epl,
            kind: ModelKind::OutcomePrior,
            environment: Environment::Development,
        };
        let mut model = OutcomePriorClassifier::new(League::Epl);
        model.fit(&vec![blank_row(); 2], &[1, 0]).unwrap();
        model.save(&key, dir.path()).unwrap();

        let loaded = OutcomePriorClassifier::load(&key, dir.path()).unwrap();
        assert_eq!(loaded.league(), League::Epl);
        let probs = loaded.predict_probability(&[blank_row()]).unwrap();
        assert_eq!(probs[0].home_win, 0.5);
        assert_eq!(probs[0].draw, 0.5);
    }
}
