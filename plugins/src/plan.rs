//! Feature plan files.
//!
//! ```toml
//! project_name = "shop"
//! version = "1.0"
//!
//! [[features]]
//! name = "auth"
//! priority = 1
//!
//! [[features.tasks]]
//! name = "login"
//! files = ["src/login.rs"]
//! tests = ["tests/login.rs"]
//! command = "make login"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use autodev_core::api::{Feature, Task};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("failed to read plan {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("feature #{0} has an empty name")]
    EmptyFeatureName(usize),

    #[error("feature '{0}' is defined more than once")]
    DuplicateFeature(String),

    #[error("task '{task}' appears twice in feature '{feature}'")]
    DuplicateTask { feature: String, task: String },

    #[error("invalid priority band '{0}' (expected \"p\" or \"lo-hi\")")]
    InvalidPriorityBand(String),

    #[error("unknown feature '{0}'")]
    UnknownFeature(String),
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    project_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    features: Vec<PlanFeature>,
}

#[derive(Debug, Deserialize)]
struct PlanFeature {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    tasks: Vec<PlanTask>,
}

#[derive(Debug, Deserialize)]
struct PlanTask {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    files: Vec<PathBuf>,
    #[serde(default)]
    tests: Vec<PathBuf>,
    #[serde(default)]
    command: Option<String>,
}

/// A validated plan: feature names are non-empty and unique, task names are
/// unique within their feature.
#[derive(Debug, Clone)]
pub struct Plan {
    pub project_name: String,
    pub version: String,
    pub features: Vec<Feature>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// `origin` is only used in error messages.
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, PlanError> {
        let file: PlanFile = toml::from_str(raw).map_err(|source| PlanError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let mut seen_features = HashSet::new();
        let mut features = Vec::with_capacity(file.features.len());
        for (idx, pf) in file.features.into_iter().enumerate() {
            let name = pf.name.trim().to_string();
            if name.is_empty() {
                return Err(PlanError::EmptyFeatureName(idx + 1));
            }
            if !seen_features.insert(name.clone()) {
                return Err(PlanError::DuplicateFeature(name));
            }

            let mut seen_tasks = HashSet::new();
            let mut feature = Feature::new(&name, pf.priority).with_description(pf.description);
            for pt in pf.tasks {
                if !seen_tasks.insert(pt.name.clone()) {
                    return Err(PlanError::DuplicateTask {
                        feature: name,
                        task: pt.name,
                    });
                }
                let mut task = Task::new(&name, pt.name)
                    .with_description(pt.description)
                    .with_files(pt.files)
                    .with_tests(pt.tests);
                task.command = pt.command;
                feature = feature.with_task(task);
            }
            features.push(feature);
        }

        Ok(Self {
            project_name: file.project_name,
            version: file.version,
            features,
        })
    }

    pub fn task_count(&self) -> usize {
        self.features.iter().map(Feature::task_count).sum()
    }

    /// Features matching `selection`, in plan order.
    pub fn select(&self, selection: &FeatureSelection) -> Result<Vec<Feature>, PlanError> {
        match selection {
            FeatureSelection::All => Ok(self.features.clone()),
            FeatureSelection::Names(names) => {
                for name in names {
                    if !self.features.iter().any(|f| &f.name == name) {
                        return Err(PlanError::UnknownFeature(name.clone()));
                    }
                }
                Ok(self
                    .features
                    .iter()
                    .filter(|f| names.contains(&f.name))
                    .cloned()
                    .collect())
            }
            FeatureSelection::Priority(band) => Ok(self
                .features
                .iter()
                .filter(|f| band.contains(f.priority))
                .cloned()
                .collect()),
        }
    }
}

/// Which features of a plan to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeatureSelection {
    #[default]
    All,
    Names(Vec<String>),
    Priority(PriorityBand),
}

/// Inclusive priority range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityBand {
    pub lo: i32,
    pub hi: i32,
}

impl PriorityBand {
    pub fn contains(&self, priority: i32) -> bool {
        self.lo <= priority && priority <= self.hi
    }
}

impl FromStr for PriorityBand {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanError::InvalidPriorityBand(s.to_string());
        let s = s.trim();
        let (lo, hi) = match s.split_once('-') {
            Some((lo, hi)) => (lo.trim(), hi.trim()),
            None => (s, s),
        };
        let lo: i32 = lo.parse().map_err(|_| invalid())?;
        let hi: i32 = hi.parse().map_err(|_| invalid())?;
        if lo > hi {
            return Err(invalid());
        }
        Ok(Self { lo, hi })
    }
}
