//! Pipeline definition files.
//!
//! A pipeline file is TOML with a `[model]` table describing the model and an
//! ordered `[[steps]]` array:
//!
//! ```toml
//! [model]
//! name = "census"
//! project_id = "my-project"
//! bucket = "gs://census-bucket"
//! runtime_version = "1.15"
//! python_version = "3.7"
//! package_uri = "gs://census-bucket/dist/trainer-0.1.tar.gz"
//!
//! [[steps]]
//! role = "train"
//! wait_interval = 60
//!
//! [[steps]]
//! role = "deploy"
//! parent = 0
//! ```
//!
//! Steps receive ids in file order, so `parent` refers to the position of an
//! earlier step. Steps without a parent hang off the root.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::component::ComponentId;
use crate::descriptor::ModelConfig;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum StepConfig {
    Train {
        #[serde(default)]
        parent: Option<i64>,
        #[serde(default)]
        wait_interval: Option<u64>,
    },
    Deploy {
        #[serde(default)]
        parent: Option<i64>,
        #[serde(default)]
        model_uri: Option<String>,
        #[serde(default)]
        wait_interval: Option<u64>,
    },
    Predict {
        #[serde(default)]
        parent: Option<i64>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

impl PipelineConfig {
    /// Load a pipeline file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("failed to parse pipeline file {}", path.display()))?;
        info!(path = %path.display(), steps = config.steps.len(), "loaded pipeline file");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replay the steps through a fresh [`Pipeline`].
    pub fn build(&self, created_at: NaiveDateTime) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(Box::new(self.model.clone()), created_at);
        for (index, step) in self.steps.iter().enumerate() {
            let added = match step.clone() {
                StepConfig::Train {
                    parent,
                    wait_interval,
                } => pipeline.add_train_component(parent.map(ComponentId), wait_interval),
                StepConfig::Deploy {
                    parent,
                    model_uri,
                    wait_interval,
                } => pipeline.add_deploy_component(parent.map(ComponentId), model_uri, wait_interval),
                StepConfig::Predict {
                    parent,
                    model,
                    version,
                } => pipeline.add_predict_component(parent.map(ComponentId), model, version),
            };
            added.with_context(|| format!("invalid step #{index}"))?;
        }
        Ok(pipeline)
    }
}
